//! NAL unit framing for H.264 and H.265.
//!
//! Inside MP4 samples NAL units are prefixed with a big-endian length field of 1, 2 or 4 bytes, as declared by the
//! decoder configuration record. Frames exchanged with callers use Annex-B start codes instead.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::parse::error::WhereEq;
use crate::parse::ParseError;

use super::Codec;

pub const ANNEXB_START_CODE: [u8; 4] = [0, 0, 0, 1];

pub const H264_IDR: u8 = 5;
pub const H264_SPS: u8 = 7;
pub const H264_PPS: u8 = 8;
pub const H264_AUD: u8 = 9;

pub const H265_IDR_W_RADL: u8 = 19;
pub const H265_VPS: u8 = 32;
pub const H265_SPS: u8 = 33;
pub const H265_PPS: u8 = 34;
pub const H265_AUD: u8 = 35;

/// The NAL unit type in the header of `nal`.
pub fn nal_type(codec: Codec, nal: &[u8]) -> Option<u8> {
    let header = *nal.first()?;
    match codec {
        Codec::H264 => Some(header & 0x1f),
        Codec::H265 => Some((header >> 1) & 0x3f),
        _ => None,
    }
}

pub fn is_parameter_set(codec: Codec, nal_type: u8) -> bool {
    match codec {
        Codec::H264 => matches!(nal_type, H264_SPS | H264_PPS),
        Codec::H265 => matches!(nal_type, H265_VPS | H265_SPS | H265_PPS),
        _ => false,
    }
}

/// Whether decoding can start at a NAL unit of this type.
pub fn is_random_access(codec: Codec, nal_type: u8) -> bool {
    match codec {
        Codec::H264 => nal_type == H264_IDR,
        Codec::H265 => (16..=21).contains(&nal_type),
        _ => false,
    }
}

/// Rewrite a length-prefixed sample into a freshly allocated Annex-B buffer.
///
/// The length fields must tile `data` exactly.
pub fn length_prefixed_to_annexb(data: &[u8], length_size: u8) -> Result<Bytes, ParseError> {
    let length_size = usize::from(length_size);
    ensure_attach!(matches!(length_size, 1 | 2 | 4), ParseError::InvalidCodecConfig, WhereEq("length_size", length_size));
    let mut out = BytesMut::with_capacity(data.len() + data.len() / 4);
    let mut rest = data;
    while !rest.is_empty() {
        ensure_attach!(rest.len() >= length_size, ParseError::TruncatedBox, "while reading NAL unit length");
        let (length, tail) = rest.split_at(length_size);
        let length = length.iter().fold(0usize, |acc, byte| acc << 8 | usize::from(*byte));
        ensure_attach!(tail.len() >= length, ParseError::TruncatedBox, WhereEq("nal_length", length));
        out.put_slice(&ANNEXB_START_CODE);
        out.put_slice(&tail[..length]);
        rest = &tail[length..];
    }
    Ok(out.freeze())
}

/// Split an Annex-B byte stream into its NAL units, without start codes.
///
/// Input without any start code is taken to be a single NAL unit.
pub fn split_annexb(data: &Bytes) -> Vec<Bytes> {
    let mut nal_units = Vec::new();
    let mut start = None;
    let mut pos = 0;
    while pos + 3 <= data.len() {
        if data[pos..pos + 3] == [0, 0, 1] {
            if let Some(start) = start {
                push_trimmed(&mut nal_units, data, start, pos);
            }
            pos += 3;
            start = Some(pos);
        } else {
            pos += 1;
        }
    }
    match start {
        Some(start) => push_trimmed(&mut nal_units, data, start, data.len()),
        None if !data.is_empty() => nal_units.push(data.clone()),
        None => {}
    }
    nal_units
}

fn push_trimmed(nal_units: &mut Vec<Bytes>, data: &Bytes, start: usize, mut end: usize) {
    while end > start && data[end - 1] == 0 {
        end -= 1;
    }
    if end > start {
        nal_units.push(data.slice(start..end));
    }
}

/// Append `nal` with a 4-byte big-endian length prefix.
pub fn put_length_prefixed<B: BufMut>(mut out: B, nal: &[u8]) {
    out.put_u32(nal.len() as u32);
    out.put_slice(nal);
}
