//! MPEG-4 elementary stream descriptors (ISO/IEC 14496-1), as carried in `esds` boxes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Result;

use super::error::{ParseResultExt, WhileParsingBox};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// The fields of an ES descriptor that matter for demuxing and muxing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EsDescriptor {
    pub es_id: u16,
    pub object_type: u8,
    /// The stream type, without the upstream and reserved bits it is stored with.
    pub stream_type: u8,
    pub buffer_size: u32,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
    pub decoder_specific_info: Option<Bytes>,
}

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;
const SL_CONFIG_DESCRIPTOR_TAG: u8 = 0x06;

pub const STREAM_TYPE_VISUAL: u8 = 0x04;
pub const STREAM_TYPE_AUDIO: u8 = 0x05;

impl EsDescriptor {
    /// Parse the payload of an `esds` box.
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf).while_parsing_box(FourCC::ESDS)?;
        while buf.has_remaining() {
            let (tag, body) = read_descriptor(&mut buf)?;
            match tag {
                ES_DESCRIPTOR_TAG => return Self::parse_es(body),
                _ => log::warn!("skipping descriptor with tag 0x{tag:02x} before the ES descriptor"),
            }
        }
        bail_attach!(ParseError::InvalidCodecConfig, "missing ES descriptor", WhileParsingBox(FourCC::ESDS));
    }

    fn parse_es(mut buf: Bytes) -> Result<Self, ParseError> {
        let es_id = buf.get_mp4_value().while_parsing_field(FourCC::ESDS, "ES_ID")?;
        let flags: u8 = buf.get_mp4_value()?;
        if flags & 0x80 != 0 {
            buf.skip_mp4(2)?; // dependsOn_ES_ID
        }
        if flags & 0x40 != 0 {
            let url_len: u8 = buf.get_mp4_value()?;
            buf.skip_mp4(url_len.into())?;
        }
        if flags & 0x20 != 0 {
            buf.skip_mp4(2)?; // OCR_ES_Id
        }

        let mut descriptor = None;
        while buf.has_remaining() {
            let (tag, body) = read_descriptor(&mut buf)?;
            match tag {
                DECODER_CONFIG_DESCRIPTOR_TAG => descriptor = Some(Self::parse_decoder_config(es_id, body)?),
                SL_CONFIG_DESCRIPTOR_TAG => {}
                _ => log::warn!("skipping unknown descriptor tag 0x{tag:02x} inside ES descriptor"),
            }
        }
        let Some(descriptor) = descriptor else {
            bail_attach!(ParseError::InvalidCodecConfig, "missing decoder config descriptor", WhileParsingBox(FourCC::ESDS));
        };
        Ok(descriptor)
    }

    fn parse_decoder_config(es_id: u16, mut buf: Bytes) -> Result<Self, ParseError> {
        let object_type = buf.get_mp4_value().while_parsing_field(FourCC::ESDS, "objectTypeIndication")?;
        let stream_type: u8 = buf.get_mp4_value()?;
        let buffer_size: [u8; 3] = buf.get_mp4_value()?;
        let max_bitrate = buf.get_mp4_value()?;
        let avg_bitrate = buf.get_mp4_value()?;

        let mut decoder_specific_info = None;
        while buf.has_remaining() {
            let (tag, body) = read_descriptor(&mut buf)?;
            match tag {
                DECODER_SPECIFIC_INFO_TAG => decoder_specific_info = Some(body),
                _ => log::warn!("skipping unknown descriptor tag 0x{tag:02x} inside decoder config"),
            }
        }
        Ok(Self {
            es_id,
            object_type,
            stream_type: stream_type >> 2,
            buffer_size: u32::from_be_bytes([0, buffer_size[0], buffer_size[1], buffer_size[2]]),
            max_bitrate,
            avg_bitrate,
            decoder_specific_info,
        })
    }

    /// Write the payload of an `esds` box.
    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        let mut decoder_config = BytesMut::new();
        decoder_config.put_u8(self.object_type);
        decoder_config.put_u8(self.stream_type << 2 | 1);
        decoder_config.put_slice(&self.buffer_size.to_be_bytes()[1..]);
        decoder_config.put_u32(self.max_bitrate);
        decoder_config.put_u32(self.avg_bitrate);
        if let Some(info) = &self.decoder_specific_info {
            put_descriptor(&mut decoder_config, DECODER_SPECIFIC_INFO_TAG, info);
        }

        let mut es = BytesMut::new();
        es.put_u16(self.es_id);
        es.put_u8(0);
        put_descriptor(&mut es, DECODER_CONFIG_DESCRIPTOR_TAG, &decoder_config);
        put_descriptor(&mut es, SL_CONFIG_DESCRIPTOR_TAG, &[0x02]);

        FullBoxHeader::default().put_buf(&mut out);
        put_descriptor(&mut out, ES_DESCRIPTOR_TAG, &es);
    }
}

fn read_descriptor(buf: &mut Bytes) -> Result<(u8, Bytes), ParseError> {
    let tag: u8 = buf.get_mp4_value().while_parsing_field(FourCC::ESDS, "descriptor tag")?;
    let size = read_size(buf)?;
    ensure_attach!(
        buf.remaining() >= size as usize,
        ParseError::TruncatedBox,
        format!("descriptor 0x{tag:02x} overruns its parent"),
        WhileParsingBox(FourCC::ESDS),
    );
    Ok((tag, buf.split_to(size as usize)))
}

/// Read a descriptor size: up to four bytes of 7 bits each, where a set high bit means another byte follows.
pub fn read_size<B: Buf>(buf: &mut B) -> Result<u32, ParseError> {
    let mut size = 0u32;
    for _ in 0..4 {
        let byte: u8 = buf.get_mp4_value().while_parsing_field(FourCC::ESDS, "descriptor size")?;
        size = size << 7 | u32::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok(size);
        }
    }
    bail_attach!(ParseError::InvalidCodecConfig, "descriptor size longer than four bytes");
}

/// Write `size` in the shortest 7-bit continuation form.
pub fn put_size<B: BufMut>(mut out: B, size: u32) {
    let mut shift = 21;
    while shift > 0 && size >> shift == 0 {
        shift -= 7;
    }
    while shift > 0 {
        out.put_u8((size >> shift) as u8 & 0x7f | 0x80);
        shift -= 7;
    }
    out.put_u8(size as u8 & 0x7f);
}

fn put_descriptor<B: BufMut>(mut out: B, tag: u8, body: &[u8]) {
    out.put_u8(tag);
    put_size(&mut out, body.len() as u32);
    out.put_slice(body);
}

#[cfg(test)]
mod test {
    use super::*;

    // esds payload as written by common AAC muxers, with four-byte descriptor sizes.
    const AAC_ESDS: &[u8] = &[
        0, 0, 0, 0, // version and flags
        0x03, 0x80, 0x80, 0x80, 0x22, 0x00, 0x01, 0x00, // ES descriptor
        0x04, 0x80, 0x80, 0x80, 0x14, 0x40, 0x15, 0x00, 0x00, 0x00, 0x00, 0x01, 0xf4, 0x00, 0x00, 0x01, 0xf4, 0x00,
        0x05, 0x80, 0x80, 0x80, 0x02, 0x12, 0x10, // decoder specific info
        0x06, 0x80, 0x80, 0x80, 0x01, 0x02, // SL config
    ];

    #[test]
    fn parse_aac() {
        let esds = EsDescriptor::parse(&Bytes::from_static(AAC_ESDS)).unwrap();
        assert_eq!(esds.es_id, 1);
        assert_eq!(esds.object_type, 0x40);
        assert_eq!(esds.stream_type, STREAM_TYPE_AUDIO);
        assert_eq!(esds.avg_bitrate, 128_000);
        assert_eq!(esds.decoder_specific_info.as_deref(), Some(&[0x12, 0x10][..]));
    }

    #[test]
    fn written_descriptor_parses_back() {
        let esds = EsDescriptor {
            es_id: 2,
            object_type: 0xdd,
            stream_type: STREAM_TYPE_AUDIO,
            decoder_specific_info: Some(Bytes::from(vec![7; 300])),
            ..Default::default()
        };
        let mut data = BytesMut::new();
        esds.put_buf(&mut data);
        assert_eq!(EsDescriptor::parse(&data.freeze()).unwrap(), esds);
    }

    #[test]
    fn size_encoding() {
        let mut out = vec![];
        put_size(&mut out, 127);
        put_size(&mut out, 300);
        assert_eq!(out, [0x7f, 0x82, 0x2c]);
        let mut buf = &out[1..];
        assert_eq!(read_size(&mut buf).unwrap(), 300);
    }

    #[test]
    fn unknown_tags_are_skipped() {
        let mut data = BytesMut::new();
        FullBoxHeader::default().put_buf(&mut data);
        data.put_slice(&[0x03, 0x15, 0x00, 0x01, 0x00]);
        data.put_slice(&[0x0a, 0x01, 0xff]);
        data.put_slice(&[0x04, 0x0d, 0x6b, 0x15, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let esds = EsDescriptor::parse(&data.freeze()).unwrap();
        assert_eq!(esds.object_type, 0x6b);
        assert_eq!(esds.decoder_specific_info, None);
    }
}
