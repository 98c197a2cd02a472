//! Vorbis codec private data: the identification, comment and setup headers packed into one blob.
//!
//! The blob starts with the header count minus one (always 2), followed by the sizes of the first two headers in
//! 7-bit continuation form; the third header takes up the rest.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::parse::esds::{put_size, read_size};
use crate::parse::error::WhereEq;
use crate::parse::{Mp4ValueReaderExt, ParseError};

/// The three Vorbis header packets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VorbisHeaders {
    pub identification: Bytes,
    pub comment: Bytes,
    pub setup: Bytes,
}

impl VorbisHeaders {
    pub fn parse(private_data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = private_data.clone();
        let count: u8 = buf.get_mp4_value()?;
        ensure_attach!(count == 2, ParseError::InvalidCodecConfig, WhereEq("vorbis header count - 1", count));
        let identification_len = read_size(&mut buf)? as usize;
        let comment_len = read_size(&mut buf)? as usize;
        ensure_attach!(
            buf.remaining() > identification_len + comment_len,
            ParseError::InvalidCodecConfig,
            "vorbis headers overrun the private data",
        );
        let identification = buf.split_to(identification_len);
        let comment = buf.split_to(comment_len);
        Ok(Self { identification, comment, setup: buf })
    }

    /// Sample rate from the identification header.
    pub fn sample_rate(&self) -> Option<u32> {
        let field = self.identification.get(12..16)?;
        Some(u32::from_le_bytes(field.try_into().ok()?))
    }

    pub fn channels(&self) -> Option<u8> {
        self.identification.get(11).copied()
    }

    pub fn to_private_data(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_u8(2);
        put_size(&mut out, self.identification.len() as u32);
        put_size(&mut out, self.comment.len() as u32);
        out.put_slice(&self.identification);
        out.put_slice(&self.comment);
        out.put_slice(&self.setup);
        out.freeze()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn identification() -> Bytes {
        let mut header = b"\x01vorbis".to_vec();
        header.extend_from_slice(&[0, 0, 0, 0]);
        header.push(2);
        header.extend_from_slice(&48000u32.to_le_bytes());
        header.extend_from_slice(&[0; 14]);
        Bytes::from(header)
    }

    #[test]
    fn private_data_layout() {
        let headers = VorbisHeaders {
            identification: identification(),
            comment: Bytes::from(vec![3; 200]),
            setup: Bytes::from_static(b"\x05vorbis-setup"),
        };
        let private_data = headers.to_private_data();
        assert_eq!(&private_data[..4], &[2, 30, 0x81, 0x48]);
        let parsed = VorbisHeaders::parse(&private_data).unwrap();
        assert_eq!(parsed, headers);
        assert_eq!(parsed.sample_rate(), Some(48000));
        assert_eq!(parsed.channels(), Some(2));
    }

    #[test]
    fn missing_setup_header() {
        let private_data = Bytes::from_static(&[2, 1, 1, 0xaa, 0xbb]);
        assert_eq!(VorbisHeaders::parse(&private_data).unwrap_err().get_ref(), &ParseError::InvalidCodecConfig);
    }
}
