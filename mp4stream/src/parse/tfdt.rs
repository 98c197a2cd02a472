use bytes::{BufMut, Bytes};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Track fragment decode time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TfdtBox {
    pub base_media_decode_time: u64,
}

impl TfdtBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let header = FullBoxHeader::parse(&mut buf)?;
        header.ensure_version(FourCC::TFDT, 1)?;
        let base_media_decode_time = match header.version {
            0 => buf.get_mp4_value::<u32>().map(u64::from),
            _ => buf.get_mp4_value(),
        }
        .while_parsing_field(FourCC::TFDT, "base_media_decode_time")?;
        Ok(Self { base_media_decode_time })
    }

    /// Write the payload; always version 1.
    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        FullBoxHeader::new(1, 0).put_buf(&mut out);
        out.put_u64(self.base_media_decode_time);
    }
}
