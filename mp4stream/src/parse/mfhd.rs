use bytes::{BufMut, Bytes};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Movie fragment header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MfhdBox {
    pub sequence_number: u32,
}

impl MfhdBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf)?;
        let sequence_number = buf.get_mp4_value().while_parsing_field(FourCC::MFHD, "sequence_number")?;
        Ok(Self { sequence_number })
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        FullBoxHeader::default().put_buf(&mut out);
        out.put_u32(self.sequence_number);
    }
}
