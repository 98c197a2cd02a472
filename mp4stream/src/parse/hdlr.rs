use bytes::{Buf, BufMut, Bytes};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HdlrBox {
    pub handler_type: FourCC,
    pub name: String,
}

impl HdlrBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf)?;
        buf.skip_mp4(4)?; // pre_defined
        let handler_type = buf.get_mp4_value().while_parsing_field(FourCC::HDLR, "handler_type")?;
        buf.skip_mp4(12)?;
        let name = buf.chunk().split(|byte| *byte == 0).next().unwrap_or_default();
        Ok(Self { handler_type, name: String::from_utf8_lossy(name).into_owned() })
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        FullBoxHeader::default().put_buf(&mut out);
        out.put_u32(0);
        self.handler_type.put_buf(&mut out);
        out.put_bytes(0, 12);
        out.put_slice(self.name.as_bytes());
        out.put_u8(0);
    }
}
