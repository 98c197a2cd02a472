use bytes::{BufMut, Bytes};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Media header, carrying the track's timescale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdhdBox {
    pub timescale: u32,
    pub duration: u64,
    /// ISO-639-2/T language code packed as three 5-bit letters.
    pub language: u16,
}

impl MdhdBox {
    /// `und`, packed.
    pub const UNDETERMINED_LANGUAGE: u16 = 0x55c4;

    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let header = FullBoxHeader::parse(&mut buf)?;
        header.ensure_version(FourCC::MDHD, 1)?;
        let (timescale, duration) = match header.version {
            0 => {
                buf.skip_mp4(8)?;
                let timescale = buf.get_mp4_value().while_parsing_field(FourCC::MDHD, "timescale")?;
                (timescale, u64::from(buf.get_mp4_value::<u32>()?))
            }
            _ => {
                buf.skip_mp4(16)?;
                let timescale = buf.get_mp4_value().while_parsing_field(FourCC::MDHD, "timescale")?;
                (timescale, buf.get_mp4_value()?)
            }
        };
        ensure_attach!(timescale != 0, ParseError::InvalidInput, "zero media timescale");
        let language = buf.get_mp4_value().while_parsing_field(FourCC::MDHD, "language")?;
        Ok(Self { timescale, duration, language })
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        FullBoxHeader::default().put_buf(&mut out);
        out.put_bytes(0, 8);
        out.put_u32(self.timescale);
        out.put_u32(self.duration as u32);
        out.put_u16(self.language);
        out.put_u16(0); // pre_defined
    }
}
