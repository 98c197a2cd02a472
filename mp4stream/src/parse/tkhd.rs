use bytes::{BufMut, Bytes};
use fixed::types::{I8F8, U16F16};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{FourCC, FullBoxHeader, Mp4Transform, Mp4ValueReaderExt, Mp4ValueWriterExt, ParseError};

/// Track header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TkhdBox {
    pub flags: u32,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: I8F8,
    pub matrix: Mp4Transform,
    pub width: U16F16,
    pub height: U16F16,
}

impl TkhdBox {
    pub const FLAG_ENABLED: u32 = 0x1;
    pub const FLAG_IN_MOVIE: u32 = 0x2;

    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let header = FullBoxHeader::parse(&mut buf)?;
        header.ensure_version(FourCC::TKHD, 1)?;
        let (track_id, duration) = match header.version {
            0 => {
                buf.skip_mp4(8)?; // creation and modification time
                let track_id = buf.get_mp4_value().while_parsing_field(FourCC::TKHD, "track_id")?;
                buf.skip_mp4(4)?;
                (track_id, u64::from(buf.get_mp4_value::<u32>()?))
            }
            _ => {
                buf.skip_mp4(16)?;
                let track_id = buf.get_mp4_value().while_parsing_field(FourCC::TKHD, "track_id")?;
                buf.skip_mp4(4)?;
                (track_id, buf.get_mp4_value()?)
            }
        };
        buf.skip_mp4(8)?; // reserved
        Ok(Self {
            flags: header.flags,
            track_id,
            duration,
            layer: buf.get_mp4_value()?,
            alternate_group: buf.get_mp4_value()?,
            volume: buf.get_mp4_value()?,
            matrix: {
                buf.skip_mp4(2)?;
                buf.get_mp4_value().while_parsing_field(FourCC::TKHD, "matrix")?
            },
            width: buf.get_mp4_value().while_parsing_field(FourCC::TKHD, "width")?,
            height: buf.get_mp4_value().while_parsing_field(FourCC::TKHD, "height")?,
        })
    }

    /// Write the version 0 payload.
    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        FullBoxHeader::new(0, self.flags).put_buf(&mut out);
        out.put_bytes(0, 8);
        out.put_u32(self.track_id);
        out.put_u32(0);
        out.put_u32(self.duration as u32);
        out.put_bytes(0, 8);
        out.put_i16(self.layer);
        out.put_i16(self.alternate_group);
        out.put_mp4_value(&self.volume);
        out.put_u16(0);
        out.put_mp4_value(&self.matrix);
        out.put_mp4_value(&self.width);
        out.put_mp4_value(&self.height);
    }
}
