use bytes::{BufMut, Bytes};
use fixed::types::{I16F16, I8F8};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{FourCC, FullBoxHeader, Mp4Transform, Mp4ValueReaderExt, Mp4ValueWriterExt, ParseError};

/// Movie header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MvhdBox {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub rate: I16F16,
    pub volume: I8F8,
    pub matrix: Mp4Transform,
    pub next_track_id: u32,
}

impl MvhdBox {
    pub fn new(timescale: u32, next_track_id: u32) -> Self {
        Self {
            creation_time: 0,
            modification_time: 0,
            timescale,
            duration: 0,
            rate: I16F16::ONE,
            volume: I8F8::ONE,
            matrix: Mp4Transform::UNITY,
            next_track_id,
        }
    }

    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let header = FullBoxHeader::parse(&mut buf)?;
        header.ensure_version(FourCC::MVHD, 1)?;
        let (creation_time, modification_time, timescale, duration) = match header.version {
            0 => (
                u64::from(buf.get_mp4_value::<u32>()?),
                u64::from(buf.get_mp4_value::<u32>()?),
                buf.get_mp4_value()?,
                u64::from(buf.get_mp4_value::<u32>()?),
            ),
            _ => (buf.get_mp4_value()?, buf.get_mp4_value()?, buf.get_mp4_value()?, buf.get_mp4_value()?),
        };
        let rate = buf.get_mp4_value().while_parsing_field(FourCC::MVHD, "rate")?;
        let volume = buf.get_mp4_value().while_parsing_field(FourCC::MVHD, "volume")?;
        buf.skip_mp4(2 + 8)?; // reserved
        let matrix = buf.get_mp4_value().while_parsing_field(FourCC::MVHD, "matrix")?;
        buf.skip_mp4(24)?; // pre_defined
        let next_track_id = buf.get_mp4_value().while_parsing_field(FourCC::MVHD, "next_track_id")?;
        Ok(Self { creation_time, modification_time, timescale, duration, rate, volume, matrix, next_track_id })
    }

    /// Write the version 0 payload.
    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        FullBoxHeader::default().put_buf(&mut out);
        out.put_u32(self.creation_time as u32);
        out.put_u32(self.modification_time as u32);
        out.put_u32(self.timescale);
        out.put_u32(self.duration as u32);
        out.put_mp4_value(&self.rate);
        out.put_mp4_value(&self.volume);
        out.put_bytes(0, 2 + 8);
        out.put_mp4_value(&self.matrix);
        out.put_bytes(0, 24);
        out.put_u32(self.next_track_id);
    }
}
