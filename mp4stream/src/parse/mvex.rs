use bytes::{BufMut, Bytes};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{ChildBoxes, FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Movie extends box. Its presence marks a fragmented file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MvexBox {
    pub trex: Vec<TrexBox>,
}

/// Track extends box: the movie-level sample defaults of one track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrexBox {
    pub track_id: u32,
    pub defaults: SampleDefaults,
}

/// Per-sample values used when a track fragment run leaves a field out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleDefaults {
    pub sample_description_index: u32,
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
}

impl MvexBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut trex = Vec::new();
        for child in ChildBoxes::new(data.clone()) {
            let (header, child_data) = child.while_parsing_box(FourCC::MVEX)?;
            match header.box_type() {
                FourCC::TREX => trex.push(TrexBox::parse(&child_data).while_parsing_box(FourCC::MVEX)?),
                FourCC::MEHD => {}
                other => log::debug!("ignoring `{other}` box inside `mvex`"),
            }
        }
        Ok(Self { trex })
    }
}

impl TrexBox {
    pub const ENCODED_LEN: u32 = 24;

    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf).while_parsing_box(FourCC::TREX)?;
        let track_id = buf.get_mp4_value().while_parsing_field(FourCC::TREX, "track_ID")?;
        let defaults = SampleDefaults {
            sample_description_index: buf.get_mp4_value()?,
            duration: buf.get_mp4_value()?,
            size: buf.get_mp4_value()?,
            flags: buf.get_mp4_value().while_parsing_field(FourCC::TREX, "default_sample_flags")?,
        };
        Ok(Self { track_id, defaults })
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        FullBoxHeader::default().put_buf(&mut out);
        out.put_u32(self.track_id);
        out.put_u32(self.defaults.sample_description_index);
        out.put_u32(self.defaults.duration);
        out.put_u32(self.defaults.size);
        out.put_u32(self.defaults.flags);
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn trex_defaults() {
        let defaults = SampleDefaults { sample_description_index: 1, duration: 1024, size: 0, flags: 0x0101_0000 };
        let trex = TrexBox { track_id: 2, defaults };
        let mut data = BytesMut::new();
        trex.put_buf(&mut data);
        assert_eq!(data.len() as u32, TrexBox::ENCODED_LEN);
        assert_eq!(TrexBox::parse(&data.freeze()).unwrap(), trex);
    }

    #[test]
    fn truncated_trex_header() {
        let err = TrexBox::parse(&Bytes::from_static(&[0, 0])).unwrap_err();
        assert_eq!(err.get_ref(), &ParseError::TruncatedBox);
        assert!(format!("{err:?}").contains("while parsing `trex` box"));
    }
}
