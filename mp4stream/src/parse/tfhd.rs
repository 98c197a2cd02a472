use bytes::{BufMut, Bytes};

use crate::error::Result;

use super::error::{ParseResultExt, WhileParsingBox};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError, SampleDefaults};

/// Track fragment header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TfhdBox {
    pub flags: u32,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
}

impl TfhdBox {
    pub const BASE_DATA_OFFSET_PRESENT: u32 = 0x00_0001;
    pub const SAMPLE_DESCRIPTION_INDEX_PRESENT: u32 = 0x00_0002;
    pub const DEFAULT_SAMPLE_DURATION_PRESENT: u32 = 0x00_0008;
    pub const DEFAULT_SAMPLE_SIZE_PRESENT: u32 = 0x00_0010;
    pub const DEFAULT_SAMPLE_FLAGS_PRESENT: u32 = 0x00_0020;
    pub const DURATION_IS_EMPTY: u32 = 0x01_0000;
    pub const DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let FullBoxHeader { flags, .. } = FullBoxHeader::parse(&mut buf)?;
        ensure_attach!(
            flags & Self::DURATION_IS_EMPTY == 0,
            ParseError::UnsupportedTfhdFlags(flags),
            WhileParsingBox(FourCC::TFHD),
        );
        let track_id = buf.get_mp4_value().while_parsing_field(FourCC::TFHD, "track_ID")?;
        let base_data_offset = match flags & Self::BASE_DATA_OFFSET_PRESENT {
            0 => None,
            _ => Some(buf.get_mp4_value().while_parsing_field(FourCC::TFHD, "base_data_offset")?),
        };
        let mut optional = |flag: u32, name: &'static str| -> Result<Option<u32>, ParseError> {
            match flags & flag {
                0 => Ok(None),
                _ => buf.get_mp4_value().map(Some).while_parsing_field(FourCC::TFHD, name),
            }
        };
        Ok(Self {
            flags,
            track_id,
            base_data_offset,
            sample_description_index: optional(Self::SAMPLE_DESCRIPTION_INDEX_PRESENT, "sample_description_index")?,
            default_sample_duration: optional(Self::DEFAULT_SAMPLE_DURATION_PRESENT, "default_sample_duration")?,
            default_sample_size: optional(Self::DEFAULT_SAMPLE_SIZE_PRESENT, "default_sample_size")?,
            default_sample_flags: optional(Self::DEFAULT_SAMPLE_FLAGS_PRESENT, "default_sample_flags")?,
        })
    }

    pub fn default_base_is_moof(&self) -> bool {
        self.flags & Self::DEFAULT_BASE_IS_MOOF != 0
    }

    /// Write the payload. The presence flags are derived from which optional fields are set.
    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        let optional = [
            (Self::SAMPLE_DESCRIPTION_INDEX_PRESENT, self.sample_description_index),
            (Self::DEFAULT_SAMPLE_DURATION_PRESENT, self.default_sample_duration),
            (Self::DEFAULT_SAMPLE_SIZE_PRESENT, self.default_sample_size),
            (Self::DEFAULT_SAMPLE_FLAGS_PRESENT, self.default_sample_flags),
        ];
        let mut flags = self.flags & Self::DEFAULT_BASE_IS_MOOF;
        if self.base_data_offset.is_some() {
            flags |= Self::BASE_DATA_OFFSET_PRESENT;
        }
        for (flag, value) in optional {
            if value.is_some() {
                flags |= flag;
            }
        }
        FullBoxHeader::new(0, flags).put_buf(&mut out);
        out.put_u32(self.track_id);
        if let Some(base_data_offset) = self.base_data_offset {
            out.put_u64(base_data_offset);
        }
        for value in optional.into_iter().filter_map(|(_, value)| value) {
            out.put_u32(value);
        }
    }

    /// Overlay the defaults carried by this header onto the track's `trex` defaults.
    pub fn resolve(&self, trex: &SampleDefaults) -> SampleDefaults {
        SampleDefaults {
            sample_description_index: self.sample_description_index.unwrap_or(trex.sample_description_index),
            duration: self.default_sample_duration.unwrap_or(trex.duration),
            size: self.default_sample_size.unwrap_or(trex.size),
            flags: self.default_sample_flags.unwrap_or(trex.flags),
        }
    }
}
