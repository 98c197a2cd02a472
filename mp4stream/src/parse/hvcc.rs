use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::h26x::{self, ANNEXB_START_CODE};
use crate::error::Result;

use super::avcc::{put_nal_units, read_nal_units};
use super::error::{ParseResultExt, WhileParsingBox};
use super::{FourCC, Mp4ValueReaderExt, ParseError};

/// H.265 decoder configuration record (`hvcC`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HevcConfig {
    /// `general_profile_space` through `general_level_idc`, as stored at the start of the SPS profile_tier_level.
    pub profile_tier_level: [u8; 12],
    pub length_size: u8,
    pub arrays: Vec<HevcNalArray>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HevcNalArray {
    pub completeness: bool,
    pub nal_type: u8,
    pub nal_units: Vec<Bytes>,
}

impl HevcConfig {
    /// Bytes in front of `lengthSizeMinusOne`'s byte; `numOfArrays` follows that byte.
    const FIXED_HEADER_LEN: usize = 21;

    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        ensure_attach!(
            data.len() > Self::FIXED_HEADER_LEN + 1,
            ParseError::TruncatedBox,
            WhileParsingBox(FourCC::HVCC),
        );
        let mut profile_tier_level = [0; 12];
        profile_tier_level.copy_from_slice(&data[1..13]);
        let length_size = (data[Self::FIXED_HEADER_LEN] & 0x03) + 1;
        ensure_attach!(length_size != 3, ParseError::InvalidCodecConfig, WhileParsingBox(FourCC::HVCC));

        let mut buf = data.slice(Self::FIXED_HEADER_LEN + 1..);
        let array_count: u8 = buf.get_mp4_value().while_parsing_field(FourCC::HVCC, "numOfArrays")?;
        let mut arrays = Vec::with_capacity(array_count.into());
        for _ in 0..array_count {
            let nal_type: u8 = buf.get_mp4_value()?;
            let nal_count: u16 = buf.get_mp4_value()?;
            let nal_units = read_nal_units(&mut buf, nal_count.into()).while_parsing_field(FourCC::HVCC, "nalUnit")?;
            arrays.push(HevcNalArray { completeness: nal_type & 0x80 != 0, nal_type: nal_type & 0x3f, nal_units });
        }
        Ok(Self { profile_tier_level, length_size, arrays })
    }

    /// Build a record with 4-byte NAL lengths around the given parameter sets.
    ///
    /// The profile, tier and level are copied from the first SPS when it is long enough to hold them.
    pub fn from_parameter_sets(vps: Vec<Bytes>, sps: Vec<Bytes>, pps: Vec<Bytes>) -> Self {
        let mut profile_tier_level = [0; 12];
        if let Some(ptl) = sps.first().and_then(|sps| sps.get(3..15)) {
            profile_tier_level.copy_from_slice(ptl);
        }
        let arrays = [(h26x::H265_VPS, vps), (h26x::H265_SPS, sps), (h26x::H265_PPS, pps)]
            .into_iter()
            .filter(|(_, nal_units)| !nal_units.is_empty())
            .map(|(nal_type, nal_units)| HevcNalArray { completeness: true, nal_type, nal_units })
            .collect();
        Self { profile_tier_level, length_size: 4, arrays }
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        out.put_u8(1);
        out.put_slice(&self.profile_tier_level);
        out.put_u16(0xf000); // min_spatial_segmentation_idc
        out.put_u8(0xfc); // parallelismType
        out.put_u8(0xfd); // chroma_format_idc 4:2:0
        out.put_u8(0xf8); // bit_depth_luma_minus8
        out.put_u8(0xf8); // bit_depth_chroma_minus8
        out.put_u16(0); // avgFrameRate
        out.put_u8(0x0c | (self.length_size - 1));
        out.put_u8(self.arrays.len() as u8);
        for array in &self.arrays {
            out.put_u8(u8::from(array.completeness) << 7 | array.nal_type);
            out.put_u16(array.nal_units.len() as u16);
            put_nal_units(&mut out, &array.nal_units);
        }
    }

    /// The parameter sets as one Annex-B byte stream, in stored order.
    pub fn to_annexb(&self) -> Bytes {
        let mut out = BytesMut::new();
        for nal in self.arrays.iter().flat_map(|array| &array.nal_units) {
            out.put_slice(&ANNEXB_START_CODE);
            out.put_slice(nal);
        }
        out.freeze()
    }
}
