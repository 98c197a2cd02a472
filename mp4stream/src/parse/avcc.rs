use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::h26x::ANNEXB_START_CODE;
use crate::error::Result;

use super::error::{ParseResultExt, WhileParsingBox};
use super::{FourCC, Mp4ValueReaderExt, ParseError};

/// H.264 decoder configuration record (`avcC`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvcConfig {
    pub profile: u8,
    pub compatibility: u8,
    pub level: u8,
    /// Width in bytes of the length field in front of every NAL unit of a sample.
    pub length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let version: u8 = buf.get_mp4_value().while_parsing_field(FourCC::AVCC, "configurationVersion")?;
        ensure_attach!(version == 1, ParseError::InvalidCodecConfig, WhileParsingBox(FourCC::AVCC));
        let profile = buf.get_mp4_value()?;
        let compatibility = buf.get_mp4_value()?;
        let level = buf.get_mp4_value()?;
        let length_size = (buf.get_mp4_value::<u8>()? & 0x03) + 1;
        ensure_attach!(length_size != 3, ParseError::InvalidCodecConfig, WhileParsingBox(FourCC::AVCC));

        let sps_count = buf.get_mp4_value::<u8>()? & 0x1f;
        let sps = read_nal_units(&mut buf, sps_count.into()).while_parsing_field(FourCC::AVCC, "sequenceParameterSetNALUnit")?;
        let pps_count: u8 = buf.get_mp4_value()?;
        let pps = read_nal_units(&mut buf, pps_count.into()).while_parsing_field(FourCC::AVCC, "pictureParameterSetNALUnit")?;
        Ok(Self { profile, compatibility, level, length_size, sps, pps })
    }

    /// Build a record with 4-byte NAL lengths around the given parameter sets.
    pub fn from_parameter_sets(sps: Vec<Bytes>, pps: Vec<Bytes>) -> Option<Self> {
        let first = sps.first()?;
        let [_, profile, compatibility, level, ..] = first[..] else {
            return None;
        };
        Some(Self { profile, compatibility, level, length_size: 4, sps, pps })
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        out.put_u8(1);
        out.put_u8(self.profile);
        out.put_u8(self.compatibility);
        out.put_u8(self.level);
        out.put_u8(0xfc | (self.length_size - 1));
        out.put_u8(0xe0 | self.sps.len() as u8);
        put_nal_units(&mut out, &self.sps);
        out.put_u8(self.pps.len() as u8);
        put_nal_units(&mut out, &self.pps);
    }

    /// The parameter sets as one Annex-B byte stream, SPS first.
    pub fn to_annexb(&self) -> Bytes {
        let mut out = BytesMut::new();
        for nal in self.sps.iter().chain(&self.pps) {
            out.put_slice(&ANNEXB_START_CODE);
            out.put_slice(nal);
        }
        out.freeze()
    }
}

pub(super) fn read_nal_units(buf: &mut Bytes, count: usize) -> Result<Vec<Bytes>, ParseError> {
    let mut nal_units = Vec::with_capacity(count);
    for _ in 0..count {
        let len: u16 = buf.get_mp4_value()?;
        ensure_attach!(buf.remaining() >= usize::from(len), ParseError::TruncatedBox);
        nal_units.push(buf.split_to(len.into()));
    }
    Ok(nal_units)
}

pub(super) fn put_nal_units<B: BufMut>(mut out: B, nal_units: &[Bytes]) {
    for nal in nal_units {
        out.put_u16(nal.len() as u16);
        out.put_slice(nal);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub const SPS: &[u8] = &[0x67, 0x42, 0xc0, 0x1e, 0xd9, 0x00, 0xa0, 0x47, 0xfe, 0xc8];
    pub const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];

    #[test]
    fn built_record_parses_back() {
        let config = AvcConfig::from_parameter_sets(vec![Bytes::from_static(SPS)], vec![Bytes::from_static(PPS)]).unwrap();
        assert_eq!((config.profile, config.compatibility, config.level), (0x42, 0xc0, 0x1e));
        let mut data = BytesMut::new();
        config.put_buf(&mut data);
        assert_eq!(data[4], 0xff);
        assert_eq!(AvcConfig::parse(&data.freeze()).unwrap(), config);
    }

    #[test]
    fn annexb_parameter_sets() {
        let config = AvcConfig::from_parameter_sets(vec![Bytes::from_static(SPS)], vec![Bytes::from_static(PPS)]).unwrap();
        assert_eq!(config.to_annexb(), [&[0, 0, 0, 1][..], SPS, &[0, 0, 0, 1], PPS].concat());
    }

    #[test]
    fn truncated_parameter_set() {
        let data = Bytes::from_static(&[1, 0x42, 0xc0, 0x1e, 0xff, 0xe1, 0x00, 0x0a, 0x67]);
        assert_eq!(AvcConfig::parse(&data).unwrap_err().get_ref(), &ParseError::TruncatedBox);
    }
}
