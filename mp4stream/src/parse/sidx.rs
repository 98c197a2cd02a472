use bytes::{BufMut, Bytes};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Segment index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidxBox {
    pub reference_id: u32,
    pub timescale: u32,
    pub earliest_presentation_time: u64,
    pub first_offset: u64,
    pub references: Vec<SidxReference>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SidxReference {
    pub reference_type: bool,
    pub referenced_size: u32,
    pub subsegment_duration: u32,
    pub starts_with_sap: bool,
    pub sap_type: u8,
    pub sap_delta_time: u32,
}

impl SidxBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let header = FullBoxHeader::parse(&mut buf)?;
        header.ensure_version(FourCC::SIDX, 1)?;
        let reference_id = buf.get_mp4_value().while_parsing_field(FourCC::SIDX, "reference_ID")?;
        let timescale = buf.get_mp4_value().while_parsing_field(FourCC::SIDX, "timescale")?;
        let (earliest_presentation_time, first_offset) = match header.version {
            0 => (u64::from(buf.get_mp4_value::<u32>()?), u64::from(buf.get_mp4_value::<u32>()?)),
            _ => (buf.get_mp4_value()?, buf.get_mp4_value()?),
        };
        buf.skip_mp4(2)?; // reserved
        let reference_count: u16 = buf.get_mp4_value().while_parsing_field(FourCC::SIDX, "reference_count")?;
        let mut references = Vec::with_capacity(reference_count.into());
        for _ in 0..reference_count {
            let size: u32 = buf.get_mp4_value()?;
            let subsegment_duration = buf.get_mp4_value()?;
            let sap: u32 = buf.get_mp4_value()?;
            references.push(SidxReference {
                reference_type: size & 0x8000_0000 != 0,
                referenced_size: size & 0x7fff_ffff,
                subsegment_duration,
                starts_with_sap: sap & 0x8000_0000 != 0,
                sap_type: ((sap >> 28) & 0x7) as u8,
                sap_delta_time: sap & 0x0fff_ffff,
            });
        }
        Ok(Self { reference_id, timescale, earliest_presentation_time, first_offset, references })
    }

    /// Write the payload, as version 1 only when the times do not fit 32 bits.
    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        let version = match u32::try_from(self.earliest_presentation_time).and(u32::try_from(self.first_offset)) {
            Ok(_) => 0,
            Err(_) => 1,
        };
        FullBoxHeader::new(version, 0).put_buf(&mut out);
        out.put_u32(self.reference_id);
        out.put_u32(self.timescale);
        if version == 0 {
            out.put_u32(self.earliest_presentation_time as u32);
            out.put_u32(self.first_offset as u32);
        } else {
            out.put_u64(self.earliest_presentation_time);
            out.put_u64(self.first_offset);
        }
        out.put_u16(0);
        out.put_u16(self.references.len() as u16);
        for reference in &self.references {
            out.put_u32(u32::from(reference.reference_type) << 31 | reference.referenced_size & 0x7fff_ffff);
            out.put_u32(reference.subsegment_duration);
            out.put_u32(
                u32::from(reference.starts_with_sap) << 31
                    | u32::from(reference.sap_type & 0x7) << 28
                    | reference.sap_delta_time & 0x0fff_ffff,
            );
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn large_times_use_version_1() {
        let sidx = SidxBox {
            reference_id: 1,
            timescale: 90000,
            earliest_presentation_time: 1 << 33,
            first_offset: 0,
            references: vec![SidxReference {
                reference_type: false,
                referenced_size: 4096,
                subsegment_duration: 90000,
                starts_with_sap: true,
                sap_type: 1,
                sap_delta_time: 0,
            }],
        };
        let mut data = BytesMut::new();
        sidx.put_buf(&mut data);
        assert_eq!(data[0], 1);
        assert_eq!(data.len(), 4 + 8 + 16 + 4 + 12);
        assert_eq!(SidxBox::parse(&data.freeze()).unwrap(), sidx);
    }
}
