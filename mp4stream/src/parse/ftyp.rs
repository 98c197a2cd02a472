use bytes::{Buf, BufMut, Bytes};

use crate::error::Result;

use super::error::ParseResultExt;
use super::{FourCC, Mp4ValueReaderExt, ParseError};

/// File type box, also used for segment type (`styp`) boxes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FtypBox {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl FtypBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let major_brand = buf.get_mp4_value().while_parsing_field(FourCC::FTYP, "major_brand")?;
        let minor_version = buf.get_mp4_value().while_parsing_field(FourCC::FTYP, "minor_version")?;
        let mut compatible_brands = Vec::with_capacity(buf.remaining() / 4);
        while buf.remaining() >= 4 {
            compatible_brands.push(buf.get_mp4_value()?);
        }
        Ok(Self { major_brand, minor_version, compatible_brands })
    }

    pub fn encoded_len(&self) -> u64 {
        8 + 4 * self.compatible_brands.len() as u64
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        self.major_brand.put_buf(&mut out);
        out.put_u32(self.minor_version);
        for brand in &self.compatible_brands {
            brand.put_buf(&mut out);
        }
    }
}
