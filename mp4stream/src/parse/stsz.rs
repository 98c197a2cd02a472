use bytes::Bytes;

use crate::error::Result;

use super::error::ParseResultExt;
use super::table::{be_u32, split_rows, RowLayout, TableCursor};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Sample size table.
///
/// A non-zero `sample_size` means every sample has that size and no per-sample table follows.
#[derive(Clone, Debug)]
pub struct StszBox {
    pub sample_size: u32,
    pub sample_count: u32,
    rows: Bytes,
}

#[derive(Clone, Debug)]
pub struct StszCursor {
    sizes: StszSizes,
    remaining: u32,
}

#[derive(Clone, Debug)]
enum StszSizes {
    Fixed(u32),
    Table(TableCursor<u32>),
}

const STSZ_ROW: RowLayout<u32> = RowLayout::single(4, be_u32);

impl StszBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf)?;
        let sample_size = buf.get_mp4_value().while_parsing_field(FourCC::STSZ, "sample_size")?;
        let sample_count = buf.get_mp4_value().while_parsing_field(FourCC::STSZ, "sample_count")?;
        let rows = match sample_size {
            0 => split_rows(&mut buf, FourCC::STSZ, sample_count, STSZ_ROW.len)?,
            _ => Bytes::new(),
        };
        Ok(Self { sample_size, sample_count, rows })
    }

    pub fn cursor(&self) -> StszCursor {
        let sizes = match self.sample_size {
            0 => StszSizes::Table(TableCursor::new(STSZ_ROW, self.rows.clone())),
            size => StszSizes::Fixed(size),
        };
        StszCursor { sizes, remaining: self.sample_count }
    }
}

impl StszCursor {
    /// Size of the current sample, or `None` once every sample has been consumed.
    pub fn current_size(&self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        match &self.sizes {
            StszSizes::Fixed(size) => Some(*size),
            StszSizes::Table(table) => table.current().copied(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_size().is_none()
    }

    pub fn move_next(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        if let StszSizes::Table(table) = &mut self.sizes {
            table.move_next();
        }
    }
}
