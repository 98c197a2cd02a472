use bytes::Bytes;

use crate::error::Result;

use super::error::ParseResultExt;
use super::table::{be_u32, split_rows, RowLayout, TableCursor};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Composition time offset table.
///
/// Version 0 stores unsigned offsets, version 1 signed ones; both decode to `i64`.
#[derive(Clone, Debug)]
pub struct CttsBox {
    version: u8,
    entry_count: u32,
    rows: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CttsEntry {
    pub sample_count: u32,
    pub sample_offset: i64,
}

#[derive(Clone, Debug)]
pub struct CttsCursor {
    table: TableCursor<CttsEntry>,
}

const CTTS_V0_ROW: RowLayout<CttsEntry> = RowLayout {
    len: 8,
    decode: |row| CttsEntry { sample_count: be_u32(row), sample_offset: be_u32(&row[4..]).into() },
    repeat: |entry| entry.sample_count,
};

const CTTS_V1_ROW: RowLayout<CttsEntry> = RowLayout {
    len: 8,
    decode: |row| CttsEntry { sample_count: be_u32(row), sample_offset: (be_u32(&row[4..]) as i32).into() },
    repeat: |entry| entry.sample_count,
};

impl CttsBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let header = FullBoxHeader::parse(&mut buf)?;
        header.ensure_version(FourCC::CTTS, 1)?;
        let entry_count = buf.get_mp4_value().while_parsing_field(FourCC::CTTS, "entry_count")?;
        let rows = split_rows(&mut buf, FourCC::CTTS, entry_count, CTTS_V0_ROW.len)?;
        Ok(Self { version: header.version, entry_count, rows })
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn cursor(&self) -> CttsCursor {
        let layout = match self.version {
            0 => CTTS_V0_ROW,
            _ => CTTS_V1_ROW,
        };
        CttsCursor { table: TableCursor::new(layout, self.rows.clone()) }
    }
}

impl CttsCursor {
    /// Composition offset of the current sample, `0` once exhausted.
    pub fn current_offset(&self) -> i64 {
        self.table.current().map_or(0, |entry| entry.sample_offset)
    }

    pub fn is_exhausted(&self) -> bool {
        self.table.is_exhausted()
    }

    pub fn move_next(&mut self) {
        self.table.move_next()
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn ctts(version: u8, entries: &[(u32, i32)]) -> CttsBox {
        let mut data = BytesMut::new();
        FullBoxHeader::new(version, 0).put_buf(&mut data);
        data.put_u32(entries.len() as u32);
        for (count, offset) in entries {
            data.put_u32(*count);
            data.put_i32(*offset);
        }
        CttsBox::parse(&data.freeze()).unwrap()
    }

    #[test]
    fn signed_offsets_in_version_1() {
        let mut cursor = ctts(1, &[(1, 1024), (2, -512)]).cursor();
        let mut offsets = vec![];
        while !cursor.is_exhausted() {
            offsets.push(cursor.current_offset());
            cursor.move_next();
        }
        assert_eq!(offsets, [1024, -512, -512]);
    }

    #[test]
    fn unsigned_offsets_in_version_0() {
        let cursor = ctts(0, &[(1, -1)]).cursor();
        assert_eq!(cursor.current_offset(), i64::from(u32::MAX));
    }
}
