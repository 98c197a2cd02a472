use bytes::Bytes;

use crate::error::Result;

use super::error::ParseResultExt;
use super::table::{be_u32, be_u64, split_rows, RowLayout, TableCursor};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Chunk offset table, from either a 32-bit `stco` or a 64-bit `co64` box.
#[derive(Clone, Debug)]
pub struct ChunkOffsetBox {
    pub box_type: FourCC,
    entry_count: u32,
    rows: Bytes,
}

#[derive(Clone, Debug)]
pub struct ChunkOffsetCursor {
    table: TableCursor<u64>,
}

const STCO_ROW: RowLayout<u64> = RowLayout::single(4, |row| be_u32(row).into());
const CO64_ROW: RowLayout<u64> = RowLayout::single(8, be_u64);

impl ChunkOffsetBox {
    pub fn parse_stco(data: &Bytes) -> Result<Self, ParseError> {
        Self::parse(data, FourCC::STCO)
    }

    pub fn parse_co64(data: &Bytes) -> Result<Self, ParseError> {
        Self::parse(data, FourCC::CO64)
    }

    fn parse(data: &Bytes, box_type: FourCC) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf)?;
        let entry_count = buf.get_mp4_value().while_parsing_field(box_type, "entry_count")?;
        let rows = split_rows(&mut buf, box_type, entry_count, Self::layout(box_type).len)?;
        Ok(Self { box_type, entry_count, rows })
    }

    fn layout(box_type: FourCC) -> RowLayout<u64> {
        match box_type {
            FourCC::CO64 => CO64_ROW,
            _ => STCO_ROW,
        }
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn cursor(&self) -> ChunkOffsetCursor {
        ChunkOffsetCursor { table: TableCursor::new(Self::layout(self.box_type), self.rows.clone()) }
    }
}

impl ChunkOffsetCursor {
    /// Absolute stream offset of the current chunk, or `None` once every chunk has been visited.
    pub fn current_offset(&self) -> Option<u64> {
        self.table.current().copied()
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

    #[test]
    fn co64_offsets() {
        let mut data = BytesMut::new();
        FullBoxHeader::default().put_buf(&mut data);
        data.put_u32(2);
        data.put_u64(0x1_0000_0000);
        data.put_u64(0x1_0000_1000);
        let co64 = ChunkOffsetBox::parse_co64(&data.freeze()).unwrap();
        let mut cursor = co64.cursor();
        assert_eq!(cursor.current_offset(), Some(0x1_0000_0000));
        cursor.move_next();
        assert_eq!(cursor.current_offset(), Some(0x1_0000_1000));
        cursor.move_next();
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn stco_offsets() {
        let mut data = BytesMut::new();
        FullBoxHeader::default().put_buf(&mut data);
        data.put_u32(1);
        data.put_u32(48);
        let stco = ChunkOffsetBox::parse_stco(&data.freeze()).unwrap();
        assert_eq!(stco.entry_count(), 1);
        assert_eq!(stco.cursor().current_offset(), Some(48));
    }
}
