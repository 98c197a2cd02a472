use bytes::Bytes;

use crate::error::Result;

use super::error::ParseResultExt;
use super::table::{be_u32, split_rows, RowLayout, TableCursor};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Sample-to-chunk table.
#[derive(Clone, Debug)]
pub struct StscBox {
    entry_count: u32,
    rows: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StscEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Walks the chunks of a track, reporting how many samples each one holds.
///
/// The last entry describes every remaining chunk, so once it is reached the cursor stays on it for good; the chunk
/// offset table decides when the track actually ends.
#[derive(Clone, Debug)]
pub struct StscCursor {
    lookahead: TableCursor<StscEntry>,
    current: Option<StscEntry>,
    chunk: u32,
}

const STSC_ROW: RowLayout<StscEntry> = RowLayout::single(12, |row| StscEntry {
    first_chunk: be_u32(row),
    samples_per_chunk: be_u32(&row[4..]),
    sample_description_index: be_u32(&row[8..]),
});

impl StscBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf)?;
        let entry_count = buf.get_mp4_value().while_parsing_field(FourCC::STSC, "entry_count")?;
        let rows = split_rows(&mut buf, FourCC::STSC, entry_count, STSC_ROW.len)?;
        Ok(Self { entry_count, rows })
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn cursor(&self) -> StscCursor {
        let mut lookahead = TableCursor::new(STSC_ROW, self.rows.clone());
        let current = lookahead.current().copied();
        lookahead.move_next();
        StscCursor { lookahead, current, chunk: current.map_or(1, |entry| entry.first_chunk) }
    }
}

impl StscCursor {
    /// Samples in the current chunk, or `0` for an empty table.
    pub fn samples_per_chunk(&self) -> u32 {
        self.current.map_or(0, |entry| entry.samples_per_chunk)
    }

    /// The 1-based number of the current chunk.
    pub fn chunk(&self) -> u32 {
        self.chunk
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn move_next(&mut self) {
        self.chunk = self.chunk.saturating_add(1);
        if let Some(next) = self.lookahead.current() {
            if self.chunk >= next.first_chunk {
                self.current = Some(*next);
                self.lookahead.move_next();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn stsc(entries: &[(u32, u32)]) -> StscBox {
        let mut data = BytesMut::new();
        FullBoxHeader::default().put_buf(&mut data);
        data.put_u32(entries.len() as u32);
        for (first_chunk, samples_per_chunk) in entries {
            data.put_u32(*first_chunk);
            data.put_u32(*samples_per_chunk);
            data.put_u32(1);
        }
        StscBox::parse(&data.freeze()).unwrap()
    }

    #[test]
    fn last_entry_sticks() {
        let mut cursor = stsc(&[(1, 3), (3, 2)]).cursor();
        let mut counts = vec![];
        for _ in 0..6 {
            counts.push(cursor.samples_per_chunk());
            cursor.move_next();
        }
        assert_eq!(counts, [3, 3, 2, 2, 2, 2]);
        assert!(!cursor.is_empty());
    }

    #[test]
    fn single_entry_applies_to_every_chunk() {
        let mut cursor = stsc(&[(1, 10)]).cursor();
        for chunk in 1..=100 {
            assert_eq!(cursor.chunk(), chunk);
            assert_eq!(cursor.samples_per_chunk(), 10);
            cursor.move_next();
        }
    }

    #[test]
    fn empty_table() {
        let cursor = stsc(&[]).cursor();
        assert!(cursor.is_empty());
        assert_eq!(cursor.samples_per_chunk(), 0);
    }
}
