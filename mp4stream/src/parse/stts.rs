use bytes::Bytes;

use crate::error::Result;

use super::error::ParseResultExt;
use super::table::{be_u32, split_rows, RowLayout, TableCursor};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Time-to-sample table.
#[derive(Clone, Debug)]
pub struct SttsBox {
    entry_count: u32,
    rows: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Walks the decode timeline one sample at a time.
///
/// [`current_pts`](Self::current_pts) is always the decode time of the sample about to be read: each
/// [`move_next`](Self::move_next) adds the delta that was current before the call.
#[derive(Clone, Debug)]
pub struct SttsCursor {
    table: TableCursor<SttsEntry>,
    current_pts: u64,
}

const STTS_ROW: RowLayout<SttsEntry> = RowLayout {
    len: 8,
    decode: |row| SttsEntry { sample_count: be_u32(row), sample_delta: be_u32(&row[4..]) },
    repeat: |entry| entry.sample_count,
};

impl SttsBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf)?;
        let entry_count = buf.get_mp4_value().while_parsing_field(FourCC::STTS, "entry_count")?;
        let rows = split_rows(&mut buf, FourCC::STTS, entry_count, STTS_ROW.len)?;
        Ok(Self { entry_count, rows })
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn entries(&self) -> impl Iterator<Item = SttsEntry> + '_ {
        self.rows.chunks_exact(STTS_ROW.len).map(STTS_ROW.decode)
    }

    pub fn sample_count(&self) -> u64 {
        self.entries().map(|entry| u64::from(entry.sample_count)).sum()
    }

    /// Sum of every sample delta, which is the media duration of the track.
    pub fn total_duration(&self) -> u64 {
        self.entries().map(|entry| u64::from(entry.sample_count) * u64::from(entry.sample_delta)).sum()
    }

    pub fn cursor(&self) -> SttsCursor {
        SttsCursor { table: TableCursor::new(STTS_ROW, self.rows.clone()), current_pts: 0 }
    }
}

impl SttsCursor {
    pub fn current_pts(&self) -> u64 {
        self.current_pts
    }

    /// The delta of the current sample, or `0` once the table is exhausted.
    pub fn current_delta(&self) -> u32 {
        self.table.current().map_or(0, |entry| entry.sample_delta)
    }

    pub fn is_exhausted(&self) -> bool {
        self.table.is_exhausted()
    }

    pub fn move_next(&mut self) {
        self.current_pts += u64::from(self.current_delta());
        self.table.move_next();
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn stts(entries: &[(u32, u32)]) -> SttsBox {
        let mut data = BytesMut::new();
        FullBoxHeader::default().put_buf(&mut data);
        data.put_u32(entries.len() as u32);
        for (count, delta) in entries {
            data.put_u32(*count);
            data.put_u32(*delta);
        }
        SttsBox::parse(&data.freeze()).unwrap()
    }

    #[test]
    fn pts_is_start_of_next_sample() {
        let mut cursor = stts(&[(2, 1024), (1, 512)]).cursor();
        let mut timeline = vec![];
        while !cursor.is_exhausted() {
            timeline.push((cursor.current_pts(), cursor.current_delta()));
            cursor.move_next();
        }
        assert_eq!(timeline, [(0, 1024), (1024, 1024), (2048, 512)]);
        assert_eq!(cursor.current_pts(), 2560);
        assert_eq!(cursor.current_delta(), 0);
    }

    #[test]
    fn deltas_sum_to_duration() {
        let stts = stts(&[(3, 1024), (5, 1000), (1, 7)]);
        let mut cursor = stts.cursor();
        let mut delta_sum = 0;
        while !cursor.is_exhausted() {
            delta_sum += u64::from(cursor.current_delta());
            cursor.move_next();
        }
        assert_eq!(delta_sum, stts.total_duration());
        assert_eq!(cursor.current_pts(), stts.total_duration());
        assert_eq!(stts.sample_count(), 9);
    }
}
