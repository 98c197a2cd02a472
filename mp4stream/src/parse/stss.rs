use bytes::Bytes;

use crate::error::Result;

use super::error::ParseResultExt;
use super::table::{be_u32, split_rows, RowLayout, TableCursor};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError};

/// Sync sample table. Tracks without one treat every sample as a sync sample.
#[derive(Clone, Debug)]
pub struct StssBox {
    entry_count: u32,
    rows: Bytes,
}

#[derive(Clone, Debug)]
pub struct StssCursor {
    table: TableCursor<u32>,
}

const STSS_ROW: RowLayout<u32> = RowLayout::single(4, be_u32);

impl StssBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf)?;
        let entry_count = buf.get_mp4_value().while_parsing_field(FourCC::STSS, "entry_count")?;
        let rows = split_rows(&mut buf, FourCC::STSS, entry_count, STSS_ROW.len)?;
        Ok(Self { entry_count, rows })
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn cursor(&self) -> StssCursor {
        StssCursor { table: TableCursor::new(STSS_ROW, self.rows.clone()) }
    }
}

impl StssCursor {
    /// Whether the 1-based `sample_number` is a sync sample. Sample numbers must be queried in increasing order.
    pub fn is_sync(&mut self, sample_number: u32) -> bool {
        while let Some(&sync_sample) = self.table.current() {
            if sync_sample >= sample_number {
                return sync_sample == sample_number;
            }
            self.table.move_next();
        }
        false
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;

    #[test]
    fn sync_samples_in_order() {
        let mut data = BytesMut::new();
        FullBoxHeader::default().put_buf(&mut data);
        data.put_u32(2);
        data.put_u32(1);
        data.put_u32(4);
        let mut cursor = StssBox::parse(&data.freeze()).unwrap().cursor();
        let sync: Vec<bool> = (1..=6).map(|sample| cursor.is_sync(sample)).collect();
        assert_eq!(sync, [true, false, false, true, false, false]);
    }
}
