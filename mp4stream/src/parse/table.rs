//! A forward-only cursor over run-length encoded sample table rows.

use std::fmt;

use bytes::{Buf, Bytes};
use derive_where::derive_where;

use crate::error::Result;

use super::error::{WhereEq, WhileParsingBox};
use super::{FourCC, ParseError};

/// How to decode one row of a sample table and how many samples (or chunks) it covers.
#[derive_where(Clone, Copy)]
pub struct RowLayout<R> {
    /// Encoded length of one row in bytes.
    pub len: usize,
    pub decode: fn(&[u8]) -> R,
    /// How many times the row repeats before the next row is loaded. Rows repeating zero times are skipped.
    pub repeat: fn(&R) -> u32,
}

/// A cursor which pre-loads the first row on construction and exposes the current row until its repeat count is used
/// up.
#[derive_where(Clone; R: Clone)]
pub struct TableCursor<R> {
    layout: RowLayout<R>,
    rows: Bytes,
    current: Option<R>,
    repeat: u32,
}

impl<R> RowLayout<R> {
    /// The layout of a table where every row stands for exactly one entry.
    pub const fn single(len: usize, decode: fn(&[u8]) -> R) -> Self {
        Self { len, decode, repeat: |_| 1 }
    }
}

impl<R> fmt::Debug for RowLayout<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowLayout").field("len", &self.len).finish_non_exhaustive()
    }
}

impl<R> TableCursor<R> {
    pub fn new(layout: RowLayout<R>, rows: Bytes) -> Self {
        let mut cursor = Self { layout, rows, current: None, repeat: 0 };
        cursor.load_next_row();
        cursor
    }

    /// The current row, or `None` once every row has been used up.
    pub fn current(&self) -> Option<&R> {
        self.current.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// Step one entry forward, loading the next row when the current row's repeats run out.
    pub fn move_next(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.repeat = self.repeat.saturating_sub(1);
        if self.repeat == 0 {
            self.load_next_row();
        }
    }

    fn load_next_row(&mut self) {
        while self.rows.len() >= self.layout.len {
            let row = (self.layout.decode)(&self.rows[..self.layout.len]);
            self.rows.advance(self.layout.len);
            let repeat = (self.layout.repeat)(&row);
            if repeat != 0 {
                self.current = Some(row);
                self.repeat = repeat;
                return;
            }
        }
        self.current = None;
        self.repeat = 0;
    }
}

impl<R: fmt::Debug> fmt::Debug for TableCursor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableCursor")
            .field("current", &self.current)
            .field("repeat", &self.repeat)
            .field("rows_left", &(self.rows.len() / self.layout.len.max(1)))
            .finish()
    }
}

/// Split off the bytes of `entry_count` rows of `row_len` bytes each.
pub fn split_rows<B: Buf>(buf: &mut B, box_type: FourCC, entry_count: u32, row_len: usize) -> Result<Bytes, ParseError> {
    let Some(len) = (entry_count as usize).checked_mul(row_len) else {
        bail_attach!(ParseError::InvalidInput, "entry count overflows", WhileParsingBox(box_type));
    };
    ensure_attach!(
        buf.remaining() >= len,
        ParseError::TruncatedBox,
        WhereEq("entry_count", entry_count),
        WhileParsingBox(box_type),
    );
    Ok(buf.copy_to_bytes(len))
}

pub(crate) fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn be_u64(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
}
