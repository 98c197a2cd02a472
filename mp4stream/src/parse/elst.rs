use bytes::{BufMut, Bytes};
use fixed::types::I16F16;

use crate::error::Result;
use crate::util::rescale;

use super::error::{ParseResultExt, WhileParsingBox};
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, Mp4ValueWriterExt, ParseError};

/// Edit list. Only version 0 (32-bit) entries are supported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElstBox {
    pub entries: Vec<ElstEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElstEntry {
    /// Duration of the edit in the movie timescale.
    pub segment_duration: u32,
    /// Start of the edit in the media timeline, or `-1` for an empty edit.
    pub media_time: i32,
    pub media_rate: I16F16,
}

/// Maps media timestamps onto the presentation timeline.
///
/// Leading empty edits delay the presentation; each media edit shifts media time `media_time` to the start of the
/// edit. The cursor only moves on to the next edit once a presentation time passed to
/// [`move_next`](Self::move_next) reaches the end of the current one.
#[derive(Clone, Debug)]
pub struct ElstCursor {
    entries: Vec<ElstEntry>,
    index: usize,
    edit_start: u64,
    movie_timescale: u32,
    media_timescale: u32,
}

impl ElstBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let header = FullBoxHeader::parse(&mut buf)?;
        ensure_attach!(
            header.version == 0,
            ParseError::UnsupportedEditList,
            "64-bit edit list entries",
            WhileParsingBox(FourCC::ELST),
        );
        let entry_count: u32 = buf.get_mp4_value().while_parsing_field(FourCC::ELST, "entry_count")?;
        let mut entries = Vec::new();
        for _ in 0..entry_count {
            entries.push(ElstEntry {
                segment_duration: buf.get_mp4_value().while_parsing_field(FourCC::ELST, "segment_duration")?,
                media_time: buf.get_mp4_value().while_parsing_field(FourCC::ELST, "media_time")?,
                media_rate: buf.get_mp4_value().while_parsing_field(FourCC::ELST, "media_rate")?,
            });
        }
        Ok(Self { entries })
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        FullBoxHeader::default().put_buf(&mut out);
        out.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            out.put_u32(entry.segment_duration);
            out.put_i32(entry.media_time);
            out.put_mp4_value(&entry.media_rate);
        }
    }

    pub fn cursor(&self, movie_timescale: u32, media_timescale: u32) -> ElstCursor {
        let media_edits = self.entries.iter().filter(|entry| !entry.is_empty_edit()).count();
        if media_edits > 1 {
            log::warn!("edit list has {media_edits} media edits; later edits are applied as timeline shifts only");
        }
        let mut cursor =
            ElstCursor { entries: self.entries.clone(), index: 0, edit_start: 0, movie_timescale, media_timescale };
        cursor.skip_empty_edits();
        cursor
    }
}

impl ElstEntry {
    pub fn is_empty_edit(&self) -> bool {
        self.media_time == -1
    }
}

impl ElstCursor {
    /// Translate a media presentation time into the edited presentation timeline.
    pub fn adjust(&self, pts: u64) -> u64 {
        match self.entries.get(self.index) {
            Some(edit) => {
                let shifted = pts as i128 - i128::from(edit.media_time) + i128::from(self.edit_start);
                shifted.clamp(0, i128::from(u64::MAX)) as u64
            }
            None => pts.saturating_add(self.edit_start),
        }
    }

    /// Advance to the next edit once `pts` (already [adjusted](Self::adjust)) reaches the end of the current one.
    pub fn move_next(&mut self, pts: u64) {
        let Some(edit) = self.entries.get(self.index) else {
            return;
        };
        if edit.segment_duration == 0 || self.index + 1 >= self.entries.len() {
            return;
        }
        let edit_end = self.edit_start + self.to_media(edit.segment_duration);
        if pts >= edit_end {
            self.edit_start = edit_end;
            self.index += 1;
            self.skip_empty_edits();
        }
    }

    fn skip_empty_edits(&mut self) {
        while let Some(edit) = self.entries.get(self.index) {
            if !edit.is_empty_edit() {
                break;
            }
            self.edit_start += self.to_media(edit.segment_duration);
            self.index += 1;
        }
    }

    fn to_media(&self, movie_duration: u32) -> u64 {
        rescale(u64::from(movie_duration), self.movie_timescale, self.media_timescale)
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn elst(version: u8, entries: &[(u32, i32)]) -> Result<ElstBox, ParseError> {
        let mut data = BytesMut::new();
        FullBoxHeader::new(version, 0).put_buf(&mut data);
        data.put_u32(entries.len() as u32);
        for (segment_duration, media_time) in entries {
            data.put_u32(*segment_duration);
            data.put_i32(*media_time);
            data.put_u32(0x0001_0000);
        }
        ElstBox::parse(&data.freeze())
    }

    #[test]
    fn version_1_is_unsupported() {
        let err = elst(1, &[(1000, 0)]).unwrap_err();
        assert_eq!(err.get_ref(), &ParseError::UnsupportedEditList);
    }

    #[test]
    fn empty_edit_then_media() {
        // 500 ms empty edit at movie timescale 1000, media starting at 1024 in a 48 kHz track.
        let cursor = elst(0, &[(500, -1), (10_000, 1024)]).unwrap().cursor(1000, 48000);
        assert_eq!(cursor.adjust(1024), 24000);
        assert_eq!(cursor.adjust(0), 24000 - 1024);
    }

    #[test]
    fn advances_only_at_edit_boundary() {
        let mut cursor = elst(0, &[(1, 0), (1, 100)]).unwrap().cursor(1, 10);
        cursor.move_next(9);
        assert_eq!(cursor.adjust(5), 5);
        cursor.move_next(10);
        assert_eq!(cursor.adjust(100), 10);
    }

    #[test]
    fn presentation_time_never_negative() {
        let cursor = elst(0, &[(0, 2048)]).unwrap().cursor(1000, 44100);
        assert_eq!(cursor.adjust(1024), 0);
    }
}
