use bytes::{Buf, Bytes};

use crate::error::Result;

use super::error::ParseResultExt;
use super::table::split_rows;
use super::{FourCC, FullBoxHeader, Mp4ValueReaderExt, ParseError, SampleDefaults};

/// Track fragment run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrunBox {
    pub version: u8,
    pub flags: u32,
    pub sample_count: u32,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    rows: Bytes,
}

/// One sample described by a run, with every omitted field filled in from the resolved defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrunSample {
    /// Absolute stream offset of the sample data.
    pub position: u64,
    pub size: u32,
    pub duration: u32,
    pub flags: u32,
    pub composition_offset: i64,
    pub decode_time: u64,
}

/// Iterates the samples of one run.
#[derive(Clone, Debug)]
pub struct TrunCursor {
    run: TrunBox,
    defaults: SampleDefaults,
    rows: Bytes,
    index: u32,
    position: u64,
    decode_time: u64,
}

impl TrunBox {
    pub const DATA_OFFSET_PRESENT: u32 = 0x00_0001;
    pub const FIRST_SAMPLE_FLAGS_PRESENT: u32 = 0x00_0004;
    pub const SAMPLE_DURATION_PRESENT: u32 = 0x00_0100;
    pub const SAMPLE_SIZE_PRESENT: u32 = 0x00_0200;
    pub const SAMPLE_FLAGS_PRESENT: u32 = 0x00_0400;
    pub const SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT: u32 = 0x00_0800;

    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        let header = FullBoxHeader::parse(&mut buf)?;
        header.ensure_version(FourCC::TRUN, 1)?;
        let FullBoxHeader { version, flags } = header;
        let sample_count = buf.get_mp4_value().while_parsing_field(FourCC::TRUN, "sample_count")?;
        let data_offset = match flags & Self::DATA_OFFSET_PRESENT {
            0 => None,
            _ => Some(buf.get_mp4_value().while_parsing_field(FourCC::TRUN, "data_offset")?),
        };
        let first_sample_flags = match flags & Self::FIRST_SAMPLE_FLAGS_PRESENT {
            0 => None,
            _ => Some(buf.get_mp4_value().while_parsing_field(FourCC::TRUN, "first_sample_flags")?),
        };
        let rows = split_rows(&mut buf, FourCC::TRUN, sample_count, Self::row_len(flags))?;
        Ok(Self { version, flags, sample_count, data_offset, first_sample_flags, rows })
    }

    /// Bytes per sample row for the given run flags.
    pub const fn row_len(flags: u32) -> usize {
        let mut len = 0;
        if flags & Self::SAMPLE_DURATION_PRESENT != 0 {
            len += 4;
        }
        if flags & Self::SAMPLE_SIZE_PRESENT != 0 {
            len += 4;
        }
        if flags & Self::SAMPLE_FLAGS_PRESENT != 0 {
            len += 4;
        }
        if flags & Self::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT != 0 {
            len += 4;
        }
        len
    }

    /// Iterate this run's samples, starting at absolute stream offset `position` and decode time `decode_time`.
    pub fn cursor(&self, defaults: SampleDefaults, position: u64, decode_time: u64) -> TrunCursor {
        TrunCursor { run: self.clone(), defaults, rows: self.rows.clone(), index: 0, position, decode_time }
    }
}

impl TrunCursor {
    /// Stream offset and decode time just past the last sample, or `None` if either does not fit in a `u64`.
    ///
    /// Iterating a run whose end is `None` yields saturated positions and decode times.
    pub fn end(&self) -> Option<(u64, u64)> {
        self.clone().try_fold((self.position, self.decode_time), |_, sample| {
            let position = sample.position.checked_add(sample.size.into())?;
            let decode_time = sample.decode_time.checked_add(sample.duration.into())?;
            Some((position, decode_time))
        })
    }
}

impl Iterator for TrunCursor {
    type Item = TrunSample;

    fn next(&mut self) -> Option<TrunSample> {
        if self.index >= self.run.sample_count {
            return None;
        }
        let flags = self.run.flags;
        let mut field = |flag: u32| (flags & flag != 0).then(|| self.rows.get_u32());
        let duration = field(TrunBox::SAMPLE_DURATION_PRESENT).unwrap_or(self.defaults.duration);
        let size = field(TrunBox::SAMPLE_SIZE_PRESENT).unwrap_or(self.defaults.size);
        let sample_flags = field(TrunBox::SAMPLE_FLAGS_PRESENT);
        let composition_offset = field(TrunBox::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT).map_or(0, |offset| {
            match self.run.version {
                0 => i64::from(offset),
                _ => i64::from(offset as i32),
            }
        });
        let sample_flags = match (sample_flags, self.run.first_sample_flags) {
            (Some(sample_flags), _) => sample_flags,
            (None, Some(first_sample_flags)) if self.index == 0 => first_sample_flags,
            (None, _) => self.defaults.flags,
        };

        let sample = TrunSample {
            position: self.position,
            size,
            duration,
            flags: sample_flags,
            composition_offset,
            decode_time: self.decode_time,
        };
        self.index += 1;
        self.position = self.position.saturating_add(size.into());
        self.decode_time = self.decode_time.saturating_add(duration.into());
        Some(sample)
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;

    const DEFAULTS: SampleDefaults =
        SampleDefaults { sample_description_index: 1, duration: 1024, size: 10, flags: 0x0200_0000 };

    #[test]
    fn omitted_fields_use_defaults() {
        let mut data = BytesMut::new();
        FullBoxHeader::new(0, TrunBox::DATA_OFFSET_PRESENT | TrunBox::SAMPLE_SIZE_PRESENT).put_buf(&mut data);
        data.put_u32(2);
        data.put_i32(100);
        data.put_u32(7);
        data.put_u32(9);
        let trun = TrunBox::parse(&data.freeze()).unwrap();
        assert_eq!(trun.data_offset, Some(100));

        let samples: Vec<_> = trun.cursor(DEFAULTS, 1000, 0).collect();
        assert_eq!(samples.len(), 2);
        let first = TrunSample {
            position: 1000,
            size: 7,
            duration: 1024,
            flags: 0x0200_0000,
            composition_offset: 0,
            decode_time: 0,
        };
        assert_eq!(samples[0], first);
        assert_eq!(samples[1].position, 1007);
        assert_eq!(samples[1].decode_time, 1024);
        assert_eq!(trun.cursor(DEFAULTS, 1000, 0).end(), Some((1016, 2048)));
    }

    #[test]
    fn first_sample_flags_apply_once() {
        let mut data = BytesMut::new();
        FullBoxHeader::new(1, TrunBox::FIRST_SAMPLE_FLAGS_PRESENT | TrunBox::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT)
            .put_buf(&mut data);
        data.put_u32(2);
        data.put_u32(0x0200_0000);
        data.put_i32(-512);
        data.put_i32(512);
        let trun = TrunBox::parse(&data.freeze()).unwrap();
        let defaults = SampleDefaults { flags: 0x0101_0000, ..DEFAULTS };
        let samples: Vec<_> = trun.cursor(defaults, 0, 0).collect();
        assert_eq!(samples[0].flags, 0x0200_0000);
        assert_eq!(samples[0].composition_offset, -512);
        assert_eq!(samples[1].flags, 0x0101_0000);
        assert_eq!(samples[1].composition_offset, 512);
    }

    #[test]
    fn run_past_end_of_stream() {
        let mut data = BytesMut::new();
        FullBoxHeader::new(0, TrunBox::SAMPLE_SIZE_PRESENT).put_buf(&mut data);
        data.put_u32(2);
        data.put_u32(4);
        data.put_u32(4);
        let trun = TrunBox::parse(&data.freeze()).unwrap();
        assert_eq!(trun.cursor(DEFAULTS, u64::MAX - 8, 0).end(), Some((u64::MAX, 2048)));
        assert_eq!(trun.cursor(DEFAULTS, u64::MAX - 4, 0).end(), None);
        assert_eq!(trun.cursor(DEFAULTS, 0, u64::MAX - 1024).end(), None);

        let positions: Vec<u64> = trun.cursor(DEFAULTS, u64::MAX - 4, 0).map(|sample| sample.position).collect();
        assert_eq!(positions, [u64::MAX - 4, u64::MAX]);
    }

    #[test]
    fn truncated_rows() {
        let mut data = BytesMut::new();
        FullBoxHeader::new(0, TrunBox::SAMPLE_SIZE_PRESENT).put_buf(&mut data);
        data.put_u32(3);
        data.put_u32(1);
        let err = TrunBox::parse(&data.freeze()).unwrap_err();
        assert_eq!(err.get_ref(), &ParseError::TruncatedBox);
    }
}
