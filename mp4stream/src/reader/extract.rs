use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::Result;
use crate::parse::error::{AtOffset, ParseResultExt};
use crate::parse::{ParseError, TrunSample};

use super::track::Track;
use super::{emit, ReadEvent};

/// The part of a media data box the reader can cut samples from.
pub(super) struct MdatSource<'a> {
    /// Stream offset of the first payload byte.
    pub(super) payload_start: u64,
    /// Stream offset just past the last payload byte, as declared by the box header.
    pub(super) payload_end: u64,
    pub(super) data: MdatData<'a>,
}

pub(super) enum MdatData<'a> {
    /// The payload prefix buffered so far. Samples cut from it are copied.
    Partial(&'a [u8]),
    /// The whole payload. Samples cut from it share its buffer.
    Complete(&'a Bytes),
}

/// A media data box buffered whole because it arrived before the tracks describing it.
#[derive(Debug)]
pub(super) struct StoredMdat {
    pub(super) payload_start: u64,
    pub(super) payload: Bytes,
}

impl StoredMdat {
    fn source(&self) -> MdatSource<'_> {
        MdatSource {
            payload_start: self.payload_start,
            payload_end: self.payload_start + self.payload.len() as u64,
            data: MdatData::Complete(&self.payload),
        }
    }
}

impl MdatSource<'_> {
    fn available_end(&self) -> u64 {
        let len = match &self.data {
            MdatData::Partial(data) => data.len(),
            MdatData::Complete(data) => data.len(),
        };
        self.payload_start + len as u64
    }

    fn contains(&self, position: u64, len: u64) -> bool {
        position >= self.payload_start && position.checked_add(len).map_or(false, |end| end <= self.payload_end)
    }

    fn sample(&self, position: u64, size: u32) -> Result<Bytes, ParseError> {
        ensure_attach!(self.contains(position, size.into()), ParseError::SampleOutsideMdat, AtOffset(position));
        let end = position + u64::from(size);
        ensure_attach!(end <= self.available_end(), ParseError::TruncatedBox, AtOffset(position));

        let range = (position - self.payload_start) as usize..(end - self.payload_start) as usize;
        Ok(match &self.data {
            MdatData::Partial(data) => Bytes::copy_from_slice(&data[range]),
            MdatData::Complete(data) => data.slice(range),
        })
    }
}

/// Emit every classic chunk that lies in `mdat` and has been buffered, lowest stream offset first across tracks.
///
/// Stops at the first chunk that starts past the end of this box, since it belongs to a later one, or that has not
/// completely arrived yet.
pub(super) fn extract_chunks<F>(
    tracks: &mut BTreeMap<u32, Track>,
    mdat: &MdatSource<'_>,
    handler: &mut F,
) -> Result<(), ParseError>
where
    F: FnMut(ReadEvent<'_>) -> bool,
{
    loop {
        let mut next: Option<(u64, u64, u32)> = None;
        for (&track_id, track) in tracks.iter() {
            if let Some((offset, len)) = track.next_chunk().for_track(track_id)? {
                if next.map_or(true, |(next_offset, ..)| offset < next_offset) {
                    next = Some((offset, len, track_id));
                }
            }
        }
        let Some((offset, len, track_id)) = next else {
            return Ok(());
        };
        if offset >= mdat.payload_end {
            return Ok(());
        }
        ensure_attach!(mdat.contains(offset, len), ParseError::SampleOutsideMdat, AtOffset(offset));
        if offset + len > mdat.available_end() {
            return Ok(());
        }
        let Some(track) = tracks.get_mut(&track_id) else {
            return Ok(());
        };
        emit_chunk(track, offset, mdat, handler).for_track(track_id)?;
    }
}

/// Emit every classic sample of one track from media data boxes that were buffered before the track was known.
pub(super) fn extract_track<F>(track: &mut Track, stored: &[StoredMdat], handler: &mut F) -> Result<(), ParseError>
where
    F: FnMut(ReadEvent<'_>) -> bool,
{
    while let Some((offset, len)) = track.next_chunk()? {
        let Some(mdat) = stored.iter().map(StoredMdat::source).find(|mdat| mdat.contains(offset, len)) else {
            bail_attach!(ParseError::SampleOutsideMdat, AtOffset(offset));
        };
        emit_chunk(track, offset, &mdat, handler)?;
    }
    Ok(())
}

fn emit_chunk<F>(track: &mut Track, offset: u64, mdat: &MdatSource<'_>, handler: &mut F) -> Result<(), ParseError>
where
    F: FnMut(ReadEvent<'_>) -> bool,
{
    let mut position = offset;
    for _ in 0..track.samples_in_chunk() {
        let timing = track.next_classic_sample()?;
        let data = mdat.sample(position, timing.size)?;
        position = position.saturating_add(timing.size.into());
        let frame = track.build_frame(timing, data)?;
        emit(handler, ReadEvent::Frame(frame))?;
    }
    track.finish_chunk();
    Ok(())
}

/// Emit the samples queued by the preceding `moof` from the media data box that follows it.
pub(super) fn emit_fragment_samples<F>(
    tracks: &mut BTreeMap<u32, Track>,
    samples: Vec<(u32, TrunSample)>,
    mdat: &MdatSource<'_>,
    handler: &mut F,
) -> Result<(), ParseError>
where
    F: FnMut(ReadEvent<'_>) -> bool,
{
    for (track_id, sample) in samples {
        let Some(track) = tracks.get_mut(&track_id) else {
            continue;
        };
        let data = mdat.sample(sample.position, sample.size).for_track(track_id)?;
        let timing = track.fragment_timing(&sample);
        let frame = track.build_frame(timing, data).for_track(track_id)?;
        emit(handler, ReadEvent::Frame(frame))?;
    }
    Ok(())
}
