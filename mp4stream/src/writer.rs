//! The fragmented MP4 writer.

pub(crate) mod boxes;
mod fragment;
pub(crate) mod init;
mod track;

use bytes::Bytes;
use derive_builder::Builder;
use fixed::types::I16F16;

use crate::codec::Codec;
use crate::error::Result;
use crate::frame::Frame;
use crate::parse::{ElstBox, ElstEntry};
use crate::util::rescale;

use self::fragment::{FragmentInfo, RunSample, TrackRun};
use self::init::TrakSpec;
use self::track::TrackQueue;

/// Configuration for an [`Mp4Writer`].
#[derive(Builder, Clone, Debug)]
#[builder(build_fn(name = "try_build"))]
pub struct WriterConfig {
    /// The shortest duration of a fragment, in milliseconds. A fragment of a video primary track also ends only at a
    /// key frame.
    ///
    /// The default is 1000.
    #[builder(default = "1000")]
    pub fragment_duration_ms: u32,

    /// Write H.264 and H.265 samples in decode order with composition offsets, rather than by presentation time.
    ///
    /// The default is `false`.
    #[builder(default)]
    pub enable_dts: bool,

    /// Timescale of the movie header.
    ///
    /// The default is 1000.
    #[builder(default = "1000")]
    pub movie_timescale: u32,
}

/// Error type returned by the [writer](Mp4Writer).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// The writer was created without any tracks.
    #[error("No tracks")]
    NoTracks,

    /// A frame's codec matches none of the writer's tracks.
    #[error("No track for codec {0}")]
    NoTrackForCodec(Codec),

    /// A track's sample entry cannot be built from the configuration received so far.
    #[error("Track {0} has no usable codec configuration")]
    MissingCodecConfig(u32),

    /// A frame's fields are unusable.
    #[error("Invalid frame")]
    InvalidFrame,

    /// A track's decode timestamps went backwards.
    #[error("Timestamps of track {0} decrease")]
    NonMonotonicTimestamp(u32),

    /// The output handler returned `false`.
    #[error("Aborted by handler")]
    HandlerAborted,

    /// The writer was already finished, or halted by an earlier error.
    #[error("Writer finished")]
    Finished,
}

/// A fragmented MP4 writer.
///
/// Frames are queued per track. Once every track has a frame and its codec configuration, the init segment (`ftyp`
/// and `moov`) is handed to the output handler; after that one `styp`, `sidx`, `moof`, `mdat` fragment is handed over
/// each time the queues cover the next fragment boundary. Track 1, the first codec given to [`new`](Self::new), is
/// the primary track that decides where fragments end.
#[derive(Debug)]
pub struct Mp4Writer {
    config: WriterConfig,
    tracks: Vec<TrackQueue>,
    status: Status,
    /// Sequence number of the next fragment.
    sequence_number: u32,
    /// Primary track time at which the next fragment starts.
    fragment_start: u64,
    /// Primary track time at which the next fragment ends.
    target: u64,
    halted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    InitCheck,
    MakeInit,
    TargetCheck,
    DataCheck,
    MakeData,
    Update,
}

fn deliver<F>(out: &mut F, data: Bytes) -> Result<(), WriteError>
where
    F: FnMut(Bytes) -> bool,
{
    ensure_attach!(out(data), WriteError::HandlerAborted);
    Ok(())
}

//
// WriterConfig impls
//

impl WriterConfig {
    /// A builder starting from the default configuration.
    pub fn builder() -> WriterConfigBuilder {
        WriterConfigBuilder::default()
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WriterConfigBuilder {
    /// Build the configuration; fields that were not set keep their defaults.
    pub fn build(&self) -> WriterConfig {
        match self.try_build() {
            Ok(config) => config,
            Err(_) => unreachable!("every field has a default"),
        }
    }
}

//
// Mp4Writer impls
//

impl Mp4Writer {
    /// Create a writer with one track per codec, numbered from 1 in the given order.
    pub fn new(codecs: &[Codec], config: WriterConfig) -> Result<Self, WriteError> {
        ensure_attach!(!codecs.is_empty(), WriteError::NoTracks);
        let tracks = (1..).zip(codecs).map(|(track_id, &codec)| TrackQueue::new(track_id, codec, config.enable_dts));
        Ok(Self {
            tracks: tracks.collect(),
            config,
            status: Status::InitCheck,
            sequence_number: 1,
            fragment_start: 0,
            target: 0,
            halted: false,
        })
    }

    /// Queue `frame` on the track of its codec, and hand every segment that became complete to `out`.
    ///
    /// Returning `false` from `out` fails the write with [`WriteError::HandlerAborted`] and halts the writer.
    pub fn write<F>(&mut self, frame: Frame, mut out: F) -> Result<(), WriteError>
    where
        F: FnMut(Bytes) -> bool,
    {
        ensure_attach!(!self.halted, WriteError::Finished);
        let codec = frame.codec;
        let Some(track) = self.tracks.iter_mut().find(|track| track.codec == codec) else {
            bail_attach!(WriteError::NoTrackForCodec(codec));
        };
        let pushed = track.push(frame);
        let result = pushed.and_then(|()| self.run(&mut out));
        self.halt_on_error(result)
    }

    /// Flush every queued frame as a last fragment. The writer accepts no frames afterwards.
    pub fn finish<F>(&mut self, mut out: F) -> Result<(), WriteError>
    where
        F: FnMut(Bytes) -> bool,
    {
        ensure_attach!(!self.halted, WriteError::Finished);
        let result = self.flush(&mut out);
        self.halted = true;
        result
    }

    /// Sequence number the next fragment will carry.
    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    fn halt_on_error(&mut self, result: Result<(), WriteError>) -> Result<(), WriteError> {
        if let Err(err) = &result {
            log::error!("halting writer: {err}");
            self.halted = true;
        }
        result
    }

    fn primary(&self) -> &TrackQueue {
        &self.tracks[0]
    }

    fn run<F>(&mut self, out: &mut F) -> Result<(), WriteError>
    where
        F: FnMut(Bytes) -> bool,
    {
        loop {
            match self.status {
                Status::InitCheck => {
                    if !self.tracks.iter().all(TrackQueue::is_ready) {
                        return Ok(());
                    }
                    self.status = Status::MakeInit;
                }
                Status::MakeInit => {
                    self.make_init(out)?;
                    self.status = Status::TargetCheck;
                }
                Status::TargetCheck => match self.next_target() {
                    Some(target) => {
                        self.target = target;
                        self.status = Status::DataCheck;
                    }
                    None => return Ok(()),
                },
                Status::DataCheck => {
                    if !self.covers_target() {
                        return Ok(());
                    }
                    self.status = Status::MakeData;
                }
                Status::MakeData => {
                    let target = self.target;
                    self.make_fragment(out, Some(target))?;
                    self.status = Status::Update;
                }
                Status::Update => {
                    self.fragment_start = self.target;
                    self.sequence_number += 1;
                    self.status = Status::TargetCheck;
                }
            }
        }
    }

    fn flush<F>(&mut self, out: &mut F) -> Result<(), WriteError>
    where
        F: FnMut(Bytes) -> bool,
    {
        if matches!(self.status, Status::InitCheck | Status::MakeInit) {
            if self.tracks.iter().any(|track| !track.samples.is_empty()) {
                log::warn!("finishing before every track was ready; dropping queued frames");
            }
            return Ok(());
        }
        self.run(out)?;
        if self.tracks.iter().any(|track| !track.samples.is_empty()) {
            self.make_fragment(out, None)?;
            self.sequence_number += 1;
        }
        Ok(())
    }

    fn make_init<F>(&mut self, out: &mut F) -> Result<(), WriteError>
    where
        F: FnMut(Bytes) -> bool,
    {
        let traks = self.tracks.iter().map(|track| self.trak_spec(track)).collect::<Result<Vec<_>, _>>()?;
        let init = init::init_segment(&traks, self.config.movie_timescale);
        log::info!("init segment: {} tracks, {} bytes", traks.len(), init.len());
        self.fragment_start = self.primary().samples.front().map_or(0, |sample| sample.time);
        deliver(out, init)
    }

    fn trak_spec(&self, track: &TrackQueue) -> Result<TrakSpec, WriteError> {
        let entry = track.sample_entry()?;
        let first = track.samples.front();
        let edit = match first {
            Some(sample) if self.config.enable_dts && track.codec.is_h26x() && sample.composition_offset > 0 => {
                Some(ElstBox {
                    entries: vec![ElstEntry {
                        segment_duration: 0,
                        media_time: sample.composition_offset,
                        media_rate: I16F16::ONE,
                    }],
                })
            }
            _ => None,
        };
        Ok(TrakSpec { track_id: track.track_id, timescale: track.timescale, duration: 0, entry, edit })
    }

    /// The primary track time the next fragment ends at, once a frame at or past it has been queued.
    fn next_target(&self) -> Option<u64> {
        let primary = self.primary();
        let fragment_duration = rescale(self.config.fragment_duration_ms.into(), 1000, primary.timescale);
        let goal = self.fragment_start.saturating_add(fragment_duration);
        let can_split = |is_sync: bool| primary.codec.is_audio() || is_sync;
        let boundary = primary.samples.iter().skip(1).find(|sample| sample.time >= goal && can_split(sample.is_sync))?;
        Some(boundary.time)
    }

    /// Whether every other track has queued a frame at or past the target.
    fn covers_target(&self) -> bool {
        let primary_timescale = self.primary().timescale;
        self.tracks.iter().skip(1).all(|track| {
            let target = rescale(self.target, primary_timescale, track.timescale);
            track.last_time().map_or(false, |time| time >= target)
        })
    }

    /// Dequeue every sample before `target` (everything when `None`) and hand the fragment to `out`.
    fn make_fragment<F>(&mut self, out: &mut F, target: Option<u64>) -> Result<(), WriteError>
    where
        F: FnMut(Bytes) -> bool,
    {
        let primary_id = self.primary().track_id;
        let primary_timescale = self.primary().timescale;
        let mut runs = Vec::with_capacity(self.tracks.len());
        for track in &mut self.tracks {
            let end = target.map(|target| rescale(target, primary_timescale, track.timescale));
            if let Some(run) = take_run(track, end) {
                runs.push(run);
            }
        }
        let end = match target {
            Some(target) => target,
            None => {
                let primary_run = runs.iter().find(|run| run.track_id == primary_id);
                self.fragment_start + primary_run.map_or(0, TrackRun::duration_sum)
            }
        };
        let info = FragmentInfo {
            sequence_number: self.sequence_number,
            reference_id: primary_id,
            timescale: primary_timescale,
            start: self.fragment_start,
            duration: end.saturating_sub(self.fragment_start),
            enable_dts: self.config.enable_dts,
        };
        let fragment = fragment::build_fragment(&info, &runs);
        log::info!(
            "fragment {}: start {} duration {} at timescale {}, {} bytes",
            info.sequence_number,
            info.start,
            info.duration,
            info.timescale,
            fragment.len(),
        );
        deliver(out, fragment)
    }
}

impl TrackRun {
    fn duration_sum(&self) -> u64 {
        self.samples.iter().map(|sample| u64::from(sample.duration)).sum()
    }
}

/// Take the samples of `track` that start before `end`, or all of them when `end` is `None`.
///
/// A sample's duration is the distance to the next queued sample; the last sample of the stream keeps its own
/// duration, or repeats the previous one.
fn take_run(track: &mut TrackQueue, end: Option<u64>) -> Option<TrackRun> {
    let count = match end {
        Some(end) => track.samples.iter().take_while(|sample| sample.time < end).count(),
        None => track.samples.len(),
    };
    if count == 0 {
        return None;
    }
    let decode_time = track.samples.front().map_or(0, |sample| sample.time);
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let sample = track.samples.pop_front()?;
        let duration = match track.samples.front() {
            Some(next) => u32::try_from(next.time - sample.time).unwrap_or(u32::MAX),
            None if sample.duration != 0 => sample.duration,
            None => track.last_duration,
        };
        track.last_duration = duration;
        samples.push(RunSample {
            duration,
            is_sync: sample.is_sync,
            composition_offset: sample.composition_offset,
            data: sample.data,
        });
    }
    Some(TrackRun { track_id: track.track_id, codec: track.codec, decode_time, samples })
}
