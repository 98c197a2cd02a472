//! The incremental box-stream reader.

mod extract;
mod track;

use std::collections::BTreeMap;
use std::mem;

use bytes::{Buf, Bytes, BytesMut};
use derive_builder::Builder;

use crate::atom::Mp4Atom;
use crate::error::Result;
use crate::frame::Frame;
use crate::parse::error::{AtOffset, ForTrack, ParseResultExt, WhileParsingBox};
use crate::parse::{
    classify, BoxClass, BoxHeader, DecodedBox, FourCC, MvexBox, ParseError, SampleDefaults, TrafBox, TrunSample,
};

use self::extract::{MdatData, MdatSource, StoredMdat};
use self::track::Track;

/// Configuration for an [`Mp4Reader`].
#[derive(Builder, Clone, Debug)]
#[builder(build_fn(name = "try_build"))]
pub struct ReaderConfig {
    /// The largest box, other than a media data box, the reader will buffer before decoding it.
    ///
    /// The default is 1 GiB.
    #[builder(default = "1 << 30")]
    pub max_box_size: u64,

    /// Skip tracks whose sample entry describes a codec the reader cannot produce frames for, rather than halting.
    ///
    /// The default is `false`.
    #[builder(default)]
    pub skip_unsupported_tracks: bool,
}

/// Something the [reader](Mp4Reader) observed in the stream.
#[derive(Debug)]
pub enum ReadEvent<'a> {
    /// A box boundary.
    Atom(&'a Mp4Atom),
    /// A sample, or a codec configuration frame.
    Frame(Frame),
}

/// An incremental MP4 and fragmented MP4 reader.
///
/// Bytes are pushed in with [`read`](Self::read) in pieces of any size. Every box, and every frame whose data has
/// arrived, is passed to the handler in stream order. Three layouts are understood: a classic file with the movie
/// header before the media data, the same with the media data first, and fragmented MP4.
///
/// The first error halts the reader for good: every later call returns the same error, and
/// [`error_code`](Self::error_code) reports its numeric code.
#[derive(Debug)]
pub struct Mp4Reader {
    config: ReaderConfig,
    pending: BytesMut,
    /// Stream offset of the first byte of `pending`.
    position: u64,
    movie_timescale: u32,
    tracks: BTreeMap<u32, Track>,
    /// Tracks skipped for an unsupported codec, with their fragment defaults so their fragments can still be walked.
    skipped_tracks: BTreeMap<u32, SampleDefaults>,
    /// Containers whose end has not been reached yet, outermost first.
    containers: Vec<OpenContainer>,
    trak: Option<Track>,
    is_fragmented: bool,
    mvex: Option<MvexBox>,
    moof: Option<MoofState>,
    fragment_samples: Vec<(u32, TrunSample)>,
    stored_mdats: Vec<StoredMdat>,
    /// Payload bytes of the unfinished media data box already passed to the handler, once it has been announced.
    partial_mdat_reported: Option<usize>,
    error: Option<ParseError>,
}

#[derive(Debug)]
struct OpenContainer {
    box_type: FourCC,
    /// Stream offset just past the container.
    end: u64,
}

#[derive(Debug)]
struct MoofState {
    position: u64,
    /// Stream offset just past the data of the previous track fragment in this `moof`.
    data_end: Option<u64>,
}

fn emit<F>(handler: &mut F, event: ReadEvent<'_>) -> Result<(), ParseError>
where
    F: FnMut(ReadEvent<'_>) -> bool,
{
    ensure_attach!(handler(event), ParseError::HandlerAborted);
    Ok(())
}

//
// ReaderConfig impls
//

impl ReaderConfig {
    /// A builder starting from the default configuration.
    pub fn builder() -> ReaderConfigBuilder {
        ReaderConfigBuilder::default()
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ReaderConfigBuilder {
    /// Build the configuration; fields that were not set keep their defaults.
    pub fn build(&self) -> ReaderConfig {
        match self.try_build() {
            Ok(config) => config,
            Err(_) => unreachable!("every field has a default"),
        }
    }
}

//
// Mp4Reader impls
//

impl Mp4Reader {
    /// A reader with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ReaderConfig::default())
    }

    /// A reader with the given configuration.
    pub fn with_config(config: ReaderConfig) -> Self {
        Self {
            config,
            pending: BytesMut::new(),
            position: 0,
            movie_timescale: 0,
            tracks: BTreeMap::new(),
            skipped_tracks: BTreeMap::new(),
            containers: Vec::new(),
            trak: None,
            is_fragmented: false,
            mvex: None,
            moof: None,
            fragment_samples: Vec::new(),
            stored_mdats: Vec::new(),
            partial_mdat_reported: None,
            error: None,
        }
    }

    /// Append `input` to the stream and report everything that became available to `handler`.
    ///
    /// Returning `false` from `handler` halts the reader with [`ParseError::HandlerAborted`].
    pub fn read<F>(&mut self, input: &[u8], mut handler: F) -> Result<(), ParseError>
    where
        F: FnMut(ReadEvent<'_>) -> bool,
    {
        if let Some(error) = &self.error {
            bail_attach!(error.clone(), "reader halted by an earlier error");
        }
        self.pending.extend_from_slice(input);
        match self.drain(&mut handler) {
            Ok(()) => Ok(()),
            Err(err) => {
                log::error!("halting reader: {err}");
                self.error = Some(err.get_ref().clone());
                Err(err)
            }
        }
    }

    /// Check that the stream ended on a box boundary, after everything it announced.
    pub fn finish(&self) -> Result<(), ParseError> {
        if let Some(error) = &self.error {
            bail_attach!(error.clone(), "reader halted by an earlier error");
        }
        ensure_attach!(self.pending.is_empty(), ParseError::TruncatedBox, AtOffset(self.position));
        if let Some(container) = self.containers.last() {
            bail_attach!(ParseError::TruncatedBox, WhileParsingBox(container.box_type), AtOffset(container.end));
        }
        if !self.fragment_samples.is_empty() {
            log::warn!("stream ended with {} fragment samples and no media data", self.fragment_samples.len());
        }
        Ok(())
    }

    /// The numeric [code](ParseError::code) of the error that halted the reader, or `0`.
    pub fn error_code(&self) -> u32 {
        self.error.as_ref().map_or(0, ParseError::code)
    }

    /// Stream offset of the next byte the reader has not consumed.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether a movie extends box announced a fragmented stream.
    pub fn is_fragmented(&self) -> bool {
        self.is_fragmented
    }

    fn drain<F>(&mut self, handler: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(ReadEvent<'_>) -> bool,
    {
        loop {
            let position = self.position;
            let Some(header) = BoxHeader::peek(&self.pending).at_offset(position)? else {
                return Ok(());
            };
            let box_type = header.box_type();
            if let Some(parent) = self.containers.last() {
                ensure_attach!(
                    position.saturating_add(header.box_size()) <= parent.end,
                    ParseError::InvalidBoxLayout,
                    format!("`{box_type}` overruns its `{}`", parent.box_type),
                    AtOffset(position),
                );
            }
            match classify(box_type) {
                BoxClass::Unknown => bail_attach!(ParseError::UnsupportedBox(box_type), AtOffset(position)),
                BoxClass::Container => self.open_container(header, handler)?,
                BoxClass::MediaData => {
                    if !self.read_mdat(header, handler)? {
                        return Ok(());
                    }
                }
                BoxClass::Leaf => {
                    ensure_attach!(
                        header.box_size() <= self.config.max_box_size,
                        ParseError::BoxTooLarge,
                        WhileParsingBox(box_type),
                        AtOffset(position),
                    );
                    if (self.pending.len() as u64) < header.box_size() {
                        return Ok(());
                    }
                    self.read_leaf(header, handler)?;
                }
            }
        }
    }

    fn open_container<F>(&mut self, header: BoxHeader, handler: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(ReadEvent<'_>) -> bool,
    {
        let position = self.position;
        let box_type = header.box_type();
        let header_len = header.encoded_len();
        log::debug!("{box_type} @ 0x{position:08x}: {} bytes", header.box_size());

        match box_type {
            FourCC::TRAK => {
                ensure_attach!(self.trak.is_none(), ParseError::InvalidBoxLayout, "`trak` inside a `trak`", AtOffset(position));
            }
            FourCC::MOOF => {
                self.apply_mvex();
                self.moof = Some(MoofState { position, data_end: None });
            }
            _ => {}
        }

        self.pending.advance(header_len as usize);
        self.position += header_len;
        emit(handler, ReadEvent::Atom(&Mp4Atom::new(header, position, Bytes::new())))?;

        if box_type == FourCC::TRAK {
            self.trak = Some(Track::new());
        }
        let end = position.saturating_add(header.box_size());
        self.containers.push(OpenContainer { box_type, end });
        self.close_containers(handler)
    }

    fn read_leaf<F>(&mut self, header: BoxHeader, handler: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(ReadEvent<'_>) -> bool,
    {
        let position = self.position;
        let box_type = header.box_type();
        let Ok(box_len) = usize::try_from(header.box_size()) else {
            bail_attach!(ParseError::BoxTooLarge, WhileParsingBox(box_type), AtOffset(position));
        };
        log::debug!("{box_type} @ 0x{position:08x}: {box_len} bytes");

        let data = self.pending.split_to(box_len).freeze();
        let payload = data.slice(header.encoded_len() as usize..);
        self.position += header.box_size();

        let decoded = DecodedBox::decode(box_type, &payload).at_offset(position)?;
        let config_frame = self.apply(decoded).while_parsing_box(box_type).at_offset(position)?;

        emit(handler, ReadEvent::Atom(&Mp4Atom::new(header, position, payload)))?;
        if let Some(frame) = config_frame {
            emit(handler, ReadEvent::Frame(frame))?;
        }
        self.close_containers(handler)
    }

    /// Handle a media data box. Returns `false` when the rest of it has not arrived yet.
    fn read_mdat<F>(&mut self, header: BoxHeader, handler: &mut F) -> Result<bool, ParseError>
    where
        F: FnMut(ReadEvent<'_>) -> bool,
    {
        let position = self.position;
        let header_len = header.encoded_len();
        let payload_start = position + header_len;
        let payload_end = position + header.box_size();
        let is_classic = !self.is_fragmented && !self.tracks.is_empty();

        if (self.pending.len() as u64) < header.box_size() {
            let Some(prefix) = self.pending.get(header_len as usize..) else {
                return Ok(false);
            };
            // Each partial report carries only the bytes that arrived since the previous one.
            let reported = self.partial_mdat_reported.unwrap_or(0);
            if self.partial_mdat_reported.is_none() || reported < prefix.len() {
                let fresh = Bytes::copy_from_slice(&prefix[reported..]);
                let atom = Mp4Atom::partial(header, position, reported as u64, fresh);
                emit(handler, ReadEvent::Atom(&atom))?;
                self.partial_mdat_reported = Some(prefix.len());
            }
            if is_classic {
                let mdat = MdatSource { payload_start, payload_end, data: MdatData::Partial(prefix) };
                extract::extract_chunks(&mut self.tracks, &mdat, handler)?;
            }
            return Ok(false);
        }

        let Ok(box_len) = usize::try_from(header.box_size()) else {
            bail_attach!(ParseError::BoxTooLarge, WhileParsingBox(FourCC::MDAT), AtOffset(position));
        };
        log::debug!("mdat @ 0x{position:08x}: {box_len} bytes");
        let data = self.pending.split_to(box_len).freeze();
        let payload = data.slice(header_len as usize..);
        self.position += header.box_size();
        self.partial_mdat_reported = None;
        emit(handler, ReadEvent::Atom(&Mp4Atom::new(header, position, payload.clone())))?;

        let mdat = MdatSource { payload_start, payload_end, data: MdatData::Complete(&payload) };
        if self.is_fragmented {
            let samples = mem::take(&mut self.fragment_samples);
            extract::emit_fragment_samples(&mut self.tracks, samples, &mdat, handler)?;
        } else if is_classic {
            extract::extract_chunks(&mut self.tracks, &mdat, handler)?;
        } else if self.trak.is_none() {
            log::info!("media data before the movie header; buffering {} bytes", payload.len());
            self.stored_mdats.push(StoredMdat { payload_start, payload });
        }
        self.close_containers(handler)?;
        Ok(true)
    }

    fn apply(&mut self, decoded: DecodedBox) -> Result<Option<Frame>, ParseError> {
        if decoded.is_track_level() {
            let Some(trak) = &mut self.trak else {
                bail_attach!(ParseError::InvalidBoxLayout, "track-level box outside of a `trak`");
            };
            return trak.apply(decoded, self.config.skip_unsupported_tracks);
        }
        match decoded {
            DecodedBox::Ftyp(ftyp) | DecodedBox::Styp(ftyp) => {
                log::debug!("major brand `{}`, compatible with {:?}", ftyp.major_brand, ftyp.compatible_brands);
            }
            DecodedBox::Mvhd(mvhd) => self.movie_timescale = mvhd.timescale,
            DecodedBox::Mvex(mvex) => {
                if !self.is_fragmented {
                    log::info!("fragmented stream with {} track defaults", mvex.trex.len());
                }
                self.is_fragmented = true;
                self.mvex = Some(mvex);
            }
            DecodedBox::Mfhd(mfhd) => log::debug!("fragment {}", mfhd.sequence_number),
            DecodedBox::Traf(traf) => self.apply_traf(traf)?,
            _ => {}
        }
        Ok(None)
    }

    /// Hand the movie-level fragment defaults to their tracks, once all tracks are known.
    fn apply_mvex(&mut self) {
        let Some(mvex) = self.mvex.take() else {
            return;
        };
        for trex in mvex.trex {
            if let Some(track) = self.tracks.get_mut(&trex.track_id) {
                track.trex = trex.defaults;
            } else if let Some(defaults) = self.skipped_tracks.get_mut(&trex.track_id) {
                *defaults = trex.defaults;
            } else {
                log::warn!("`trex` for undeclared track {}", trex.track_id);
            }
        }
    }

    fn apply_traf(&mut self, traf: TrafBox) -> Result<(), ParseError> {
        let track_id = traf.tfhd.track_id;
        let Some(moof) = &mut self.moof else {
            bail_attach!(ParseError::InvalidBoxLayout, "`traf` outside of a `moof`");
        };
        let base = match traf.tfhd.base_data_offset {
            Some(base_data_offset) => base_data_offset,
            None if traf.tfhd.default_base_is_moof() => moof.position,
            None => moof.data_end.unwrap_or(moof.position),
        };

        let mut track = self.tracks.get_mut(&track_id);
        let trex = match (&track, self.skipped_tracks.get(&track_id)) {
            (Some(track), _) => track.trex,
            (None, Some(defaults)) => *defaults,
            (None, None) => bail_attach!(ParseError::UnknownTrack(track_id)),
        };
        let defaults = traf.tfhd.resolve(&trex);
        let mut decode_time = match (&traf.tfdt, &track) {
            (Some(tfdt), _) => tfdt.base_media_decode_time,
            (None, Some(track)) => track.decode_time,
            (None, None) => 0,
        };

        let mut position = base;
        for trun in &traf.truns {
            if let Some(data_offset) = trun.data_offset {
                let Some(start) = base.checked_add_signed(data_offset.into()) else {
                    bail_attach!(ParseError::InvalidInput, "`trun` data offset before the start of the stream", ForTrack(track_id));
                };
                position = start;
            }
            let samples = trun.cursor(defaults, position, decode_time);
            let Some(end) = samples.end() else {
                bail_attach!(ParseError::InvalidInput, "`trun` runs past the end of the stream", ForTrack(track_id));
            };
            (position, decode_time) = end;
            if track.is_some() {
                self.fragment_samples.extend(samples.map(|sample| (track_id, sample)));
            }
        }

        moof.data_end = Some(position);
        if let Some(track) = &mut track {
            track.decode_time = decode_time;
        }
        Ok(())
    }

    /// Close every container that ends at the current position, innermost first.
    ///
    /// Closing a `trak` finishes its track; closing a `moof` forgets its position.
    fn close_containers<F>(&mut self, handler: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(ReadEvent<'_>) -> bool,
    {
        while self.containers.last().map_or(false, |container| container.end <= self.position) {
            let Some(container) = self.containers.pop() else {
                break;
            };
            match container.box_type {
                FourCC::TRAK => {
                    if let Some(track) = self.trak.take() {
                        self.finish_track(track, handler)?;
                    }
                }
                FourCC::MOOF => self.moof = None,
                _ => {}
            }
        }
        Ok(())
    }

    fn finish_track<F>(&mut self, mut track: Track, handler: &mut F) -> Result<(), ParseError>
    where
        F: FnMut(ReadEvent<'_>) -> bool,
    {
        let Some(track_id) = track.track_id else {
            bail_attach!(ParseError::MissingTrackId, WhileParsingBox(FourCC::TRAK));
        };
        ensure_attach!(
            !self.tracks.contains_key(&track_id) && !self.skipped_tracks.contains_key(&track_id),
            ParseError::InvalidBoxLayout,
            "duplicate track id",
            ForTrack(track_id),
        );

        let Some(media) = &track.media else {
            if track.unsupported_format.is_none() && !self.config.skip_unsupported_tracks {
                bail_attach!(ParseError::InvalidSampleDescription, "track has no sample description", ForTrack(track_id));
            }
            log::warn!("skipping track {track_id}");
            self.skipped_tracks.insert(track_id, SampleDefaults::default());
            return Ok(());
        };
        log::info!(
            "track {track_id}: {} `{}`, timescale {}",
            media.codec,
            track.handler_type.unwrap_or(FourCC { value: *b"????" }),
            track.timescale,
        );

        track.finalize(self.movie_timescale).for_track(track_id)?;
        let track = self.tracks.entry(track_id).or_insert(track);
        if !self.stored_mdats.is_empty() {
            extract::extract_track(track, &self.stored_mdats, handler).for_track(track_id)?;
        }
        Ok(())
    }
}

impl Default for Mp4Reader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use bytes::BufMut;

    use crate::codec::Codec;
    use crate::frame::{FrameKind, MediaParams};
    use crate::parse::{MfhdBox, TfhdBox, TrunBox};
    use crate::util::test::{init_logger, TestFmp4Builder, TestMp4Builder, TestTrack};
    use crate::writer::boxes::BoxWriter;

    use super::*;

    #[derive(Debug, Default)]
    struct Collected {
        atoms: Vec<(FourCC, u64, bool)>,
        frames: Vec<Frame>,
    }

    fn read_all(reader: &mut Mp4Reader, data: &[u8], chunk_len: usize) -> (Collected, Result<(), ParseError>) {
        let mut collected = Collected::default();
        let mut result = Ok(());
        for chunk in data.chunks(chunk_len.max(1)) {
            result = reader.read(chunk, |event| {
                match event {
                    ReadEvent::Atom(atom) => collected.atoms.push((atom.box_type(), atom.position(), atom.is_complete())),
                    ReadEvent::Frame(frame) => collected.frames.push(frame),
                }
                true
            });
            if result.is_err() {
                break;
            }
        }
        (collected, result)
    }

    fn samples(frames: &[Frame]) -> Vec<&Frame> {
        frames.iter().filter(|frame| !frame.is_config()).collect()
    }

    #[test]
    fn classic_aac_track() {
        let test = TestMp4Builder::default().track(TestTrack::aac(1, vec![3, 4, 5])).build();
        let mut reader = Mp4Reader::new();
        let (collected, result) = read_all(&mut reader, &test.data, test.data.len());
        result.unwrap();
        reader.finish().unwrap();

        let frames = samples(&collected.frames);
        assert_eq!(frames.len(), 3);
        for (index, frame) in frames.iter().enumerate() {
            assert_eq!(frame.codec, Codec::Aac);
            assert_eq!(frame.kind, FrameKind::Key);
            assert_eq!(frame.track_id, 1);
            assert_eq!(frame.dts, index as u64 * 1024);
            assert_eq!(frame.pts, frame.dts);
            assert_eq!(frame.timebase, 44100);
            assert_eq!(frame.params, MediaParams::Audio { sample_rate: 44100, channels: 2 });
            assert_eq!(frame.codec_config.as_deref(), Some(&[0x12, 0x10][..]));
        }
        assert_eq!(frames[1].data, test.samples[0][1]);
        assert_eq!(collected.atoms.first().map(|atom| atom.0), Some(FourCC::FTYP));
        assert_eq!(reader.error_code(), 0);
    }

    #[test]
    fn byte_at_a_time_matches_single_push() {
        let test = TestMp4Builder::default()
            .track(TestTrack::h264(1, vec![40, 12, 12]))
            .track(TestTrack::aac(2, vec![6, 6, 6, 6]))
            .build();
        let (whole, result) = read_all(&mut Mp4Reader::new(), &test.data, test.data.len());
        result.unwrap();
        let (split, result) = read_all(&mut Mp4Reader::new(), &test.data, 1);
        result.unwrap();

        assert_eq!(whole.frames, split.frames);
        let complete_atoms = |collected: &Collected| -> Vec<(FourCC, u64)> {
            collected.atoms.iter().filter(|atom| atom.2).map(|atom| (atom.0, atom.1)).collect()
        };
        assert_eq!(complete_atoms(&whole), complete_atoms(&split));
        assert!(split.atoms.iter().any(|&(box_type, _, complete)| box_type == FourCC::MDAT && !complete));
    }

    #[test]
    fn interleaved_chunks_come_out_in_stream_order() {
        let test = TestMp4Builder::default()
            .track(TestTrack::h264(1, vec![40, 12, 12, 12]))
            .track(TestTrack::aac(2, vec![6, 6, 6, 6]))
            .samples_per_chunk(2u32)
            .build();
        let (collected, result) = read_all(&mut Mp4Reader::new(), &test.data, 7);
        result.unwrap();

        let order: Vec<u32> = samples(&collected.frames).iter().map(|frame| frame.track_id).collect();
        assert_eq!(order, [1, 1, 2, 2, 1, 1, 2, 2]);
    }

    #[test]
    fn h264_samples_become_annexb() {
        let test = TestMp4Builder::default().track(TestTrack::h264(1, vec![40, 12])).build();
        let (collected, result) = read_all(&mut Mp4Reader::new(), &test.data, test.data.len());
        result.unwrap();

        let config = &collected.frames[0];
        assert_eq!(config.kind, FrameKind::Config);
        assert_eq!(config.codec, Codec::H264);
        assert!(config.data.starts_with(&[0, 0, 0, 1, 0x67]));

        let frames = samples(&collected.frames);
        assert_eq!(frames[0].kind, FrameKind::Key);
        assert_eq!(frames[1].kind, FrameKind::Delta);
        assert_eq!(frames[0].params, MediaParams::Video { width: 320, height: 240 });
        assert!(frames[0].data.starts_with(&[0, 0, 0, 1]));
        assert_eq!(frames[0].data.len(), 40);
    }

    #[test]
    fn composition_offsets_and_edit_list() {
        let test = TestMp4Builder::default()
            .track(TestTrack::h264(1, vec![40, 12, 12]).with_ctts(vec![1024, 3072, 1024]).with_edit(1024))
            .build();
        let (collected, result) = read_all(&mut Mp4Reader::new(), &test.data, test.data.len());
        result.unwrap();

        let frames = samples(&collected.frames);
        let dts: Vec<u64> = frames.iter().map(|frame| frame.dts).collect();
        let pts: Vec<u64> = frames.iter().map(|frame| frame.pts).collect();
        assert_eq!(dts, [0, 1024, 2048]);
        assert_eq!(pts, [0, 3072, 2048]);
    }

    #[test]
    fn media_data_before_movie_header() {
        let test = TestMp4Builder::default()
            .track(TestTrack::aac(1, vec![3, 4, 5]))
            .track(TestTrack::aac(2, vec![7, 7]))
            .mdat_first(true)
            .build();
        let (collected, result) = read_all(&mut Mp4Reader::new(), &test.data, 5);
        result.unwrap();

        let frames = samples(&collected.frames);
        let sizes: Vec<(u32, usize)> = frames.iter().map(|frame| (frame.track_id, frame.data.len())).collect();
        assert_eq!(sizes, [(1, 3), (1, 4), (1, 5), (2, 7), (2, 7)]);
        let moov_atom = collected.atoms.iter().position(|atom| atom.0 == FourCC::MOOV).unwrap();
        let mdat_atom = collected.atoms.iter().position(|atom| atom.0 == FourCC::MDAT && atom.2).unwrap();
        assert!(mdat_atom < moov_atom);
    }

    #[test]
    fn sixty_four_bit_chunk_offsets() {
        let test = TestMp4Builder::default().track(TestTrack::aac(1, vec![3, 4])).co64(true).build();
        let (collected, result) = read_all(&mut Mp4Reader::new(), &test.data, 16);
        result.unwrap();
        assert_eq!(samples(&collected.frames).len(), 2);
    }

    #[test]
    fn fragmented_with_trex_defaults() {
        let test = TestFmp4Builder::default().default_sample_size(100u32).fragment_sample_counts(vec![3]).build();
        let mut reader = Mp4Reader::new();
        let (collected, result) = read_all(&mut reader, &test.data, 11);
        result.unwrap();
        reader.finish().unwrap();
        assert!(reader.is_fragmented());

        let frames = samples(&collected.frames);
        assert_eq!(frames.len(), 3);
        for (index, frame) in frames.iter().enumerate() {
            assert_eq!(frame.data.len(), 100);
            assert_eq!(frame.sample_flags, test.default_sample_flags);
            assert_eq!(frame.duration, test.default_sample_duration);
            assert_eq!(frame.dts, index as u64 * u64::from(test.default_sample_duration));
        }
        assert_eq!(frames[2].data, test.fragments[0][2]);
    }

    #[test]
    fn fragments_without_tfdt_continue_decode_time() {
        let test = TestFmp4Builder::default().fragment_sample_counts(vec![2, 2]).tfdt(false).build();
        let (collected, result) = read_all(&mut Mp4Reader::new(), &test.data, test.data.len());
        result.unwrap();

        let dts: Vec<u64> = samples(&collected.frames).iter().map(|frame| frame.dts).collect();
        let step = u64::from(test.default_sample_duration);
        assert_eq!(dts, [0, step, 2 * step, 3 * step]);
    }

    #[test]
    fn fragment_for_unknown_track() {
        let test = TestFmp4Builder::default().traf_track_id(9u32).build();
        let mut reader = Mp4Reader::new();
        let (_, result) = read_all(&mut reader, &test.data, test.data.len());
        assert_matches!(result.unwrap_err().into_inner(), ParseError::UnknownTrack(9));
        assert_eq!(reader.error_code(), ParseError::UnknownTrack(9).code());
    }

    #[test]
    fn unsupported_box_halts_for_good() {
        init_logger();
        let mut reader = Mp4Reader::new();
        let err = reader.read(&[0, 0, 0, 8, b'z', b'z', b'z', b'z'], |_| true).unwrap_err();
        assert_matches!(err.into_inner(), ParseError::UnsupportedBox(_));

        let err = reader.read(&[], |_| true).unwrap_err();
        assert_matches!(err.into_inner(), ParseError::UnsupportedBox(_));
        assert_eq!(reader.error_code(), 2);
    }

    #[test]
    fn oversized_leaf_box() {
        init_logger();
        let config = ReaderConfig::builder().max_box_size(64).build();
        let mut reader = Mp4Reader::with_config(config);
        let mut data = vec![0, 0, 0x01, 0x00];
        data.extend_from_slice(b"free");
        let err = reader.read(&data, |_| true).unwrap_err();
        assert_matches!(err.into_inner(), ParseError::BoxTooLarge);
    }

    #[test]
    fn handler_abort() {
        let test = TestMp4Builder::default().track(TestTrack::aac(1, vec![3])).build();
        let mut reader = Mp4Reader::new();
        let err = reader.read(&test.data, |_| false).unwrap_err();
        assert_matches!(err.into_inner(), ParseError::HandlerAborted);
        assert_eq!(reader.error_code(), ParseError::HandlerAborted.code());
    }

    #[test]
    fn truncated_stream() {
        let test = TestMp4Builder::default().track(TestTrack::aac(1, vec![3])).build();
        let mut reader = Mp4Reader::new();
        reader.read(&test.data[..test.data.len() - 1], |_| true).unwrap();
        assert_matches!(reader.finish().unwrap_err().into_inner(), ParseError::TruncatedBox);
    }

    #[test]
    fn track_without_track_id() {
        let mut reader = Mp4Reader::new();
        let err = reader.read(&[0, 0, 0, 8, b't', b'r', b'a', b'k'], |_| true).unwrap_err();
        assert_matches!(err.into_inner(), ParseError::MissingTrackId);
    }

    #[test]
    fn chunk_offset_outside_media_data() {
        let test = TestMp4Builder::default().track(TestTrack::aac(1, vec![3, 4])).chunk_offset_shift(-4i64).build();
        let (_, result) = read_all(&mut Mp4Reader::new(), &test.data, test.data.len());
        assert_matches!(result.unwrap_err().into_inner(), ParseError::SampleOutsideMdat);
    }

    #[test]
    fn unsupported_codec_can_be_skipped() {
        let test = TestMp4Builder::default()
            .track(TestTrack::aac(1, vec![3, 4]).with_format(FourCC { value: *b"ac-3" }))
            .track(TestTrack::aac(2, vec![5]))
            .build();

        let (_, result) = read_all(&mut Mp4Reader::new(), &test.data, test.data.len());
        assert_matches!(result.unwrap_err().into_inner(), ParseError::UnsupportedCodec(_));

        let config = ReaderConfig::builder().skip_unsupported_tracks(true).build();
        let (collected, result) = read_all(&mut Mp4Reader::with_config(config), &test.data, test.data.len());
        result.unwrap();
        let tracks: Vec<u32> = samples(&collected.frames).iter().map(|frame| frame.track_id).collect();
        assert_eq!(tracks, [2]);
    }

    #[test]
    fn partial_media_data_reports_each_byte_once() {
        let test = TestMp4Builder::default().track(TestTrack::aac(1, vec![1000; 64])).build();
        let mut reader = Mp4Reader::new();
        let mut partial = Vec::new();
        let mut partial_reports = 0;
        let mut complete_payload = None;
        let mut frame_count = 0;
        for chunk in test.data.chunks(100) {
            reader
                .read(chunk, |event| {
                    match event {
                        ReadEvent::Atom(atom) if atom.box_type() == FourCC::MDAT && !atom.is_complete() => {
                            assert_eq!(atom.payload_offset(), partial.len() as u64);
                            partial.extend_from_slice(atom.payload());
                            partial_reports += 1;
                        }
                        ReadEvent::Atom(atom) if atom.box_type() == FourCC::MDAT => {
                            assert_eq!(atom.payload_offset(), 0);
                            complete_payload = Some(atom.payload().clone());
                        }
                        ReadEvent::Frame(frame) if !frame.is_config() => frame_count += 1,
                        _ => {}
                    }
                    true
                })
                .unwrap();
        }
        reader.finish().unwrap();

        let complete_payload = complete_payload.unwrap();
        assert_eq!(complete_payload.len(), 64_000);
        assert!(partial_reports > 600);
        assert!(partial.len() <= complete_payload.len());
        assert_eq!(&partial[..], &complete_payload[..partial.len()]);
        assert_eq!(frame_count, 64);
    }

    #[test]
    fn fragment_run_past_end_of_stream() {
        let init = TestFmp4Builder::default().fragment_sample_counts(vec![]).build();
        let mut moof = BoxWriter::new();
        moof.start(FourCC::MOOF);
        moof.put_box(FourCC::MFHD, |out| MfhdBox { sequence_number: 1 }.put_buf(out));
        moof.start(FourCC::TRAF);
        let tfhd = TfhdBox { track_id: 1, base_data_offset: Some(u64::MAX - 4), ..Default::default() };
        moof.put_box(FourCC::TFHD, |out| tfhd.put_buf(out));
        moof.start_full(FourCC::TRUN, 0, 0);
        moof.put_u32(2);
        moof.end(); // trun
        moof.end(); // traf
        moof.end(); // moof
        let data = [&init.data[..], &moof.finish()[..]].concat();

        let mut reader = Mp4Reader::new();
        let (collected, result) = read_all(&mut reader, &data, data.len());
        assert_matches!(result.unwrap_err().into_inner(), ParseError::InvalidInput);
        assert!(samples(&collected.frames).is_empty());
        assert_eq!(reader.error_code(), ParseError::InvalidInput.code());
    }

    #[test]
    fn child_overruns_container() {
        let mut data = vec![0, 0, 0, 16];
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&[0, 0, 0, 108]);
        data.extend_from_slice(b"mvhd");
        let err = Mp4Reader::new().read(&data, |_| true).unwrap_err();
        assert_matches!(err.into_inner(), ParseError::InvalidBoxLayout);
    }

    #[test]
    fn unfinished_container_is_truncated() {
        let mut reader = Mp4Reader::new();
        reader.read(&[0, 0, 0, 16, b'm', b'o', b'o', b'v'], |_| true).unwrap();
        assert_matches!(reader.finish().unwrap_err().into_inner(), ParseError::TruncatedBox);
    }

    #[test]
    fn track_fragment_after_its_moof_ended() {
        let test = TestFmp4Builder::default().build();
        let mut traf = BoxWriter::new();
        traf.start(FourCC::TRAF);
        let tfhd = TfhdBox { flags: TfhdBox::DEFAULT_BASE_IS_MOOF, track_id: 1, ..Default::default() };
        traf.put_box(FourCC::TFHD, |out| tfhd.put_buf(out));
        traf.start_full(FourCC::TRUN, 0, TrunBox::DATA_OFFSET_PRESENT);
        traf.put_u32(0);
        traf.put_i32(0);
        traf.end(); // trun
        traf.end(); // traf
        let data = [&test.data[..], &traf.finish()[..]].concat();

        let (collected, result) = read_all(&mut Mp4Reader::new(), &data, data.len());
        assert_matches!(result.unwrap_err().into_inner(), ParseError::InvalidBoxLayout);
        assert_eq!(samples(&collected.frames).len(), 2);
    }
}
