use bytes::Bytes;

use crate::codec::aac::AudioSpecificConfig;
use crate::codec::h26x;
use crate::codec::vorbis::VorbisHeaders;
use crate::codec::Codec;
use crate::error::Result;
use crate::frame::{sample_flags, Frame, FrameKind, MediaParams};
use crate::parse::error::{WhereEq, WhileParsingBox};
use crate::parse::{
    ChunkOffsetBox, ChunkOffsetCursor, CttsBox, CttsCursor, DecodedBox, ElstBox, ElstCursor, FourCC, ParseError,
    SampleConfig, SampleDefaults, StscBox, StscCursor, StsdBox, StssBox, StssCursor, StszBox, StszCursor, SttsBox,
    SttsCursor, TrunSample,
};

/// Reader state for one track, from its `trak` box on.
#[derive(Debug, Default)]
pub(super) struct Track {
    pub(super) track_id: Option<u32>,
    pub(super) handler_type: Option<FourCC>,
    pub(super) timescale: u32,
    pub(super) duration: u64,
    pub(super) media: Option<TrackMedia>,
    /// The sample entry format of a track being skipped because its codec is unsupported.
    pub(super) unsupported_format: Option<FourCC>,
    tables: SampleTables,
    edit_list: Option<ElstBox>,
    edits: Option<ElstCursor>,
    samples: Option<ClassicSamples>,
    /// Movie-level fragment defaults from `trex`.
    pub(super) trex: SampleDefaults,
    /// Decode time at the end of the last track fragment, used when a fragment has no `tfdt`.
    pub(super) decode_time: u64,
}

/// What the sample description told us about the track's codec.
#[derive(Clone, Debug)]
pub(super) struct TrackMedia {
    pub(super) codec: Codec,
    pub(super) params: MediaParams,
    /// Width of the NAL length fields, for H.264 and H.265.
    pub(super) length_size: u8,
    pub(super) codec_config: Option<Bytes>,
}

#[derive(Debug, Default)]
struct SampleTables {
    stts: Option<SttsBox>,
    stsc: Option<StscBox>,
    stsz: Option<StszBox>,
    chunk_offsets: Option<ChunkOffsetBox>,
    ctts: Option<CttsBox>,
    stss: Option<StssBox>,
}

/// The classic sample table cursors of a track, stepped together one sample at a time.
#[derive(Debug)]
struct ClassicSamples {
    stts: SttsCursor,
    stsc: StscCursor,
    stsz: StszCursor,
    chunk_offsets: ChunkOffsetCursor,
    ctts: Option<CttsCursor>,
    stss: Option<StssCursor>,
    sample_number: u32,
}

/// Timing and flags of one sample, in the track's timescale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct SampleTiming {
    pub(super) dts: u64,
    pub(super) pts: u64,
    pub(super) duration: u32,
    pub(super) size: u32,
    pub(super) flags: u32,
}

impl Track {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Record a box found inside this track's `trak`, returning the configuration frame a sample description yields.
    pub(super) fn apply(&mut self, decoded: DecodedBox, skip_unsupported: bool) -> Result<Option<Frame>, ParseError> {
        match decoded {
            DecodedBox::Tkhd(tkhd) => self.track_id = Some(tkhd.track_id),
            DecodedBox::Mdhd(mdhd) => {
                self.timescale = mdhd.timescale;
                self.duration = mdhd.duration;
            }
            DecodedBox::Hdlr(hdlr) => self.handler_type = Some(hdlr.handler_type),
            DecodedBox::Stsd(stsd) => return self.apply_stsd(stsd, skip_unsupported),
            DecodedBox::Stts(stts) => self.tables.stts = Some(stts),
            DecodedBox::Stsc(stsc) => self.tables.stsc = Some(stsc),
            DecodedBox::Stsz(stsz) => self.tables.stsz = Some(stsz),
            DecodedBox::ChunkOffsets(chunk_offsets) => self.tables.chunk_offsets = Some(chunk_offsets),
            DecodedBox::Ctts(ctts) => self.tables.ctts = Some(ctts),
            DecodedBox::Stss(stss) => self.tables.stss = Some(stss),
            DecodedBox::Elst(elst) => self.edit_list = Some(elst),
            _ => {}
        }
        Ok(None)
    }

    fn apply_stsd(&mut self, stsd: StsdBox, skip_unsupported: bool) -> Result<Option<Frame>, ParseError> {
        let entry = stsd.entry;
        let codec = match entry.codec() {
            Ok(codec) => codec,
            Err(err) if skip_unsupported && matches!(err.get_ref(), ParseError::UnsupportedCodec(_)) => {
                log::warn!("skipping track with unsupported sample entry `{}`: {err}", entry.format);
                self.unsupported_format = Some(entry.format);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let Some(mut params) = entry.params else {
            bail_attach!(ParseError::InvalidSampleDescription, WhileParsingBox(entry.format));
        };

        let mut length_size = 0;
        let mut config_data = None;
        let mut codec_config = None;
        match (&entry.config, codec) {
            (SampleConfig::Avc(avc), _) => {
                length_size = avc.length_size;
                config_data = Some(avc.to_annexb());
            }
            (SampleConfig::Hevc(hevc), _) => {
                length_size = hevc.length_size;
                config_data = Some(hevc.to_annexb());
            }
            (SampleConfig::Es(es), Codec::Aac) => {
                if let Some(info) = &es.decoder_specific_info {
                    let config = AudioSpecificConfig::parse(info)?;
                    let channels = match (config.channels(), params) {
                        (0, MediaParams::Audio { channels, .. }) => channels,
                        (channels, _) => channels,
                    };
                    params = MediaParams::Audio { sample_rate: config.sample_rate, channels };
                }
                codec_config = es.decoder_specific_info.clone();
            }
            (SampleConfig::Es(es), Codec::Vorbis) => {
                let Some(private_data) = &es.decoder_specific_info else {
                    bail_attach!(ParseError::InvalidCodecConfig, "missing vorbis headers", WhileParsingBox(FourCC::ESDS));
                };
                VorbisHeaders::parse(private_data)?;
                config_data = Some(private_data.clone());
                codec_config = Some(private_data.clone());
            }
            _ => {}
        }

        let config_frame = config_data.map(|data| Frame {
            track_id: self.track_id.unwrap_or_default(),
            codec,
            kind: FrameKind::Config,
            pts: 0,
            dts: 0,
            duration: 0,
            timebase: self.timescale,
            sample_flags: sample_flags::SYNC,
            params,
            data,
            codec_config: codec_config.clone(),
        });
        self.media = Some(TrackMedia { codec, params, length_size, codec_config });
        Ok(config_frame)
    }

    /// Called once the whole `trak` has been read: builds the sample cursors and the edit list cursor.
    pub(super) fn finalize(&mut self, movie_timescale: u32) -> Result<(), ParseError> {
        ensure_attach!(self.timescale != 0, ParseError::InvalidInput, WhereEq("timescale", 0), WhileParsingBox(FourCC::MDHD));
        self.edits = self.edit_list.take().map(|elst| elst.cursor(movie_timescale, self.timescale));

        let SampleTables { stts, stsc, stsz, chunk_offsets, ctts, stss } = std::mem::take(&mut self.tables);
        let (Some(stts), Some(stsc), Some(stsz), Some(chunk_offsets)) = (stts, stsc, stsz, chunk_offsets) else {
            log::debug!("track has no complete set of sample tables");
            return Ok(());
        };
        if stts.sample_count() != u64::from(stsz.sample_count) {
            log::warn!("`stts` describes {} samples, `stsz` {}", stts.sample_count(), stsz.sample_count);
        }
        if self.duration != 0 && stts.total_duration() != self.duration {
            log::debug!("`stts` durations sum to {}, `mdhd` says {}", stts.total_duration(), self.duration);
        }
        self.samples = Some(ClassicSamples {
            stts: stts.cursor(),
            stsc: stsc.cursor(),
            stsz: stsz.cursor(),
            chunk_offsets: chunk_offsets.cursor(),
            ctts: ctts.map(|ctts| ctts.cursor()),
            stss: stss.map(|stss| stss.cursor()),
            sample_number: 1,
        });
        Ok(())
    }

    /// The offset and length of the next classic chunk, or `None` once every chunk has been read.
    pub(super) fn next_chunk(&self) -> Result<Option<(u64, u64)>, ParseError> {
        let Some(samples) = &self.samples else {
            return Ok(None);
        };
        let Some(offset) = samples.chunk_offsets.current_offset() else {
            ensure_attach!(
                samples.stts.is_exhausted() && samples.stsz.is_exhausted(),
                ParseError::SampleTableMismatch,
                "samples left after the last chunk",
            );
            return Ok(None);
        };
        let sample_count = samples.stsc.samples_per_chunk();
        ensure_attach!(sample_count != 0, ParseError::SampleTableMismatch, WhereEq("chunk", samples.stsc.chunk()));
        let mut sizes = samples.stsz.clone();
        let mut len = 0;
        for _ in 0..sample_count {
            let Some(size) = sizes.current_size() else {
                bail_attach!(ParseError::SampleTableMismatch, "`stsz` ended inside a chunk", WhereEq("chunk", samples.stsc.chunk()));
            };
            len += u64::from(size);
            sizes.move_next();
        }
        Ok(Some((offset, len)))
    }

    pub(super) fn samples_in_chunk(&self) -> u32 {
        self.samples.as_ref().map_or(0, |samples| samples.stsc.samples_per_chunk())
    }

    /// Step every classic cursor past the next sample, returning its timing.
    pub(super) fn next_classic_sample(&mut self) -> Result<SampleTiming, ParseError> {
        let Some(samples) = &mut self.samples else {
            bail_attach!(ParseError::SampleTableMismatch, "track has no sample tables");
        };
        let (Some(size), false) = (samples.stsz.current_size(), samples.stts.is_exhausted()) else {
            bail_attach!(ParseError::SampleTableMismatch, WhereEq("sample", samples.sample_number));
        };
        let dts = samples.stts.current_pts();
        let duration = samples.stts.current_delta();
        let composition_offset = samples.ctts.as_ref().map_or(0, CttsCursor::current_offset);
        let sync = samples.stss.as_mut().map_or(true, |stss| stss.is_sync(samples.sample_number));

        samples.stts.move_next();
        samples.stsz.move_next();
        if let Some(ctts) = &mut samples.ctts {
            ctts.move_next();
        }
        samples.sample_number += 1;

        let pts = self.present(dts.saturating_add_signed(composition_offset));
        let flags = if sync { sample_flags::SYNC } else { sample_flags::NON_SYNC };
        Ok(SampleTiming { dts, pts, duration, size, flags })
    }

    pub(super) fn finish_chunk(&mut self) {
        if let Some(samples) = &mut self.samples {
            samples.chunk_offsets.move_next();
            samples.stsc.move_next();
        }
    }

    pub(super) fn fragment_timing(&mut self, sample: &TrunSample) -> SampleTiming {
        let pts = self.present(sample.decode_time.saturating_add_signed(sample.composition_offset));
        SampleTiming {
            dts: sample.decode_time,
            pts,
            duration: sample.duration,
            size: sample.size,
            flags: sample.flags,
        }
    }

    /// Map a media presentation time through the edit list.
    fn present(&mut self, pts: u64) -> u64 {
        match &mut self.edits {
            Some(edits) => {
                let adjusted = edits.adjust(pts);
                edits.move_next(adjusted);
                adjusted
            }
            None => pts,
        }
    }

    /// Build the frame for one sample; H.26x samples are rewritten to Annex-B.
    pub(super) fn build_frame(&self, timing: SampleTiming, data: Bytes) -> Result<Frame, ParseError> {
        let Some(media) = &self.media else {
            bail_attach!(ParseError::InvalidSampleDescription, "track has no sample description");
        };
        let data = match media.codec.is_h26x() {
            true => h26x::length_prefixed_to_annexb(&data, media.length_size)?,
            false => data,
        };
        let kind = match media.codec.is_audio() || sample_flags::is_sync(timing.flags) {
            true => FrameKind::Key,
            false => FrameKind::Delta,
        };
        Ok(Frame {
            track_id: self.track_id.unwrap_or_default(),
            codec: media.codec,
            kind,
            pts: timing.pts,
            dts: timing.dts,
            duration: timing.duration,
            timebase: self.timescale,
            sample_flags: timing.flags,
            params: media.params,
            data,
            codec_config: media.codec_config.clone(),
        })
    }
}
