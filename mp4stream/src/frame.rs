//! Frames produced by the reader and consumed by the writer.

use bytes::Bytes;

use crate::codec::Codec;

/// One sample of a track, or a codec configuration frame.
///
/// H.264 and H.265 payloads are Annex-B byte streams. AAC payloads are raw access units without ADTS headers, with
/// the track's `AudioSpecificConfig` in [`codec_config`](Self::codec_config). Each frame owns its payload: samples that
/// need no rewriting share the reader's buffer, rewritten samples get a buffer of their own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Id of the track the frame belongs to. The writer ignores it and matches frames to tracks by codec.
    pub track_id: u32,
    /// Codec of the track.
    pub codec: Codec,
    /// Whether this is a configuration, key or delta frame.
    pub kind: FrameKind,
    /// Presentation timestamp, in units of `1 / timebase` seconds.
    pub pts: u64,
    /// Decode timestamp, in units of `1 / timebase` seconds.
    pub dts: u64,
    /// Duration in units of `1 / timebase` seconds, or `0` when unknown.
    pub duration: u32,
    /// Ticks per second of every timestamp of the frame.
    pub timebase: u32,
    /// ISO-BMFF sample flags; see [`sample_flags`].
    pub sample_flags: u32,
    /// Video dimensions or audio format of the track.
    pub params: MediaParams,
    /// The sample payload, in the form described above.
    pub data: Bytes,
    /// Out-of-band codec configuration, such as an AAC `AudioSpecificConfig`.
    pub codec_config: Option<Bytes>,
}

/// What a [`Frame`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Codec configuration: H.26x parameter sets in Annex-B form, or Vorbis codec private data.
    Config,
    /// A sync sample.
    Key,
    /// A sample that depends on earlier samples.
    Delta,
}

/// Stream parameters from the sample description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MediaParams {
    Video { width: u32, height: u32 },
    Audio { sample_rate: u32, channels: u16 },
}

/// The bits of the ISO-BMFF `sample_flags` word that `mp4stream` reads and writes.
#[allow(missing_docs)]
pub mod sample_flags {
    pub const DEPENDS_ON_OTHERS: u32 = 0x0100_0000;
    pub const DEPENDS_ON_NONE: u32 = 0x0200_0000;
    pub const IS_NON_SYNC: u32 = 0x0001_0000;

    pub const SYNC: u32 = DEPENDS_ON_NONE;
    pub const NON_SYNC: u32 = DEPENDS_ON_OTHERS | IS_NON_SYNC;

    pub const fn is_sync(flags: u32) -> bool {
        flags & IS_NON_SYNC == 0
    }
}

impl Frame {
    /// A frame with `dts == pts`, no duration and sample flags matching `kind`.
    pub fn new(codec: Codec, kind: FrameKind, pts: u64, timebase: u32, params: MediaParams, data: Bytes) -> Self {
        let sample_flags = match kind {
            FrameKind::Delta => sample_flags::NON_SYNC,
            FrameKind::Key | FrameKind::Config => sample_flags::SYNC,
        };
        Self {
            track_id: 0,
            codec,
            kind,
            pts,
            dts: pts,
            duration: 0,
            timebase,
            sample_flags,
            params,
            data,
            codec_config: None,
        }
    }

    /// Set the decode timestamp, for streams with B-frames.
    pub fn with_dts(mut self, dts: u64) -> Self {
        self.dts = dts;
        self
    }

    /// Set the duration, in units of `1 / timebase` seconds.
    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    /// Attach out-of-band codec configuration.
    pub fn with_codec_config(mut self, codec_config: Bytes) -> Self {
        self.codec_config = Some(codec_config);
        self
    }

    /// Whether this is a sync sample.
    pub fn is_key(&self) -> bool {
        self.kind == FrameKind::Key
    }

    /// Whether this frame carries codec configuration rather than a sample.
    pub fn is_config(&self) -> bool {
        self.kind == FrameKind::Config
    }
}
