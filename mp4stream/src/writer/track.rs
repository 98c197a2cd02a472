use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::codec::aac::AudioSpecificConfig;
use crate::codec::vorbis::VorbisHeaders;
use crate::codec::{h26x, Codec};
use crate::error::Result;
use crate::frame::{Frame, FrameKind, MediaParams};
use crate::parse::error::WhereEq;
use crate::parse::esds::{STREAM_TYPE_AUDIO, STREAM_TYPE_VISUAL};
use crate::parse::{AvcConfig, EsDescriptor, HevcConfig, SampleConfig, SampleEntry};
use crate::util::rescale;

use super::WriteError;

/// Frames of one output track waiting to be written, already in container form.
#[derive(Debug)]
pub(super) struct TrackQueue {
    pub(super) track_id: u32,
    pub(super) codec: Codec,
    /// Taken from the first frame; later frames are rescaled to it.
    pub(super) timescale: u32,
    pub(super) params: Option<MediaParams>,
    pub(super) samples: VecDeque<QueuedSample>,
    enable_dts: bool,
    vps: Vec<Bytes>,
    sps: Vec<Bytes>,
    pps: Vec<Bytes>,
    /// AAC AudioSpecificConfig, or the Vorbis codec private blob.
    codec_config: Option<Bytes>,
    seen_sync: bool,
    last_time: Option<u64>,
    /// Duration given to the last sample flushed when its frame carried none.
    pub(super) last_duration: u32,
}

#[derive(Clone, Debug)]
pub(super) struct QueuedSample {
    /// Decode time: the frame's DTS in `enable_dts` mode, its PTS otherwise.
    pub(super) time: u64,
    pub(super) composition_offset: i32,
    /// The frame's own duration, used only for the last sample of the stream.
    pub(super) duration: u32,
    pub(super) is_sync: bool,
    pub(super) data: Bytes,
}

impl TrackQueue {
    pub(super) fn new(track_id: u32, codec: Codec, enable_dts: bool) -> Self {
        Self {
            track_id,
            codec,
            timescale: 0,
            params: None,
            samples: VecDeque::new(),
            enable_dts,
            vps: Vec::new(),
            sps: Vec::new(),
            pps: Vec::new(),
            codec_config: None,
            seen_sync: false,
            last_time: None,
            last_duration: 0,
        }
    }

    pub(super) fn push(&mut self, frame: Frame) -> Result<(), WriteError> {
        ensure_attach!(frame.timebase != 0, WriteError::InvalidFrame, WhereEq("timebase", 0));
        if self.timescale == 0 {
            self.timescale = frame.timebase;
        }
        if frame.kind == FrameKind::Config {
            return self.push_config(&frame);
        }
        if self.params.is_none() {
            self.params = Some(frame.params);
        }
        if self.codec_config.is_none() && self.codec == Codec::Aac {
            self.codec_config = frame.codec_config.clone();
        }

        let (data, is_sync) = match self.codec.is_h26x() {
            true => self.h26x_sample(&frame),
            false => (frame.data.clone(), self.codec.is_audio() || frame.kind == FrameKind::Key),
        };
        if !self.seen_sync {
            if !is_sync {
                log::warn!("track {}: dropping {} frame before the first key frame", self.track_id, self.codec);
                return Ok(());
            }
            self.seen_sync = true;
        }

        let pts = rescale(frame.pts, frame.timebase, self.timescale);
        let dts = rescale(frame.dts, frame.timebase, self.timescale);
        let time = if self.enable_dts { dts } else { pts };
        if let Some(last_time) = self.last_time {
            ensure_attach!(time >= last_time, WriteError::NonMonotonicTimestamp(self.track_id), WhereEq("time", time));
        }
        let composition_offset = match self.enable_dts {
            true => {
                let offset = pts as i128 - dts as i128;
                let Ok(offset) = i32::try_from(offset) else {
                    bail_attach!(WriteError::InvalidFrame, WhereEq("composition_offset", offset));
                };
                offset
            }
            false => 0,
        };
        self.last_time = Some(time);
        let duration = rescale(frame.duration.into(), frame.timebase, self.timescale);
        self.samples.push_back(QueuedSample {
            time,
            composition_offset,
            duration: u32::try_from(duration).unwrap_or(u32::MAX),
            is_sync,
            data,
        });
        Ok(())
    }

    fn push_config(&mut self, frame: &Frame) -> Result<(), WriteError> {
        match self.codec {
            Codec::H264 | Codec::H265 => {
                let nal_units = h26x::split_annexb(&frame.data);
                self.store_parameter_sets(&nal_units);
            }
            Codec::Vorbis => {
                if let Err(err) = VorbisHeaders::parse(&frame.data) {
                    bail_attach!(WriteError::InvalidFrame, format!("invalid vorbis headers: {err}"));
                }
                self.codec_config = Some(frame.data.clone());
            }
            Codec::Aac => self.codec_config = Some(frame.data.clone()),
            Codec::Jpeg | Codec::Mp3 => log::debug!("track {}: ignoring {} config frame", self.track_id, self.codec),
        }
        Ok(())
    }

    /// Replace the stored parameter sets of every type present in `nal_units`.
    fn store_parameter_sets(&mut self, nal_units: &[Bytes]) {
        let mut vps = Vec::new();
        let mut sps = Vec::new();
        let mut pps = Vec::new();
        for nal in nal_units {
            match h26x::nal_type(self.codec, nal) {
                Some(h26x::H265_VPS) if self.codec == Codec::H265 => vps.push(nal.clone()),
                Some(h26x::H264_SPS) if self.codec == Codec::H264 => sps.push(nal.clone()),
                Some(h26x::H265_SPS) if self.codec == Codec::H265 => sps.push(nal.clone()),
                Some(h26x::H264_PPS) if self.codec == Codec::H264 => pps.push(nal.clone()),
                Some(h26x::H265_PPS) if self.codec == Codec::H265 => pps.push(nal.clone()),
                _ => {}
            }
        }
        for (stored, found) in [(&mut self.vps, vps), (&mut self.sps, sps), (&mut self.pps, pps)] {
            if !found.is_empty() {
                *stored = found;
            }
        }
    }

    /// Convert an Annex-B access unit to 4-byte length-prefixed NAL units.
    ///
    /// In-band parameter sets are taken out and remembered; the current ones are written in front of every random
    /// access sample instead. Access unit delimiters are dropped.
    fn h26x_sample(&mut self, frame: &Frame) -> (Bytes, bool) {
        let nal_units = h26x::split_annexb(&frame.data);
        self.store_parameter_sets(&nal_units);

        let mut is_sync = frame.kind == FrameKind::Key;
        let mut body = BytesMut::with_capacity(frame.data.len());
        for nal in &nal_units {
            let Some(nal_type) = h26x::nal_type(self.codec, nal) else {
                continue;
            };
            let is_delimiter = match self.codec {
                Codec::H264 => nal_type == h26x::H264_AUD,
                _ => nal_type == h26x::H265_AUD,
            };
            if is_delimiter || h26x::is_parameter_set(self.codec, nal_type) {
                continue;
            }
            is_sync |= h26x::is_random_access(self.codec, nal_type);
            h26x::put_length_prefixed(&mut body, nal);
        }
        if !is_sync {
            return (body.freeze(), false);
        }

        let mut data = BytesMut::with_capacity(body.len() + 64);
        for nal in self.vps.iter().chain(&self.sps).chain(&self.pps) {
            h26x::put_length_prefixed(&mut data, nal);
        }
        data.extend_from_slice(&body);
        (data.freeze(), true)
    }

    /// Whether the track has a queued sample and everything its sample entry needs.
    pub(super) fn is_ready(&self) -> bool {
        let has_config = match self.codec {
            Codec::H264 => !self.sps.is_empty() && !self.pps.is_empty(),
            Codec::H265 => !self.vps.is_empty() && !self.sps.is_empty() && !self.pps.is_empty(),
            Codec::Vorbis => self.codec_config.is_some(),
            Codec::Aac | Codec::Mp3 | Codec::Jpeg => true,
        };
        has_config && !self.samples.is_empty()
    }

    pub(super) fn last_time(&self) -> Option<u64> {
        self.samples.back().map(|sample| sample.time)
    }

    pub(super) fn sample_entry(&self) -> Result<SampleEntry, WriteError> {
        let Some(params) = self.params else {
            bail_attach!(WriteError::MissingCodecConfig(self.track_id), "no frame parameters");
        };
        let esds = |stream_type: u8, decoder_specific_info: Option<Bytes>| {
            SampleConfig::Es(EsDescriptor {
                es_id: 0,
                object_type: self.codec.object_type().unwrap_or_default(),
                stream_type,
                decoder_specific_info,
                ..Default::default()
            })
        };
        let config = match self.codec {
            Codec::H264 => match AvcConfig::from_parameter_sets(self.sps.clone(), self.pps.clone()) {
                Some(avc) => SampleConfig::Avc(avc),
                None => bail_attach!(WriteError::MissingCodecConfig(self.track_id), "no usable SPS"),
            },
            Codec::H265 => {
                SampleConfig::Hevc(HevcConfig::from_parameter_sets(self.vps.clone(), self.sps.clone(), self.pps.clone()))
            }
            Codec::Jpeg => esds(STREAM_TYPE_VISUAL, None),
            Codec::Mp3 => esds(STREAM_TYPE_AUDIO, None),
            Codec::Aac => {
                let config = match (&self.codec_config, params) {
                    (Some(config), _) => config.clone(),
                    (None, MediaParams::Audio { sample_rate, channels }) => {
                        AudioSpecificConfig::lc(sample_rate, channels).to_bytes()
                    }
                    (None, MediaParams::Video { .. }) => {
                        bail_attach!(WriteError::MissingCodecConfig(self.track_id), "no AudioSpecificConfig")
                    }
                };
                esds(STREAM_TYPE_AUDIO, Some(config))
            }
            Codec::Vorbis => match &self.codec_config {
                Some(private_data) => esds(STREAM_TYPE_AUDIO, Some(private_data.clone())),
                None => bail_attach!(WriteError::MissingCodecConfig(self.track_id), "no vorbis headers"),
            },
        };
        Ok(SampleEntry { format: self.codec.sample_entry_format(), data_reference_index: 1, params: Some(params), config })
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    const SPS: &[u8] = &[0x67, 0x42, 0xc0, 0x1e, 0xda, 0x02];
    const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];

    fn video(kind: FrameKind, pts: u64, data: impl Into<Bytes>) -> Frame {
        let params = MediaParams::Video { width: 320, height: 240 };
        Frame::new(Codec::H264, kind, pts, 90000, params, data.into())
    }

    #[test]
    fn inband_parameter_sets_are_moved_in_front_of_idr() {
        let mut queue = TrackQueue::new(1, Codec::H264, false);
        let access_unit = [&[0, 0, 0, 1, 0x09, 0xf0][..], &[0, 0, 0, 1], SPS, &[0, 0, 1], PPS, &[0, 0, 1, 0x65, 0x88]]
            .concat();
        queue.push(video(FrameKind::Key, 0, access_unit)).unwrap();
        assert!(queue.is_ready());

        let sample = &queue.samples[0];
        assert!(sample.is_sync);
        let mut expected = BytesMut::new();
        for nal in [SPS, PPS, &[0x65, 0x88][..]] {
            h26x::put_length_prefixed(&mut expected, nal);
        }
        assert_eq!(sample.data, expected);
    }

    #[test]
    fn composition_offset_out_of_range() {
        let mut queue = TrackQueue::new(1, Codec::H264, true);
        let key = video(FrameKind::Key, 1 << 40, &[0, 0, 0, 1, 0x65, 0x88][..]).with_dts(0);
        let err = queue.push(key).unwrap_err();
        assert_matches!(err.get_ref(), WriteError::InvalidFrame);
        assert!(queue.samples.is_empty());
        assert_eq!(queue.last_time, None);

        queue.push(video(FrameKind::Key, 3000, &[0, 0, 0, 1, 0x65, 0x88][..]).with_dts(0)).unwrap();
        assert_eq!(queue.samples[0].composition_offset, 3000);
    }

    #[test]
    fn leading_delta_frames_are_dropped() {
        let mut queue = TrackQueue::new(1, Codec::H264, false);
        queue.push(video(FrameKind::Delta, 0, &[0, 0, 0, 1, 0x41, 0x9a][..])).unwrap();
        assert!(queue.samples.is_empty());
        queue.push(video(FrameKind::Key, 3000, &[0, 0, 0, 1, 0x65, 0x88][..])).unwrap();
        queue.push(video(FrameKind::Delta, 6000, &[0, 0, 0, 1, 0x41, 0x9a][..])).unwrap();
        assert_eq!(queue.samples.len(), 2);
        assert!(!queue.is_ready());
    }

    #[test]
    fn decreasing_timestamps() {
        let mut queue = TrackQueue::new(2, Codec::Aac, false);
        let params = MediaParams::Audio { sample_rate: 48000, channels: 2 };
        queue.push(Frame::new(Codec::Aac, FrameKind::Key, 1024, 48000, params, Bytes::from_static(&[1]))).unwrap();
        let err = queue.push(Frame::new(Codec::Aac, FrameKind::Key, 0, 48000, params, Bytes::from_static(&[1]))).unwrap_err();
        assert_matches!(err.into_inner(), WriteError::NonMonotonicTimestamp(2));
    }

    #[test]
    fn later_frames_are_rescaled_to_the_first_timebase() {
        let mut queue = TrackQueue::new(1, Codec::Aac, false);
        let params = MediaParams::Audio { sample_rate: 48000, channels: 2 };
        queue.push(Frame::new(Codec::Aac, FrameKind::Key, 0, 48000, params, Bytes::from_static(&[1]))).unwrap();
        queue.push(Frame::new(Codec::Aac, FrameKind::Key, 1000, 1000, params, Bytes::from_static(&[1]))).unwrap();
        assert_eq!(queue.last_time(), Some(48000));
    }

    #[test]
    fn aac_config_is_synthesized() {
        let mut queue = TrackQueue::new(1, Codec::Aac, false);
        let params = MediaParams::Audio { sample_rate: 44100, channels: 2 };
        queue.push(Frame::new(Codec::Aac, FrameKind::Key, 0, 44100, params, Bytes::from_static(&[1]))).unwrap();
        let entry = queue.sample_entry().unwrap();
        assert_matches!(entry.config, SampleConfig::Es(es) => {
            assert_eq!(es.decoder_specific_info.as_deref(), Some(&[0x12, 0x10][..]));
        });
    }
}
