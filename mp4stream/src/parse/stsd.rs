use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::Codec;
use crate::error::Result;
use crate::frame::MediaParams;

use super::error::{ParseResultExt, WhereEq, WhileParsingBox};
use super::{AvcConfig, BoxHeader, ChildBoxes, EsDescriptor, FourCC, FullBoxHeader, HevcConfig, Mp4ValueReaderExt, ParseError};

/// Sample description box. Only the first sample entry is used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StsdBox {
    pub entry: SampleEntry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleEntry {
    pub format: FourCC,
    pub data_reference_index: u16,
    /// Geometry or audio format, `None` for sample entry formats whose layout is unknown.
    pub params: Option<MediaParams>,
    pub config: SampleConfig,
}

/// The decoder configuration box found inside a sample entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleConfig {
    Avc(AvcConfig),
    Hevc(HevcConfig),
    Es(EsDescriptor),
    None,
}

const VISUAL_ENTRY_LEN: usize = 78;
const AUDIO_ENTRY_LEN: usize = 28;

impl StsdBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let mut buf = data.clone();
        FullBoxHeader::parse(&mut buf)?;
        let entry_count: u32 = buf.get_mp4_value().while_parsing_field(FourCC::STSD, "entry_count")?;
        ensure_attach!(entry_count != 0, ParseError::InvalidSampleDescription, WhileParsingBox(FourCC::STSD));
        if entry_count != 1 {
            log::warn!("`stsd` has {entry_count} sample entries; only the first is used");
        }
        let Some(first) = ChildBoxes::new(buf).next() else {
            bail_attach!(ParseError::InvalidSampleDescription, WhereEq("entry_count", entry_count));
        };
        let (header, data) = first.while_parsing_box(FourCC::STSD)?;
        let entry = SampleEntry::parse(header.box_type(), data).while_parsing_box(header.box_type())?;
        Ok(Self { entry })
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        let mut entry = BytesMut::new();
        self.entry.put_buf(&mut entry);
        FullBoxHeader::default().put_buf(&mut out);
        out.put_u32(1);
        BoxHeader::with_u32_data_size(self.entry.format, entry.len() as u32).put_buf(&mut out);
        out.put_slice(&entry);
    }
}

impl SampleEntry {
    pub fn parse(format: FourCC, data: Bytes) -> Result<Self, ParseError> {
        match format {
            FourCC::AVC1 | FourCC::AVC3 | FourCC::HEV1 | FourCC::HVC1 | FourCC::MP4V | FourCC::JPEG => {
                Self::parse_visual(format, data)
            }
            FourCC::MP4A | FourCC::MP3 => Self::parse_audio(format, data),
            _ => {
                log::debug!("sample entry format `{format}` has no known layout");
                Ok(Self { format, data_reference_index: 0, params: None, config: SampleConfig::None })
            }
        }
    }

    fn parse_visual(format: FourCC, mut buf: Bytes) -> Result<Self, ParseError> {
        ensure_attach!(buf.remaining() >= VISUAL_ENTRY_LEN, ParseError::TruncatedBox, "visual sample entry");
        buf.advance(6);
        let data_reference_index = buf.get_u16();
        buf.advance(16);
        let width = buf.get_u16();
        let height = buf.get_u16();
        buf.advance(VISUAL_ENTRY_LEN - 28);
        let params = MediaParams::Video { width: width.into(), height: height.into() };
        let config = find_config(buf)?;
        Ok(Self { format, data_reference_index, params: Some(params), config })
    }

    fn parse_audio(format: FourCC, mut buf: Bytes) -> Result<Self, ParseError> {
        ensure_attach!(buf.remaining() >= AUDIO_ENTRY_LEN, ParseError::TruncatedBox, "audio sample entry");
        buf.advance(6);
        let data_reference_index = buf.get_u16();
        let version = buf.get_u16();
        buf.advance(6);
        let mut channels = buf.get_u16();
        buf.advance(6);
        let mut sample_rate = buf.get_u32() >> 16;
        match version {
            0 => {}
            1 => buf.skip_mp4(16).while_parsing_field(format, "QuickTime sound description v1")?,
            2 => {
                buf.skip_mp4(4).while_parsing_field(format, "sizeOfStructOnly")?;
                let rate: u64 = buf.get_mp4_value().while_parsing_field(format, "audioSampleRate")?;
                let channel_count: u32 = buf.get_mp4_value().while_parsing_field(format, "numAudioChannels")?;
                buf.skip_mp4(20).while_parsing_field(format, "QuickTime sound description v2")?;
                sample_rate = f64::from_bits(rate) as u32;
                channels = channel_count.try_into().unwrap_or(u16::MAX);
            }
            _ => bail_attach!(ParseError::InvalidSampleDescription, WhereEq("sound description version", version)),
        }
        let params = MediaParams::Audio { sample_rate, channels };
        let config = find_config(buf)?;
        Ok(Self { format, data_reference_index, params: Some(params), config })
    }

    /// The codec this entry describes.
    pub fn codec(&self) -> Result<Codec, ParseError> {
        let codec = match (self.format, &self.config) {
            (FourCC::AVC1 | FourCC::AVC3, SampleConfig::Avc(_)) => Codec::H264,
            (FourCC::HEV1 | FourCC::HVC1, SampleConfig::Hevc(_)) => Codec::H265,
            (FourCC::AVC1 | FourCC::AVC3 | FourCC::HEV1 | FourCC::HVC1, _) => {
                bail_attach!(ParseError::InvalidSampleDescription, "missing decoder configuration", WhileParsingBox(self.format));
            }
            (FourCC::JPEG, _) => Codec::Jpeg,
            (FourCC::MP3, _) => Codec::Mp3,
            (FourCC::MP4V | FourCC::MP4A, SampleConfig::Es(es)) => match Codec::from_object_type(es.object_type) {
                Some(codec) if codec.is_video() == (self.format == FourCC::MP4V) => codec,
                _ => bail_attach!(ParseError::UnsupportedCodec(self.format), WhereEq("objectTypeIndication", es.object_type)),
            },
            _ => bail_attach!(ParseError::UnsupportedCodec(self.format)),
        };
        Ok(codec)
    }

    /// Write the entry's payload, including its decoder configuration box.
    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        out.put_slice(&[0; 6]);
        out.put_u16(self.data_reference_index);
        match self.params {
            Some(MediaParams::Video { width, height }) => {
                out.put_slice(&[0; 16]);
                out.put_u16(width as u16);
                out.put_u16(height as u16);
                out.put_u32(0x0048_0000); // 72 dpi
                out.put_u32(0x0048_0000);
                out.put_u32(0);
                out.put_u16(1); // frame_count
                out.put_slice(&[0; 32]);
                out.put_u16(0x0018);
                out.put_i16(-1);
            }
            Some(MediaParams::Audio { sample_rate, channels }) => {
                out.put_slice(&[0; 8]);
                out.put_u16(channels);
                out.put_u16(16);
                out.put_u32(0);
                out.put_u32(sample_rate.min(u16::MAX.into()) << 16);
            }
            None => {}
        }

        let mut config = BytesMut::new();
        let box_type = match &self.config {
            SampleConfig::Avc(avc) => {
                avc.put_buf(&mut config);
                FourCC::AVCC
            }
            SampleConfig::Hevc(hevc) => {
                hevc.put_buf(&mut config);
                FourCC::HVCC
            }
            SampleConfig::Es(es) => {
                es.put_buf(&mut config);
                FourCC::ESDS
            }
            SampleConfig::None => return,
        };
        BoxHeader::with_u32_data_size(box_type, config.len() as u32).put_buf(&mut out);
        out.put_slice(&config);
    }
}

/// Find the decoder configuration among the children of a sample entry, looking inside QuickTime `wave` boxes.
fn find_config(data: Bytes) -> Result<SampleConfig, ParseError> {
    for child in ChildBoxes::new(data) {
        let (header, data) = child?;
        let config = match header.box_type() {
            FourCC::AVCC => SampleConfig::Avc(AvcConfig::parse(&data)?),
            FourCC::HVCC => SampleConfig::Hevc(HevcConfig::parse(&data)?),
            FourCC::ESDS => SampleConfig::Es(EsDescriptor::parse(&data)?),
            FourCC::WAVE => find_config(data)?,
            _ => continue,
        };
        if config != SampleConfig::None {
            return Ok(config);
        }
    }
    Ok(SampleConfig::None)
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::parse::esds::STREAM_TYPE_AUDIO;

    fn aac_entry() -> SampleEntry {
        let es = EsDescriptor {
            es_id: 1,
            object_type: 0x40,
            stream_type: STREAM_TYPE_AUDIO,
            decoder_specific_info: Some(Bytes::from_static(&[0x12, 0x10])),
            ..Default::default()
        };
        SampleEntry {
            format: FourCC::MP4A,
            data_reference_index: 1,
            params: Some(MediaParams::Audio { sample_rate: 44100, channels: 2 }),
            config: SampleConfig::Es(es),
        }
    }

    fn stsd_bytes(entry: &SampleEntry) -> Bytes {
        let mut data = BytesMut::new();
        StsdBox { entry: entry.clone() }.put_buf(&mut data);
        data.freeze()
    }

    #[test]
    fn audio_entry_round_trip() {
        let entry = aac_entry();
        let stsd = StsdBox::parse(&stsd_bytes(&entry)).unwrap();
        assert_eq!(stsd.entry, entry);
        assert_eq!(stsd.entry.codec().unwrap(), Codec::Aac);
    }

    #[test]
    fn visual_entry_is_78_bytes() {
        let entry = SampleEntry {
            format: FourCC::JPEG,
            data_reference_index: 1,
            params: Some(MediaParams::Video { width: 640, height: 480 }),
            config: SampleConfig::None,
        };
        let mut payload = BytesMut::new();
        entry.put_buf(&mut payload);
        assert_eq!(payload.len(), VISUAL_ENTRY_LEN);
        assert_eq!(SampleEntry::parse(FourCC::JPEG, payload.freeze()).unwrap(), entry);
    }

    #[test]
    fn quicktime_v1_sound_description() {
        let mut payload = BytesMut::new();
        payload.put_slice(&[0; 6]);
        payload.put_u16(1);
        payload.put_u16(1); // version
        payload.put_slice(&[0; 6]);
        payload.put_u16(1);
        payload.put_u16(16);
        payload.put_u32(0);
        payload.put_u32(22050 << 16);
        payload.put_slice(&[0; 16]);
        let entry = SampleEntry::parse(FourCC::MP3, payload.freeze()).unwrap();
        assert_eq!(entry.params, Some(MediaParams::Audio { sample_rate: 22050, channels: 1 }));
        assert_eq!(entry.codec().unwrap(), Codec::Mp3);
    }

    #[test]
    fn unknown_object_type_is_unsupported() {
        let mut entry = aac_entry();
        let SampleConfig::Es(es) = &mut entry.config else { unreachable!() };
        es.object_type = 0x20;
        assert_matches!(entry.codec().unwrap_err().get_ref(), ParseError::UnsupportedCodec(FourCC::MP4A));
    }

    #[test]
    fn avc1_without_avcc() {
        let entry = SampleEntry {
            format: FourCC::AVC1,
            data_reference_index: 1,
            params: Some(MediaParams::Video { width: 16, height: 16 }),
            config: SampleConfig::None,
        };
        assert_matches!(entry.codec().unwrap_err().get_ref(), ParseError::InvalidSampleDescription);
    }

    #[test]
    fn empty_stsd() {
        let data = Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_matches!(StsdBox::parse(&data).unwrap_err().get_ref(), ParseError::InvalidSampleDescription);
    }
}
