//! AAC `AudioSpecificConfig` (ISO/IEC 14496-3), as stored in the decoder specific info of an `esds` box.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, ResultExt};
use crate::parse::bits::BitReader;
use crate::parse::error::WhereEq;
use crate::parse::ParseError;

pub const OBJECT_TYPE_AAC_LC: u8 = 2;

const SAMPLE_RATES: [u32; 13] = [96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350];
const EXPLICIT_FREQUENCY_INDEX: u32 = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sample_rate: u32,
    pub channel_config: u8,
}

impl AudioSpecificConfig {
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut bits = BitReader::new(data);
        let config = Self::read(&mut bits).while_parsing_type()?;
        ensure_attach!(config.sample_rate != 0, ParseError::InvalidCodecConfig, WhereEq("sample_rate", 0));
        Ok(config)
    }

    fn read(bits: &mut BitReader<'_>) -> Result<Self, ParseError> {
        let object_type = match bits.read_bits(5)? {
            31 => 32 + bits.read_bits(6)?,
            object_type => object_type,
        };
        let sample_rate = match bits.read_bits(4)? {
            EXPLICIT_FREQUENCY_INDEX => bits.read_bits(24)?,
            index => match SAMPLE_RATES.get(index as usize) {
                Some(sample_rate) => *sample_rate,
                None => bail_attach!(ParseError::InvalidCodecConfig, WhereEq("samplingFrequencyIndex", index)),
            },
        };
        let channel_config = bits.read_bits(4)? as u8;
        Ok(Self { object_type: object_type as u8, sample_rate, channel_config })
    }

    /// Channel count implied by the channel configuration; configuration 7 is 7.1 sound.
    pub fn channels(&self) -> u16 {
        match self.channel_config {
            7 => 8,
            config => config.into(),
        }
    }

    /// A configuration for AAC-LC at the given rate and channel count.
    pub fn lc(sample_rate: u32, channels: u16) -> Self {
        let channel_config = match channels {
            8 => 7,
            channels => channels.min(15) as u8,
        };
        Self { object_type: OBJECT_TYPE_AAC_LC, sample_rate, channel_config }
    }

    /// Serialize, using a sampling frequency index when the rate has one and an explicit rate otherwise.
    pub fn to_bytes(&self) -> Bytes {
        let object_type = u64::from(self.object_type.min(30));
        let channel_config = u64::from(self.channel_config & 0x0f);
        let mut out = BytesMut::with_capacity(5);
        match SAMPLE_RATES.iter().position(|rate| *rate == self.sample_rate) {
            Some(index) => {
                let bits = object_type << 11 | (index as u64) << 7 | channel_config << 3;
                out.put_u16(bits as u16);
            }
            None => {
                let bits = object_type << 35
                    | u64::from(EXPLICIT_FREQUENCY_INDEX) << 31
                    | u64::from(self.sample_rate & 0xff_ffff) << 7
                    | channel_config << 3;
                out.put_slice(&bits.to_be_bytes()[3..]);
            }
        }
        out.freeze()
    }
}
