//! Codecs carried by `mp4stream` frames, and the bitstream helpers the reader and writer need for them.

#![allow(missing_docs)]

pub mod aac;
pub mod h26x;
pub mod vorbis;

use derive_more::Display;

use crate::parse::FourCC;

/// The codec of a track or a frame.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Codec {
    #[display(fmt = "H.264")]
    H264,
    #[display(fmt = "H.265")]
    H265,
    #[display(fmt = "JPEG")]
    Jpeg,
    #[display(fmt = "AAC")]
    Aac,
    #[display(fmt = "MP3")]
    Mp3,
    #[display(fmt = "Vorbis")]
    Vorbis,
}

/// MPEG-4 systems object type indications used in `esds` decoder config descriptors.
#[allow(missing_docs)]
pub mod object_type {
    pub const AAC: u8 = 0x40;
    pub const AAC_MAIN: u8 = 0x66;
    pub const AAC_LC: u8 = 0x67;
    pub const AAC_SSR: u8 = 0x68;
    pub const MPEG2_AUDIO: u8 = 0x69;
    pub const MP3: u8 = 0x6b;
    pub const JPEG: u8 = 0x6c;
    pub const VORBIS: u8 = 0xdd;
}

impl Codec {
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::H264 | Self::H265 | Self::Jpeg)
    }

    pub const fn is_audio(&self) -> bool {
        !self.is_video()
    }

    /// Whether samples are length-prefixed NAL units in the container and Annex-B byte streams in frames.
    pub const fn is_h26x(&self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }

    /// The codec named by an `esds` object type indication.
    pub fn from_object_type(object_type: u8) -> Option<Self> {
        match object_type {
            object_type::AAC | object_type::AAC_MAIN | object_type::AAC_LC | object_type::AAC_SSR => Some(Self::Aac),
            object_type::MPEG2_AUDIO | object_type::MP3 => Some(Self::Mp3),
            object_type::JPEG => Some(Self::Jpeg),
            object_type::VORBIS => Some(Self::Vorbis),
            _ => None,
        }
    }

    /// The object type indication written for this codec, for codecs described by an `esds` box.
    pub const fn object_type(&self) -> Option<u8> {
        match self {
            Self::Aac => Some(object_type::AAC),
            Self::Mp3 => Some(object_type::MP3),
            Self::Jpeg => Some(object_type::JPEG),
            Self::Vorbis => Some(object_type::VORBIS),
            Self::H264 | Self::H265 => None,
        }
    }

    /// The sample entry format written for this codec.
    pub const fn sample_entry_format(&self) -> FourCC {
        match self {
            Self::H264 => FourCC::AVC1,
            Self::H265 => FourCC::HEV1,
            Self::Jpeg => FourCC::MP4V,
            Self::Aac | Self::Mp3 | Self::Vorbis => FourCC::MP4A,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn object_types_round_trip() {
        for codec in [Codec::Aac, Codec::Mp3, Codec::Jpeg, Codec::Vorbis] {
            assert_eq!(codec.object_type().and_then(Codec::from_object_type), Some(codec));
        }
        assert_eq!(Codec::from_object_type(0x20), None);
    }
}
