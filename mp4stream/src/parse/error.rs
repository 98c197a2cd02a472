//! Error types returned by the reader and the box parsers.

use std::fmt::{Debug, Display};

use derive_more::Display;

use crate::error::{Result, ResultExt};

use super::FourCC;

/// Error type returned by the MP4 reader and box parsers.
///
/// Every variant maps to one stable numeric [`code`](Self::code), which the reader keeps as its sticky error number
/// once traversal has halted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A box header declared a size of zero, or a size smaller than its own header.
    #[error("Invalid box size")]
    InvalidBoxSize,

    /// The input contains a box type the reader does not know how to traverse.
    #[error("Unsupported box `{0}`")]
    UnsupportedBox(FourCC),

    /// The input ended inside a box, or a field overran the box containing it.
    #[error("Truncated box")]
    TruncatedBox,

    /// A field contained a value that is not allowed.
    #[error("Invalid input")]
    InvalidInput,

    /// Boxes appeared in an ordering or nesting the reader cannot make sense of.
    #[error("Invalid box layout")]
    InvalidBoxLayout,

    /// A `trak` box ended without a `tkhd` assigning its track id.
    #[error("Track has no track id")]
    MissingTrackId,

    /// A box which must be buffered whole exceeds the configured maximum size.
    #[error("Box too large")]
    BoxTooLarge,

    /// A full box declared a version the reader does not implement.
    #[error("Unsupported `{0}` box version {1}")]
    UnsupportedVersion(FourCC, u8),

    /// The edit list uses 64-bit entries or an edit pattern the reader cannot apply.
    #[error("Unsupported edit list")]
    UnsupportedEditList,

    /// The sample description could not be interpreted.
    #[error("Invalid sample description")]
    InvalidSampleDescription,

    /// A box or frame handler returned `false`.
    #[error("Aborted by handler")]
    HandlerAborted,

    /// A track fragment header carries flags the reader does not implement.
    #[error("Unsupported tfhd flags 0x{0:06x}")]
    UnsupportedTfhdFlags(u32),

    /// A track fragment refers to a track id never declared in the movie header.
    #[error("Unknown track {0}")]
    UnknownTrack(u32),

    /// A sample's byte range does not lie inside the media data box it should be read from.
    #[error("Sample outside media data")]
    SampleOutsideMdat,

    /// The classic sample tables of a track disagree about how many samples it has.
    #[error("Sample tables do not agree")]
    SampleTableMismatch,

    /// The sample entry describes a codec the reader cannot produce frames for.
    #[error("Unsupported codec `{0}`")]
    UnsupportedCodec(FourCC),

    /// A codec configuration record (`avcC`, `hvcC`, `esds`, decoder specific info) is malformed.
    #[error("Invalid codec configuration")]
    InvalidCodecConfig,
}

impl ParseError {
    /// The stable numeric code of this error.
    pub const fn code(&self) -> u32 {
        match self {
            Self::InvalidBoxSize => 1,
            Self::UnsupportedBox(_) => 2,
            Self::TruncatedBox => 3,
            Self::InvalidInput => 4,
            Self::InvalidBoxLayout => 5,
            Self::MissingTrackId => 6,
            Self::BoxTooLarge => 7,
            Self::UnsupportedVersion(..) => 8,
            Self::UnsupportedEditList => 9,
            Self::InvalidSampleDescription => 10,
            Self::HandlerAborted => 11,
            Self::UnsupportedTfhdFlags(_) => 12,
            Self::UnknownTrack(_) => 13,
            Self::SampleOutsideMdat => 14,
            Self::SampleTableMismatch => 15,
            Self::UnsupportedCodec(_) => 16,
            Self::InvalidCodecConfig => 17,
        }
    }
}

pub(crate) trait ParseResultExt: ResultExt + Sized {
    #[track_caller]
    fn while_parsing_box(self, box_type: FourCC) -> Self {
        self.attach_printable(WhileParsingBox(box_type))
    }

    #[track_caller]
    fn while_parsing_field<T>(self, box_type: FourCC, field_name: T) -> Self
    where
        T: Display + Debug + Send + Sync + 'static,
    {
        self.attach_printable(WhileParsingField(box_type, field_name))
    }

    #[track_caller]
    fn at_offset(self, offset: u64) -> Self {
        self.attach_printable(AtOffset(offset))
    }

    #[track_caller]
    fn for_track(self, track_id: u32) -> Self {
        self.attach_printable(ForTrack(track_id))
    }
}

#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "while parsing `{}` box", _0)]
pub(crate) struct WhileParsingBox(pub(crate) FourCC);

#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "while parsing `{}` box field `{}`", _0, _1)]
pub(crate) struct WhileParsingField<T>(pub(crate) FourCC, pub(crate) T);

#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "where `{} = {}`", _0, _1)]
pub(crate) struct WhereEq<T, U>(pub(crate) T, pub(crate) U);

#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "at stream offset 0x{:08x}", _0)]
pub(crate) struct AtOffset(pub(crate) u64);

#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "for track {}", _0)]
pub(crate) struct ForTrack(pub(crate) u32);

impl<T> ParseResultExt for Result<T, ParseError> {}
