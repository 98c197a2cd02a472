use bytes::Bytes;

use crate::error::Result;

use super::error::ParseResultExt;
use super::{
    ChunkOffsetBox, CttsBox, ElstBox, FourCC, FtypBox, HdlrBox, MdhdBox, MfhdBox, MvexBox, MvhdBox, ParseError, SidxBox,
    StscBox, StsdBox, StssBox, StszBox, SttsBox, TkhdBox, TrafBox,
};

/// How the reader traverses a box type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxClass {
    /// Only the header is consumed; the children follow as boxes of their own.
    Container,
    /// Media data, which may be delivered to the caller before it is completely buffered.
    MediaData,
    /// Buffered whole, then decoded or skipped.
    Leaf,
    Unknown,
}

/// The result of decoding one complete box payload, before any of it is applied to reader state.
#[derive(Clone, Debug)]
pub enum DecodedBox {
    Ftyp(FtypBox),
    Styp(FtypBox),
    Sidx(SidxBox),
    Mvhd(MvhdBox),
    Tkhd(TkhdBox),
    Mdhd(MdhdBox),
    Hdlr(HdlrBox),
    Stsd(StsdBox),
    Stts(SttsBox),
    Stss(StssBox),
    Stsc(StscBox),
    Stsz(StszBox),
    ChunkOffsets(ChunkOffsetBox),
    Ctts(CttsBox),
    Elst(ElstBox),
    Mvex(MvexBox),
    Mfhd(MfhdBox),
    Traf(TrafBox),
    /// Consumed without interpretation.
    Opaque,
}

pub fn classify(box_type: FourCC) -> BoxClass {
    match box_type {
        FourCC::MOOV | FourCC::TRAK | FourCC::EDTS | FourCC::MDIA | FourCC::MINF | FourCC::STBL | FourCC::MOOF => {
            BoxClass::Container
        }
        FourCC::MDAT => BoxClass::MediaData,
        FourCC::FTYP
        | FourCC::STYP
        | FourCC::SIDX
        | FourCC::FREE
        | FourCC::SKIP
        | FourCC::MVHD
        | FourCC::IODS
        | FourCC::UDTA
        | FourCC::TKHD
        | FourCC::ELST
        | FourCC::MDHD
        | FourCC::HDLR
        | FourCC::VMHD
        | FourCC::SMHD
        | FourCC::NMHD
        | FourCC::STHD
        | FourCC::GMHD
        | FourCC::DINF
        | FourCC::STSD
        | FourCC::STTS
        | FourCC::STSS
        | FourCC::STSC
        | FourCC::STSZ
        | FourCC::STCO
        | FourCC::CO64
        | FourCC::CTTS
        | FourCC::CSLG
        | FourCC::SDTP
        | FourCC::SGPD
        | FourCC::SBGP
        | FourCC::MVEX
        | FourCC::MFHD
        | FourCC::TRAF
        | FourCC::META
        | FourCC::UUID
        | FourCC::TREF
        | FourCC::PRFT
        | FourCC::EMSG
        | FourCC::PDIN
        | FourCC::MFRA => BoxClass::Leaf,
        _ => BoxClass::Unknown,
    }
}

impl DecodedBox {
    /// Decode the complete payload of a [leaf](BoxClass::Leaf) box.
    pub fn decode(box_type: FourCC, data: &Bytes) -> Result<Self, ParseError> {
        Self::decode_payload(box_type, data).while_parsing_box(box_type)
    }

    fn decode_payload(box_type: FourCC, data: &Bytes) -> Result<Self, ParseError> {
        let decoded = match box_type {
            FourCC::FTYP => Self::Ftyp(FtypBox::parse(data)?),
            FourCC::STYP => Self::Styp(FtypBox::parse(data)?),
            FourCC::SIDX => Self::Sidx(SidxBox::parse(data)?),
            FourCC::MVHD => Self::Mvhd(MvhdBox::parse(data)?),
            FourCC::TKHD => Self::Tkhd(TkhdBox::parse(data)?),
            FourCC::MDHD => Self::Mdhd(MdhdBox::parse(data)?),
            FourCC::HDLR => Self::Hdlr(HdlrBox::parse(data)?),
            FourCC::STSD => Self::Stsd(StsdBox::parse(data)?),
            FourCC::STTS => Self::Stts(SttsBox::parse(data)?),
            FourCC::STSS => Self::Stss(StssBox::parse(data)?),
            FourCC::STSC => Self::Stsc(StscBox::parse(data)?),
            FourCC::STSZ => Self::Stsz(StszBox::parse(data)?),
            FourCC::STCO => Self::ChunkOffsets(ChunkOffsetBox::parse_stco(data)?),
            FourCC::CO64 => Self::ChunkOffsets(ChunkOffsetBox::parse_co64(data)?),
            FourCC::CTTS => Self::Ctts(CttsBox::parse(data)?),
            FourCC::ELST => Self::Elst(ElstBox::parse(data)?),
            FourCC::MVEX => Self::Mvex(MvexBox::parse(data)?),
            FourCC::MFHD => Self::Mfhd(MfhdBox::parse(data)?),
            FourCC::TRAF => Self::Traf(TrafBox::parse(data)?),
            _ => Self::Opaque,
        };
        Ok(decoded)
    }

    /// Whether this box only makes sense inside a `trak`.
    pub fn is_track_level(&self) -> bool {
        matches!(
            self,
            Self::Tkhd(_)
                | Self::Mdhd(_)
                | Self::Hdlr(_)
                | Self::Stsd(_)
                | Self::Stts(_)
                | Self::Stss(_)
                | Self::Stsc(_)
                | Self::Stsz(_)
                | Self::ChunkOffsets(_)
                | Self::Ctts(_)
                | Self::Elst(_)
        )
    }
}
