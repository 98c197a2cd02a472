//! Decoders (and, where the writer needs them, encoders) for individual MP4 box types.
//!
//! Every box parser takes the box payload, without its header, as [`Bytes`](bytes::Bytes). Sample tables keep a
//! handle on the payload and decode their rows lazily through cursors.

#![allow(missing_docs)]

mod avcc;
pub mod bits;
mod ctts;
mod decoded;
mod elst;
pub mod error;
pub mod esds;
mod fourcc;
mod ftyp;
mod hdlr;
mod header;
mod hvcc;
mod integers;
mod mdhd;
mod mfhd;
mod mvex;
mod mvhd;
mod sidx;
mod stco;
mod stsc;
mod stsd;
mod stss;
mod stsz;
mod stts;
pub mod table;
mod tfdt;
mod tfhd;
mod tkhd;
mod traf;
mod trun;

pub use avcc::AvcConfig;
pub use ctts::{CttsBox, CttsCursor, CttsEntry};
pub use decoded::{classify, BoxClass, DecodedBox};
pub use elst::{ElstBox, ElstCursor, ElstEntry};
pub use error::ParseError;
pub use esds::EsDescriptor;
pub use fourcc::{box_type, FourCC};
pub use ftyp::FtypBox;
pub use hdlr::HdlrBox;
pub use header::{BoxHeader, BoxSize, ChildBoxes, FullBoxHeader};
pub use hvcc::{HevcConfig, HevcNalArray};
pub use integers::{Mp4Prim, Mp4Transform, Mp4ValueReaderExt, Mp4ValueWriterExt};
pub use mdhd::MdhdBox;
pub use mfhd::MfhdBox;
pub use mvex::{MvexBox, SampleDefaults, TrexBox};
pub use mvhd::MvhdBox;
pub use sidx::{SidxBox, SidxReference};
pub use stco::{ChunkOffsetBox, ChunkOffsetCursor};
pub use stsc::{StscBox, StscCursor, StscEntry};
pub use stsd::{SampleConfig, SampleEntry, StsdBox};
pub use stss::{StssBox, StssCursor};
pub use stsz::{StszBox, StszCursor};
pub use stts::{SttsBox, SttsCursor, SttsEntry};
pub use tfdt::TfdtBox;
pub use tfhd::TfhdBox;
pub use tkhd::TkhdBox;
pub use traf::TrafBox;
pub use trun::{TrunBox, TrunCursor, TrunSample};
