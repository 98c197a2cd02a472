#![warn(missing_docs)]

//! `mp4stream` reads MP4 and fragmented MP4 streams incrementally and writes fragmented MP4.
//!
//! # Reading
//!
//! [`Mp4Reader`] is fed arbitrarily sized chunks of a stream through [`Mp4Reader::read`]. Every box it walks is
//! reported as a [`ReadEvent::Atom`], and every sample of a supported track as a [`ReadEvent::Frame`] as soon as its
//! bytes have arrived. Three layouts are understood:
//!
//! - classic MP4, with `moov` before `mdat`, whose samples are located through the sample tables;
//! - classic MP4 with `mdat` before `moov`, whose media data is held until the tables arrive;
//! - fragmented MP4, whose samples are described per fragment by `moof` boxes.
//!
//! H.264 and H.265 samples are returned as Annex-B byte streams; AAC, MP3, JPEG and Vorbis samples unchanged.
//!
//! ```
//! use mp4stream::{Mp4Reader, ReadEvent};
//!
//! let ftyp = [0, 0, 0, 16, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm', 0, 0, 0, 0];
//! let mut reader = Mp4Reader::new();
//! let mut atoms = Vec::new();
//! for chunk in ftyp.chunks(3) {
//!     reader.read(chunk, |event| {
//!         if let ReadEvent::Atom(atom) = event {
//!             atoms.push(atom.box_type());
//!         }
//!         true
//!     })?;
//! }
//! reader.finish()?;
//! assert_eq!(atoms, [mp4stream::parse::FourCC::FTYP]);
//! # Ok::<(), mp4stream::error::Report<mp4stream::ParseError>>(())
//! ```
//!
//! # Writing
//!
//! [`Mp4Writer`] takes [`Frame`]s for a fixed set of codecs and produces an init segment followed by `styp`, `sidx`,
//! `moof` and `mdat` fragments of roughly [`WriterConfig::fragment_duration_ms`] each.

#[macro_use]
mod macros;

mod atom;
pub mod codec;
pub mod error;
mod frame;
pub mod parse;
mod reader;
mod util;
mod writer;

pub use atom::Mp4Atom;
pub use codec::Codec;
pub use frame::{sample_flags, Frame, FrameKind, MediaParams};
pub use parse::ParseError;
pub use reader::{Mp4Reader, ReadEvent, ReaderConfig, ReaderConfigBuilder};
pub use writer::{Mp4Writer, WriteError, WriterConfig, WriterConfigBuilder};
pub use util::rescale;
