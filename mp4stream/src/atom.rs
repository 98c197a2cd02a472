use bytes::Bytes;

use crate::parse::{BoxHeader, FourCC};

/// One box boundary observed by the [reader](crate::Mp4Reader).
///
/// Every box in the stream is reported, containers included. A container's [`payload`](Self::payload) is empty, since
/// its children are reported as atoms of their own right after it.
///
/// A media data box may also be reported while it is still arriving, see [`is_complete`](Self::is_complete).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mp4Atom {
    header: BoxHeader,
    position: u64,
    payload: Bytes,
    payload_offset: u64,
    is_complete: bool,
}

impl Mp4Atom {
    pub(crate) fn new(header: BoxHeader, position: u64, payload: Bytes) -> Self {
        Self { header, position, payload, payload_offset: 0, is_complete: true }
    }

    /// A report of the payload bytes `payload_offset..payload_offset + payload.len()` of an unfinished box.
    pub(crate) fn partial(header: BoxHeader, position: u64, payload_offset: u64, payload: Bytes) -> Self {
        Self { header, position, payload, payload_offset, is_complete: false }
    }

    /// The four-character type of the box.
    pub fn box_type(&self) -> FourCC {
        self.header.box_type()
    }

    /// The parsed box header.
    pub fn header(&self) -> &BoxHeader {
        &self.header
    }

    /// Absolute stream offset of the first byte of the box header.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The declared size of the box, header included.
    pub fn box_size(&self) -> u64 {
        self.header.box_size()
    }

    /// The payload of the box, without its header; for a partial report, only the newly arrived part of it.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Offset of the first byte of [`payload`](Self::payload) within the whole box payload. Always 0 for a complete
    /// box.
    pub fn payload_offset(&self) -> u64 {
        self.payload_offset
    }

    /// `false` only for a media data box reported before all of its payload arrived.
    ///
    /// Such a box is reported once when its header arrives and again whenever more of its payload does. Each partial
    /// report carries only the bytes that arrived since the previous one, at [`payload_offset`](Self::payload_offset),
    /// so the partial payloads of one box concatenate to the prefix received so far. The final report, once the box
    /// is complete, carries the whole payload without copying it.
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }
}
