use bytes::{Buf, BufMut, Bytes};

use crate::error::Result;

use super::error::WhileParsingBox;
use super::{FourCC, Mp4ValueReaderExt, ParseError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxHeader {
    box_type: FourCC,
    box_size: BoxSize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxSize {
    Size(u32),
    Ext(u64),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

/// Iterator over the child boxes packed back to back inside a fully buffered box payload.
#[derive(Clone, Debug)]
pub struct ChildBoxes {
    data: Bytes,
}

impl BoxHeader {
    pub const MAX_SIZE: u64 = 16;

    pub const fn with_u32_data_size(box_type: FourCC, data_size: u32) -> Self {
        match data_size.checked_add(8) {
            Some(box_size) => Self { box_type, box_size: BoxSize::Size(box_size) },
            None => Self { box_type, box_size: BoxSize::Ext(data_size as u64 + 16) },
        }
    }

    /// Read a header from the start of `input` without consuming anything.
    ///
    /// Returns `None` if `input` is too short to hold the complete header.
    pub fn peek(input: &[u8]) -> Result<Option<Self>, ParseError> {
        if input.len() < 8 {
            return Ok(None);
        }
        let mut buf = input;
        let size: u32 = buf.get_mp4_value()?;
        let box_type: FourCC = buf.get_mp4_value()?;
        let box_size = match size {
            0 => bail_attach!(ParseError::InvalidBoxSize, "box size of zero", WhileParsingBox(box_type)),
            1 => {
                if buf.remaining() < 8 {
                    return Ok(None);
                }
                BoxSize::Ext(buf.get_mp4_value()?)
            }
            size => BoxSize::Size(size),
        };
        let header = Self { box_type, box_size };
        ensure_attach!(
            header.box_size() >= header.encoded_len(),
            ParseError::InvalidBoxSize,
            "box size smaller than its header",
            WhileParsingBox(box_type),
        );
        Ok(Some(header))
    }

    /// Parse a header which must be complete, consuming it from `buf`.
    pub fn parse<B: Buf>(mut buf: B) -> Result<Self, ParseError> {
        let header = Self::peek(buf.chunk())?;
        let Some(header) = header else {
            bail_attach!(ParseError::TruncatedBox, "while parsing box header");
        };
        buf.advance(header.encoded_len() as usize);
        Ok(header)
    }

    pub const fn encoded_len(&self) -> u64 {
        match self.box_size {
            BoxSize::Size(_) => 8,
            BoxSize::Ext(_) => 16,
        }
    }

    pub const fn box_size(&self) -> u64 {
        match self.box_size {
            BoxSize::Size(size) => size as u64,
            BoxSize::Ext(size) => size,
        }
    }

    pub const fn box_data_size(&self) -> u64 {
        self.box_size() - self.encoded_len()
    }

    pub const fn box_type(&self) -> FourCC {
        self.box_type
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        match self.box_size {
            BoxSize::Size(size) => out.put_u32(size),
            BoxSize::Ext(_) => out.put_u32(1),
        }
        self.box_type.put_buf(&mut out);
        if let BoxSize::Ext(size) = self.box_size {
            out.put_u64(size);
        }
    }
}

impl FullBoxHeader {
    pub const fn new(version: u8, flags: u32) -> Self {
        Self { version, flags }
    }

    pub fn parse<B: Buf>(mut buf: B) -> Result<Self, ParseError> {
        let version: u8 = buf.get_mp4_value()?;
        let flags: [u8; 3] = buf.get_mp4_value()?;
        let flags = u32::from_be_bytes([0, flags[0], flags[1], flags[2]]);
        Ok(Self { version, flags })
    }

    pub const fn encoded_len(&self) -> u64 {
        4
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        out.put_u8(self.version);
        out.put_slice(&self.flags.to_be_bytes()[1..]);
    }

    /// Fail with [`ParseError::UnsupportedVersion`] unless the version is at most `max_version`.
    pub fn ensure_version(&self, box_type: FourCC, max_version: u8) -> Result<(), ParseError> {
        ensure_attach!(
            self.version <= max_version,
            ParseError::UnsupportedVersion(box_type, self.version),
            WhileParsingBox(box_type),
        );
        Ok(())
    }
}

impl ChildBoxes {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }
}

impl Iterator for ChildBoxes {
    type Item = Result<(BoxHeader, Bytes), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let header = match BoxHeader::parse(&self.data[..]) {
            Ok(header) => header,
            Err(err) => {
                self.data.clear();
                return Some(Err(err));
            }
        };
        if header.box_size() > self.data.len() as u64 {
            self.data.clear();
            return Some(Err(report_attach!(
                ParseError::TruncatedBox,
                "child box overruns its parent",
                WhileParsingBox(header.box_type()),
            )));
        }
        let mut data = self.data.split_to(header.box_size() as usize);
        data.advance(header.encoded_len() as usize);
        Some(Ok((header, data)))
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn peek_needs_whole_header() {
        assert_matches!(BoxHeader::peek(&[0, 0, 0, 16, b'f']), Ok(None));
        assert_matches!(BoxHeader::peek(&[0, 0, 0, 1, b'm', b'd', b'a', b't', 0, 0]), Ok(None));
    }

    #[test]
    fn zero_size_is_fatal() {
        let err = BoxHeader::peek(b"\0\0\0\0free").unwrap_err();
        assert_eq!(err.get_ref(), &ParseError::InvalidBoxSize);
    }

    #[test]
    fn largesize() {
        let mut buf = BytesMut::new();
        BoxHeader { box_type: FourCC::MDAT, box_size: BoxSize::Ext(0x1_0000_0010) }.put_buf(&mut buf);
        let header = BoxHeader::peek(&buf).unwrap().unwrap();
        assert_eq!(header.encoded_len(), 16);
        assert_eq!(header.box_size(), 0x1_0000_0010);
        assert_eq!(header.box_data_size(), 0x1_0000_0000);
    }

    #[test]
    fn children_overrun() {
        let mut buf = BytesMut::new();
        BoxHeader::with_u32_data_size(FourCC::FREE, 4).put_buf(&mut buf);
        buf.put_u16(0);
        let mut children = ChildBoxes::new(buf.freeze());
        let err = children.next().unwrap().unwrap_err();
        assert_eq!(err.get_ref(), &ParseError::TruncatedBox);
        assert!(children.next().is_none());
    }
}
