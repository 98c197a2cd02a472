use std::ops::{Deref, DerefMut};

use bytes::{BufMut, Bytes, BytesMut};

use crate::parse::{BoxHeader, FourCC, FullBoxHeader};

/// Serializes nested boxes, back-patching each box's 32-bit size as soon as the box is closed.
///
/// Since inner boxes are always closed before their parents, every size is final by the time the enclosing box
/// measures its own extent.
#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: BytesMut,
    open: Vec<usize>,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a box; its size field is written as zero until [`end`](Self::end).
    pub fn start(&mut self, box_type: FourCC) -> &mut Self {
        self.open.push(self.buf.len());
        self.buf.put_u32(0);
        box_type.put_buf(&mut self.buf);
        self
    }

    pub fn start_full(&mut self, box_type: FourCC, version: u8, flags: u32) -> &mut Self {
        self.start(box_type);
        FullBoxHeader::new(version, flags).put_buf(&mut self.buf);
        self
    }

    /// Close the innermost open box.
    pub fn end(&mut self) -> &mut Self {
        match self.open.pop() {
            Some(start) => {
                let size = (self.buf.len() - start) as u32;
                self.patch_u32(start, size);
            }
            None => debug_assert!(false, "BoxWriter::end without an open box"),
        }
        self
    }

    /// Write a complete leaf box whose payload is produced by `put_payload`.
    pub fn put_box(&mut self, box_type: FourCC, put_payload: impl FnOnce(&mut BytesMut)) -> &mut Self {
        self.start(box_type);
        put_payload(&mut self.buf);
        self.end()
    }

    /// Current length of the output, i.e. the offset of the next byte written.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn patch_u32(&mut self, position: usize, value: u32) {
        self.buf[position..position + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub fn finish(self) -> Bytes {
        debug_assert!(self.open.is_empty(), "BoxWriter::finish with {} open boxes", self.open.len());
        self.buf.freeze()
    }
}

impl Deref for BoxWriter {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for BoxWriter {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

/// Write a leaf box with the given payload to `out`.
pub fn put_leaf<B: BufMut>(mut out: B, box_type: FourCC, payload: &[u8]) {
    BoxHeader::with_u32_data_size(box_type, payload.len() as u32).put_buf(&mut out);
    out.put_slice(payload);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::ChildBoxes;

    #[test]
    fn nested_sizes_are_patched() {
        let mut writer = BoxWriter::new();
        writer.start(FourCC::MOOF);
        writer.put_box(FourCC::MFHD, |out| out.put_u64(1));
        writer.start(FourCC::TRAF).put_box(FourCC::TFHD, |out| out.put_u32(7)).end();
        writer.end();
        let data = writer.finish();

        assert_eq!(data.len(), 8 + 16 + 8 + 12);
        assert_eq!(&data[..4], &(data.len() as u32).to_be_bytes());
        let children: Vec<_> = ChildBoxes::new(data.slice(8..)).map(Result::unwrap).collect();
        assert_eq!(children[0].0.box_type(), FourCC::MFHD);
        assert_eq!(children[0].0.box_size(), 16);
        assert_eq!(children[1].0.box_type(), FourCC::TRAF);
        assert_eq!(children[1].0.box_size(), 20);
    }
}
