use bytes::{Buf, BufMut};
use fixed::types::{I16F16, I2F30, I8F8, U16F16};
use nalgebra::{Matrix3x2, Vector3};

use crate::error::{Result, ResultExt, WhileParsingType};

use super::{FourCC, ParseError};

/// A fixed-width big-endian value inside a box payload.
pub trait Mp4Prim: Sized {
    /// Encoded width in bytes.
    const LEN: usize;

    fn parse<B: Buf>(buf: B) -> Result<Self, ParseError>;
    fn put_buf<B: BufMut>(&self, buf: B);
}

/// Typed reads from a box payload.
pub trait Mp4ValueReaderExt: Buf + Sized {
    fn get_mp4_value<T: Mp4Prim>(&mut self) -> Result<T, ParseError> {
        T::parse(self)
    }

    /// Skip `len` bytes, failing instead of panicking when fewer remain.
    fn skip_mp4(&mut self, len: usize) -> Result<(), ParseError> {
        ensure_attach!(self.remaining() >= len, ParseError::TruncatedBox);
        self.advance(len);
        Ok(())
    }
}

pub trait Mp4ValueWriterExt: BufMut + Sized {
    fn put_mp4_value<T: Mp4Prim>(&mut self, value: &T) {
        value.put_buf(self)
    }
}

impl<B: Buf> Mp4ValueReaderExt for B {}

impl<B: BufMut> Mp4ValueWriterExt for B {}

/// The 3x3 matrix stored in `mvhd` and `tkhd`, row by row.
///
/// Columns `a b` / `c d` / `x y` are 16.16 fixed point; the third column `u v w` is 2.30.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mp4Transform {
    pub transform: Matrix3x2<I16F16>,
    pub normalizer: Vector3<I2F30>,
}

impl<const N: usize> Mp4Prim for [u8; N] {
    const LEN: usize = N;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, ParseError> {
        ensure_attach!(buf.remaining() >= N, ParseError::TruncatedBox, WhileParsingType::new::<Self>());
        let mut bytes = [0; N];
        buf.copy_to_slice(&mut bytes);
        Ok(bytes)
    }

    fn put_buf<B: BufMut>(&self, mut buf: B) {
        buf.put_slice(self);
    }
}

// Integers and fixed point numbers are both decoded from their big-endian byte arrays.
macro_rules! be_prim {
    ($($ty:ty: $from_bytes:expr, $to_bytes:expr;)+) => {
        $(impl Mp4Prim for $ty {
            const LEN: usize = std::mem::size_of::<$ty>();

            fn parse<B: Buf>(buf: B) -> Result<Self, ParseError> {
                <[u8; std::mem::size_of::<$ty>()]>::parse(buf).map($from_bytes).while_parsing_type()
            }

            fn put_buf<B: BufMut>(&self, mut buf: B) {
                buf.put_slice(&$to_bytes(*self));
            }
        })+
    };
}

be_prim! {
    u8: u8::from_be_bytes, u8::to_be_bytes;
    u16: u16::from_be_bytes, u16::to_be_bytes;
    u32: u32::from_be_bytes, u32::to_be_bytes;
    u64: u64::from_be_bytes, u64::to_be_bytes;
    i8: i8::from_be_bytes, i8::to_be_bytes;
    i16: i16::from_be_bytes, i16::to_be_bytes;
    i32: i32::from_be_bytes, i32::to_be_bytes;
    i64: i64::from_be_bytes, i64::to_be_bytes;
    I8F8: I8F8::from_be_bytes, I8F8::to_be_bytes;
    I16F16: I16F16::from_be_bytes, I16F16::to_be_bytes;
    U16F16: U16F16::from_be_bytes, U16F16::to_be_bytes;
    I2F30: I2F30::from_be_bytes, I2F30::to_be_bytes;
}

impl Mp4Prim for FourCC {
    const LEN: usize = 4;

    fn parse<B: Buf>(buf: B) -> Result<Self, ParseError> {
        <[u8; 4]>::parse(buf).map(|value| Self { value }).while_parsing_type()
    }

    fn put_buf<B: BufMut>(&self, mut buf: B) {
        buf.put_slice(&self.value);
    }
}

impl Mp4Prim for Mp4Transform {
    const LEN: usize = 36;

    fn parse<B: Buf>(mut buf: B) -> Result<Self, ParseError> {
        let Self { mut transform, mut normalizer } = Self::UNITY;
        for row in 0..3 {
            transform[(row, 0)] = buf.get_mp4_value().while_parsing_type()?;
            transform[(row, 1)] = buf.get_mp4_value().while_parsing_type()?;
            normalizer[row] = buf.get_mp4_value().while_parsing_type()?;
        }
        Ok(Self { transform, normalizer })
    }

    fn put_buf<B: BufMut>(&self, mut buf: B) {
        for (row, &normalizer) in self.normalizer.iter().enumerate() {
            buf.put_mp4_value(&self.transform[(row, 0)]);
            buf.put_mp4_value(&self.transform[(row, 1)]);
            buf.put_mp4_value(&normalizer);
        }
    }
}

impl Mp4Transform {
    /// The identity transform `{1, 0, 0, 0, 1, 0, 0, 0, 1}`.
    pub const UNITY: Self = Self {
        transform: Matrix3x2::new(I16F16::ONE, I16F16::ZERO, I16F16::ZERO, I16F16::ONE, I16F16::ZERO, I16F16::ZERO),
        normalizer: Vector3::new(I2F30::ZERO, I2F30::ZERO, I2F30::ONE),
    };
}

impl Default for Mp4Transform {
    fn default() -> Self {
        Self::UNITY
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn truncated_integer() {
        let mut buf = &[0u8, 1, 2][..];
        let err = buf.get_mp4_value::<u32>().unwrap_err();
        assert_eq!(err.get_ref(), &ParseError::TruncatedBox);
    }

    #[test]
    fn skip_past_end() {
        let mut buf = &[0u8; 4][..];
        buf.skip_mp4(3).unwrap();
        assert_eq!(buf.skip_mp4(2).unwrap_err().get_ref(), &ParseError::TruncatedBox);
    }

    #[test]
    fn unity_transform_bytes() {
        let mut buf = BytesMut::new();
        buf.put_mp4_value(&Mp4Transform::UNITY);
        let expected: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];
        let expected: Vec<u8> = expected.iter().flat_map(|value| value.to_be_bytes()).collect();
        assert_eq!(&buf[..], &expected[..]);
        assert_eq!(buf.len(), Mp4Transform::LEN);
        assert_eq!(Mp4Transform::parse(&buf[..]).unwrap(), Mp4Transform::UNITY);
    }

    #[test]
    fn fixed_point_width() {
        let width: U16F16 = (&[0x02, 0x80, 0x80, 0x00][..]).get_mp4_value().unwrap();
        assert_eq!(width.to_num::<u32>(), 640);
    }

    #[test]
    fn negative_composition_offset() {
        let offset: i32 = (&[0xff, 0xff, 0xf4, 0x48][..]).get_mp4_value().unwrap();
        assert_eq!(offset, -3000);
    }
}
