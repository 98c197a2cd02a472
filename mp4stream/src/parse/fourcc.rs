use std::fmt;

use bytes::BufMut;

/// A four-character code, identifying a box type, a sample entry format, or a brand.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC {
    pub value: [u8; 4],
}

impl FourCC {
    pub const AVCC: Self = Self { value: *b"avcC" };
    pub const HVCC: Self = Self { value: *b"hvcC" };
    pub const MP3: Self = Self { value: *b".mp3" };

    pub const ISOM: Self = Self { value: *b"isom" };
    pub const ISO5: Self = Self { value: *b"iso5" };
    pub const ISO6: Self = Self { value: *b"iso6" };
    pub const MP41: Self = Self { value: *b"mp41" };
    pub const MSDH: Self = Self { value: *b"msdh" };
    pub const MSIX: Self = Self { value: *b"msix" };

    pub const VIDE: Self = Self { value: *b"vide" };
    pub const SOUN: Self = Self { value: *b"soun" };

    pub const fn size() -> u64 {
        4
    }

    pub const fn from_u32(value: u32) -> Self {
        Self { value: value.to_be_bytes() }
    }

    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.value)
    }

    pub fn put_buf<B: BufMut>(&self, mut out: B) {
        out.put(&self.value[..])
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.value) {
            Ok(string) if self.value.iter().all(|byte| byte.is_ascii_graphic() || *byte == b' ') => {
                write!(f, "{}", string.trim())
            }
            _ => write!(f, "0x{:08x}", self.as_u32()),
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

const fn box_name_to_fourcc(name: &str) -> FourCC {
    let name = name.as_bytes();
    let mut value = [b' '; 4];
    let mut idx = 0;
    while idx < name.len() && idx < value.len() {
        value[idx] = name[idx].to_ascii_lowercase();
        idx += 1;
    }
    FourCC { value }
}

macro_rules! box_type {
    ($($name:ident),+ $(,)?) => {
        paste::paste! {
            impl FourCC {
                $(
                    #[doc = "The `" $name "` four-character code, in lowercase."]
                    pub const $name: Self = box_name_to_fourcc(stringify!($name));
                )+
            }
        }

        /// Four-character codes of every box type known to `mp4stream`.
        pub mod box_type {
            use super::FourCC;
            $(pub const $name: FourCC = FourCC::$name;)+
            pub const AVCC: FourCC = FourCC::AVCC;
            pub const HVCC: FourCC = FourCC::HVCC;
        }
    };
}

box_type! {
    AVC1,
    AVC3,
    CO64,
    CSLG,
    CTTS,
    DINF,
    DREF,
    EDTS,
    ELST,
    EMSG,
    ESDS,
    FREE,
    FTYP,
    GMHD,
    HDLR,
    HEV1,
    HVC1,
    IODS,
    JPEG,
    MDAT,
    MDHD,
    MDIA,
    MEHD,
    META,
    MFHD,
    MFRA,
    MINF,
    MOOF,
    MOOV,
    MP4A,
    MP4V,
    MVEX,
    MVHD,
    NMHD,
    PDIN,
    PRFT,
    SAIO,
    SAIZ,
    SBGP,
    SDTP,
    SENC,
    SGPD,
    SIDX,
    SKIP,
    SMHD,
    STBL,
    STCO,
    STHD,
    STSC,
    STSD,
    STSS,
    STSZ,
    STTS,
    STYP,
    SUBS,
    TFDT,
    TFHD,
    TKHD,
    TRAF,
    TRAK,
    TREF,
    TREX,
    TRUN,
    UDTA,
    URL,
    UUID,
    VMHD,
    WAVE,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_constants_are_lowercase_and_padded() {
        assert_eq!(FourCC::MOOV.value, *b"moov");
        assert_eq!(FourCC::URL.value, *b"url ");
        assert_eq!(FourCC::URL.to_string(), "url");
    }

    #[test]
    fn non_printable_fourcc_displays_as_hex() {
        assert_eq!(FourCC::from_u32(0xff58_3002).to_string(), "0xff583002");
    }
}
