use bytes::Bytes;

use crate::error::Result;

use super::error::{ParseResultExt, WhileParsingBox};
use super::{ChildBoxes, FourCC, ParseError, TfdtBox, TfhdBox, TrunBox};

/// Track fragment, decoded in two passes: the children are collected first and then interpreted in dependency order
/// (`tfhd`, then `tfdt`, then every `trun`), whatever order they were stored in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrafBox {
    pub tfhd: TfhdBox,
    pub tfdt: Option<TfdtBox>,
    pub truns: Vec<TrunBox>,
}

impl TrafBox {
    pub fn parse(data: &Bytes) -> Result<Self, ParseError> {
        let children = ChildBoxes::new(data.clone())
            .map(|child| child.map(|(header, data)| (header.box_type(), data)))
            .collect::<Result<Vec<_>, _>>()
            .while_parsing_box(FourCC::TRAF)?;

        let mut tfhd_boxes = children.iter().filter(|(box_type, _)| *box_type == FourCC::TFHD);
        let (Some((_, tfhd_data)), None) = (tfhd_boxes.next(), tfhd_boxes.next()) else {
            bail_attach!(ParseError::InvalidBoxLayout, "expected exactly one `tfhd`", WhileParsingBox(FourCC::TRAF));
        };
        let tfhd = TfhdBox::parse(tfhd_data).while_parsing_box(FourCC::TFHD)?;

        let mut tfdt = None;
        let mut truns = Vec::new();
        for (box_type, data) in &children {
            match *box_type {
                FourCC::TFHD => {}
                FourCC::TFDT => tfdt = Some(TfdtBox::parse(data).while_parsing_box(FourCC::TFDT)?),
                FourCC::TRUN => truns.push(TrunBox::parse(data).while_parsing_box(FourCC::TRUN)?),
                FourCC::SENC | FourCC::SAIZ | FourCC::SAIO | FourCC::SBGP | FourCC::SGPD | FourCC::SDTP | FourCC::SUBS => {
                    log::debug!("ignoring `{box_type}` box inside `traf`");
                }
                other => log::warn!("ignoring unknown `{other}` box inside `traf`"),
            }
        }
        Ok(Self { tfhd, tfdt, truns })
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::parse::{BoxHeader, FullBoxHeader};

    fn put_box(out: &mut BytesMut, box_type: FourCC, payload: &[u8]) {
        BoxHeader::with_u32_data_size(box_type, payload.len() as u32).put_buf(&mut *out);
        out.put_slice(payload);
    }

    fn tfhd_payload(track_id: u32) -> Vec<u8> {
        let mut data = vec![];
        FullBoxHeader::new(0, TfhdBox::DEFAULT_BASE_IS_MOOF).put_buf(&mut data);
        data.put_u32(track_id);
        data
    }

    fn trun_payload() -> Vec<u8> {
        let mut data = vec![];
        FullBoxHeader::new(0, TrunBox::SAMPLE_SIZE_PRESENT).put_buf(&mut data);
        data.put_u32(1);
        data.put_u32(42);
        data
    }

    #[test]
    fn tfhd_after_trun() {
        let mut traf = BytesMut::new();
        put_box(&mut traf, FourCC::TRUN, &trun_payload());
        put_box(&mut traf, FourCC::TFDT, &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0]);
        put_box(&mut traf, FourCC::TFHD, &tfhd_payload(7));
        let traf = TrafBox::parse(&traf.freeze()).unwrap();
        assert_eq!(traf.tfhd.track_id, 7);
        assert_eq!(traf.tfdt.map(|tfdt| tfdt.base_media_decode_time), Some(0x1000));
        assert_eq!(traf.truns.len(), 1);
    }

    #[test]
    fn missing_tfhd() {
        let mut traf = BytesMut::new();
        put_box(&mut traf, FourCC::TRUN, &trun_payload());
        let err = TrafBox::parse(&traf.freeze()).unwrap_err();
        assert_eq!(err.get_ref(), &ParseError::InvalidBoxLayout);
    }

    #[test]
    fn duration_is_empty_is_unsupported() {
        let mut tfhd = vec![];
        FullBoxHeader::new(0, TfhdBox::DURATION_IS_EMPTY).put_buf(&mut tfhd);
        tfhd.put_u32(1);
        let mut traf = BytesMut::new();
        put_box(&mut traf, FourCC::TFHD, &tfhd);
        let err = TrafBox::parse(&traf.freeze()).unwrap_err();
        assert_eq!(err.get_ref(), &ParseError::UnsupportedTfhdFlags(TfhdBox::DURATION_IS_EMPTY));
    }
}
