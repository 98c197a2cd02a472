use bytes::{BufMut, Bytes};
use fixed::types::{I8F8, U16F16};

use crate::frame::{sample_flags, MediaParams};
use crate::parse::{
    ElstBox, FourCC, FtypBox, FullBoxHeader, HdlrBox, MdhdBox, Mp4Transform, MvhdBox, SampleDefaults, SampleEntry,
    StsdBox, TkhdBox, TrexBox,
};

use super::boxes::{put_leaf, BoxWriter};

/// Everything one `trak` box is built from.
#[derive(Clone, Debug)]
pub(crate) struct TrakSpec {
    pub(crate) track_id: u32,
    pub(crate) timescale: u32,
    /// Media duration in `timescale` units, `0` for fragmented streams.
    pub(crate) duration: u64,
    pub(crate) entry: SampleEntry,
    pub(crate) edit: Option<ElstBox>,
}

impl TrakSpec {
    fn is_video(&self) -> bool {
        matches!(self.entry.params, Some(MediaParams::Video { .. }))
    }
}

/// The `ftyp` and `moov` that open a fragmented stream.
pub(crate) fn init_segment(traks: &[TrakSpec], movie_timescale: u32) -> Bytes {
    let mut out = BoxWriter::new();
    let ftyp = FtypBox {
        major_brand: FourCC::ISO5,
        minor_version: 0,
        compatible_brands: vec![FourCC::ISO6, FourCC::MP41],
    };
    out.put_box(FourCC::FTYP, |out| ftyp.put_buf(out));

    out.start(FourCC::MOOV);
    put_mvhd(&mut out, traks, movie_timescale);
    out.start(FourCC::MVEX);
    for trak in traks {
        let flags = trex_flags(&trak.entry);
        let trex = TrexBox {
            track_id: trak.track_id,
            defaults: SampleDefaults { sample_description_index: 1, duration: 0, size: 0, flags },
        };
        out.put_box(FourCC::TREX, |out| trex.put_buf(out));
    }
    out.end();
    for trak in traks {
        put_trak(&mut out, trak, put_empty_sample_tables);
    }
    out.end();
    out.finish()
}

pub(crate) fn put_mvhd(out: &mut BoxWriter, traks: &[TrakSpec], movie_timescale: u32) {
    let next_track_id = traks.iter().map(|trak| trak.track_id).max().unwrap_or(0) + 1;
    let mvhd = MvhdBox::new(movie_timescale, next_track_id);
    out.put_box(FourCC::MVHD, |out| mvhd.put_buf(out));
}

/// Write one `trak`; `put_sample_tables` writes the `stbl` children that follow `stsd`.
pub(crate) fn put_trak(out: &mut BoxWriter, trak: &TrakSpec, put_sample_tables: impl FnOnce(&mut BoxWriter)) {
    let (width, height) = match trak.entry.params {
        Some(MediaParams::Video { width, height }) => (U16F16::from_num(width), U16F16::from_num(height)),
        _ => (U16F16::ZERO, U16F16::ZERO),
    };
    let tkhd = TkhdBox {
        flags: TkhdBox::FLAG_ENABLED | TkhdBox::FLAG_IN_MOVIE,
        track_id: trak.track_id,
        duration: 0,
        layer: 0,
        alternate_group: 0,
        volume: if trak.is_video() { I8F8::ZERO } else { I8F8::ONE },
        matrix: Mp4Transform::UNITY,
        width,
        height,
    };

    out.start(FourCC::TRAK);
    out.put_box(FourCC::TKHD, |out| tkhd.put_buf(out));
    if let Some(elst) = &trak.edit {
        out.start(FourCC::EDTS).put_box(FourCC::ELST, |out| elst.put_buf(out)).end();
    }

    out.start(FourCC::MDIA);
    let mdhd = MdhdBox { timescale: trak.timescale, duration: trak.duration, language: MdhdBox::UNDETERMINED_LANGUAGE };
    out.put_box(FourCC::MDHD, |out| mdhd.put_buf(out));
    let hdlr = match trak.is_video() {
        true => HdlrBox { handler_type: FourCC::VIDE, name: "VideoHandler".into() },
        false => HdlrBox { handler_type: FourCC::SOUN, name: "SoundHandler".into() },
    };
    out.put_box(FourCC::HDLR, |out| hdlr.put_buf(out));

    out.start(FourCC::MINF);
    match trak.is_video() {
        true => out.put_box(FourCC::VMHD, |out| {
            FullBoxHeader::new(0, 1).put_buf(&mut *out);
            out.put_bytes(0, 8); // graphicsmode, opcolor
        }),
        false => out.put_box(FourCC::SMHD, |out| {
            FullBoxHeader::default().put_buf(&mut *out);
            out.put_bytes(0, 4); // balance, reserved
        }),
    };
    out.start(FourCC::DINF);
    out.put_box(FourCC::DREF, |out| {
        FullBoxHeader::default().put_buf(&mut *out);
        out.put_u32(1);
        // self-contained: the media data is in this file
        put_leaf(&mut *out, FourCC::URL, &[0, 0, 0, 1]);
    });
    out.end();

    out.start(FourCC::STBL);
    let stsd = StsdBox { entry: trak.entry.clone() };
    out.put_box(FourCC::STSD, |out| stsd.put_buf(out));
    put_sample_tables(out);
    out.end(); // stbl
    out.end(); // minf
    out.end(); // mdia
    out.end(); // trak
}

pub(crate) fn put_empty_sample_tables(out: &mut BoxWriter) {
    for box_type in [FourCC::STTS, FourCC::STSC, FourCC::STSZ, FourCC::STCO] {
        out.put_box(box_type, |out| {
            FullBoxHeader::default().put_buf(&mut *out);
            if box_type == FourCC::STSZ {
                out.put_u32(0); // sample_size
            }
            out.put_u32(0);
        });
    }
}

/// Default sample flags announced in `trex`: audio and JPEG samples are all sync samples.
fn trex_flags(entry: &SampleEntry) -> u32 {
    match entry.format {
        FourCC::AVC1 | FourCC::AVC3 | FourCC::HEV1 | FourCC::HVC1 => sample_flags::NON_SYNC,
        _ => sample_flags::SYNC,
    }
}

#[cfg(test)]
mod test {
    use crate::parse::{ChildBoxes, EsDescriptor, SampleConfig};

    use super::*;

    fn aac_trak(track_id: u32) -> TrakSpec {
        TrakSpec {
            track_id,
            timescale: 48000,
            duration: 0,
            entry: SampleEntry {
                format: FourCC::MP4A,
                data_reference_index: 1,
                params: Some(MediaParams::Audio { sample_rate: 48000, channels: 2 }),
                config: SampleConfig::Es(EsDescriptor {
                    object_type: 0x40,
                    stream_type: crate::parse::esds::STREAM_TYPE_AUDIO,
                    decoder_specific_info: Some(Bytes::from_static(&[0x11, 0x90])),
                    ..Default::default()
                }),
            },
            edit: None,
        }
    }

    #[test]
    fn init_segment_layout() {
        let init = init_segment(&[aac_trak(1)], 1000);
        let boxes: Vec<FourCC> = ChildBoxes::new(init.clone()).map(|child| child.unwrap().0.box_type()).collect();
        assert_eq!(boxes, [FourCC::FTYP, FourCC::MOOV]);

        let (_, moov) = ChildBoxes::new(init).nth(1).unwrap().unwrap();
        let children: Vec<FourCC> = ChildBoxes::new(moov).map(|child| child.unwrap().0.box_type()).collect();
        assert_eq!(children, [FourCC::MVHD, FourCC::MVEX, FourCC::TRAK]);
    }
}
