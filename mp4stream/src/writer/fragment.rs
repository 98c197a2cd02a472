use bytes::{BufMut, Bytes};

use crate::codec::Codec;
use crate::frame::sample_flags;
use crate::parse::{FourCC, FtypBox, MfhdBox, SidxBox, SidxReference, TfdtBox, TfhdBox, TrunBox};

use super::boxes::BoxWriter;

/// The samples one track contributes to a fragment.
#[derive(Debug)]
pub(super) struct TrackRun {
    pub(super) track_id: u32,
    pub(super) codec: Codec,
    pub(super) decode_time: u64,
    pub(super) samples: Vec<RunSample>,
}

#[derive(Debug)]
pub(super) struct RunSample {
    pub(super) duration: u32,
    pub(super) is_sync: bool,
    pub(super) composition_offset: i32,
    pub(super) data: Bytes,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct FragmentInfo {
    pub(super) sequence_number: u32,
    /// Track id of the primary track.
    pub(super) reference_id: u32,
    /// Timescale of the primary track, which the segment index is expressed in.
    pub(super) timescale: u32,
    pub(super) start: u64,
    pub(super) duration: u64,
    pub(super) enable_dts: bool,
}

impl TrackRun {
    fn trun_flags(&self, enable_dts: bool) -> u32 {
        let mut flags = TrunBox::DATA_OFFSET_PRESENT | TrunBox::SAMPLE_DURATION_PRESENT | TrunBox::SAMPLE_SIZE_PRESENT;
        if self.codec.is_h26x() {
            flags |= TrunBox::SAMPLE_FLAGS_PRESENT;
            if enable_dts {
                flags |= TrunBox::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT;
            }
        }
        flags
    }
}

/// Build `styp`, `sidx`, `moof` and `mdat` for one fragment.
pub(super) fn build_fragment(info: &FragmentInfo, runs: &[TrackRun]) -> Bytes {
    let movie_fragment = build_moof_mdat(info, runs);

    let mut out = BoxWriter::new();
    let styp = FtypBox { major_brand: FourCC::MSDH, minor_version: 0, compatible_brands: vec![FourCC::MSDH, FourCC::MSIX] };
    out.put_box(FourCC::STYP, |out| styp.put_buf(out));

    let sidx = SidxBox {
        reference_id: info.reference_id,
        timescale: info.timescale,
        earliest_presentation_time: info.start,
        first_offset: 0,
        references: vec![SidxReference {
            reference_type: false,
            referenced_size: movie_fragment.len() as u32,
            subsegment_duration: u32::try_from(info.duration).unwrap_or(u32::MAX),
            starts_with_sap: true,
            sap_type: 1,
            sap_delta_time: 0,
        }],
    };
    out.put_box(FourCC::SIDX, |out| sidx.put_buf(out));
    out.put_slice(&movie_fragment);
    out.finish()
}

fn build_moof_mdat(info: &FragmentInfo, runs: &[TrackRun]) -> Bytes {
    let mut out = BoxWriter::new();
    let mut data_offset_positions = Vec::with_capacity(runs.len());

    out.start(FourCC::MOOF);
    let mfhd = MfhdBox { sequence_number: info.sequence_number };
    out.put_box(FourCC::MFHD, |out| mfhd.put_buf(out));
    for run in runs {
        out.start(FourCC::TRAF);
        let tfhd = TfhdBox {
            flags: TfhdBox::DEFAULT_BASE_IS_MOOF,
            track_id: run.track_id,
            base_data_offset: None,
            sample_description_index: None,
            default_sample_duration: None,
            default_sample_size: None,
            default_sample_flags: None,
        };
        out.put_box(FourCC::TFHD, |out| tfhd.put_buf(out));
        let tfdt = TfdtBox { base_media_decode_time: run.decode_time };
        out.put_box(FourCC::TFDT, |out| tfdt.put_buf(out));

        let flags = run.trun_flags(info.enable_dts);
        let version = u8::from(flags & TrunBox::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT != 0);
        out.start_full(FourCC::TRUN, version, flags);
        out.put_u32(run.samples.len() as u32);
        data_offset_positions.push(out.position());
        out.put_i32(0);
        for sample in &run.samples {
            out.put_u32(sample.duration);
            out.put_u32(sample.data.len() as u32);
            if flags & TrunBox::SAMPLE_FLAGS_PRESENT != 0 {
                out.put_u32(if sample.is_sync { sample_flags::SYNC } else { sample_flags::NON_SYNC });
            }
            if flags & TrunBox::SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT != 0 {
                out.put_i32(sample.composition_offset);
            }
        }
        out.end(); // trun
        out.end(); // traf
    }
    out.end(); // moof

    // Data offsets are relative to the start of the moof, which is where this buffer starts.
    let mut data_offset = out.position() + 8;
    for (run, position) in runs.iter().zip(data_offset_positions) {
        out.patch_u32(position, data_offset as u32);
        data_offset += run.samples.iter().map(|sample| sample.data.len()).sum::<usize>();
    }

    out.start(FourCC::MDAT);
    for sample in runs.iter().flat_map(|run| &run.samples) {
        out.put_slice(&sample.data);
    }
    out.end();
    out.finish()
}
