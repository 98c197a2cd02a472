use bytes::{BufMut, Bytes};
use derive_builder::Builder;

use crate::frame::sample_flags;
use crate::parse::{FourCC, FtypBox, MfhdBox, SampleDefaults, TfdtBox, TfhdBox, TrexBox, TrunBox};
use crate::writer::boxes::BoxWriter;
use crate::writer::init::{put_empty_sample_tables, put_mvhd, put_trak};

use super::{init_logger, TestTrack, TEST_SAMPLE_DELTA};

/// A fragmented MP4 file with a single AAC track, whose runs only carry a data offset so every sample takes the
/// `trex` defaults.
#[derive(Builder)]
#[builder(name = "TestFmp4Builder", build_fn(name = "build_spec"))]
pub struct TestFmp4Spec {
    #[builder(default = "100")]
    default_sample_size: u32,

    #[builder(default = "vec![2]")]
    fragment_sample_counts: Vec<u32>,

    #[builder(default = "true")]
    tfdt: bool,

    /// Track id written into every `tfhd`; the file declares track 1.
    #[builder(default = "1")]
    traf_track_id: u32,
}

#[derive(Clone, Debug)]
pub struct TestFmp4 {
    pub data: Bytes,
    /// The sample data of every fragment.
    pub fragments: Vec<Vec<Bytes>>,
    pub default_sample_flags: u32,
    pub default_sample_duration: u32,
}

impl TestFmp4Builder {
    pub fn build(&self) -> TestFmp4 {
        init_logger();

        let spec = self.build_spec().unwrap();
        let track = TestTrack::aac(1, Vec::new());
        let trak = track.trak_spec();
        let defaults = SampleDefaults {
            sample_description_index: 1,
            duration: TEST_SAMPLE_DELTA,
            size: spec.default_sample_size,
            flags: sample_flags::SYNC,
        };

        let mut out = BoxWriter::new();
        let ftyp = FtypBox { major_brand: FourCC::ISO5, minor_version: 0, compatible_brands: vec![FourCC::ISO6] };
        out.put_box(FourCC::FTYP, |out| ftyp.put_buf(out));
        out.start(FourCC::MOOV);
        put_mvhd(&mut out, &[trak.clone()], 1000);
        out.start(FourCC::MVEX);
        let trex = TrexBox { track_id: 1, defaults };
        out.put_box(FourCC::TREX, |out| trex.put_buf(out));
        out.end();
        put_trak(&mut out, &trak, put_empty_sample_tables);
        out.end();

        let mut fragments = Vec::new();
        let mut decode_time = 0;
        for (fragment_index, &sample_count) in spec.fragment_sample_counts.iter().enumerate() {
            let samples: Vec<Bytes> = (0..sample_count)
                .map(|index| vec![(fragment_index * 16) as u8 + index as u8; spec.default_sample_size as usize].into())
                .collect();

            let moof_start = out.position();
            out.start(FourCC::MOOF);
            let mfhd = MfhdBox { sequence_number: fragment_index as u32 + 1 };
            out.put_box(FourCC::MFHD, |out| mfhd.put_buf(out));
            out.start(FourCC::TRAF);
            let tfhd = TfhdBox { flags: TfhdBox::DEFAULT_BASE_IS_MOOF, track_id: spec.traf_track_id, ..Default::default() };
            out.put_box(FourCC::TFHD, |out| tfhd.put_buf(out));
            if spec.tfdt {
                let tfdt = TfdtBox { base_media_decode_time: decode_time };
                out.put_box(FourCC::TFDT, |out| tfdt.put_buf(out));
            }
            out.start_full(FourCC::TRUN, 0, TrunBox::DATA_OFFSET_PRESENT);
            out.put_u32(sample_count);
            let data_offset_position = out.position();
            out.put_i32(0);
            out.end(); // trun
            out.end(); // traf
            out.end(); // moof

            let data_offset = out.position() - moof_start + 8;
            out.patch_u32(data_offset_position, data_offset as u32);
            out.start(FourCC::MDAT);
            for sample in &samples {
                out.put_slice(sample);
            }
            out.end();

            decode_time += u64::from(sample_count) * u64::from(TEST_SAMPLE_DELTA);
            fragments.push(samples);
        }

        TestFmp4 {
            data: out.finish(),
            fragments,
            default_sample_flags: defaults.flags,
            default_sample_duration: defaults.duration,
        }
    }
}
