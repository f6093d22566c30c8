//! Chunking must never change demuxer output

use proptest::prelude::*;
use rplay_codec_core::mpeg4::VopType;
use rplay_demux_core::testing::{self, mp4, mpeg4, ts::TsWriter, FlvWriter};
use rplay_demux_core::ts::psi::stream_type;
use rplay_demux_core::{CollectingSink, ContainerKind, DemuxerFactory, DemuxerOptions};

fn flv_stream() -> Vec<u8> {
    let mut w = FlvWriter::new(true, true);
    w.metadata(&[("width", testing::amf::number(640.0))]);
    w.aac_config(0, &[0x12, 0x10]);
    w.avc_sequence_header(0, &testing::avc_record(4));
    w.avc_frame(0, 0, true, &[testing::AVC_IDR_SLICE], 4);
    w.aac_frame(0, &[0x21, 0x10]);
    w.avc_frame(40, 40, false, &[testing::AVC_P_SLICE], 4);
    w.aac_frame(23, &[0x21, 0x11]);
    w.avc_frame(80, 40, false, &[testing::AVC_P_SLICE], 4);
    w.finish()
}

fn ts_stream() -> Vec<u8> {
    let key = testing::annex_b(&[
        &[0x09, 0xF0],
        &testing::AVC_SPS,
        &testing::AVC_PPS,
        testing::AVC_IDR_SLICE,
    ]);
    let delta = testing::annex_b(&[&[0x09, 0xF0], testing::AVC_P_SLICE]);
    let mut w = TsWriter::new(188);
    w.program(Some(stream_type::H264), Some(stream_type::AAC_ADTS));
    w.video_pes(9000, None, &key, true);
    w.audio_pes(9000, &testing::adts_frame(4, 2, &[0x21; 40]));
    w.video_pes(12_600, None, &delta, false);
    w.video_pes(16_200, None, &delta, false);
    w.finish()
}

fn fmp4_stream() -> Vec<u8> {
    let mut out = mp4::ftyp();
    out.extend(mp4::moov(
        &[
            mp4::video_trak(1, 90_000, b"avc1", b"avcC", &testing::avc_record(4)),
            mp4::audio_trak(2, 44_100, &mp4::mp4a_entry(2, 44_100, 0x40, &[0x12, 0x10])),
        ],
        &[(1, 3000, 0), (2, 1024, 0)],
    ));
    let idr = testing::length_prefixed(&[testing::AVC_IDR_SLICE], 4);
    let p = testing::length_prefixed(&[testing::AVC_P_SLICE], 4);
    out.extend(mp4::media_segment(
        1,
        &[
            mp4::Traf::new(1, Some(0), vec![mp4::Sample::new(idr), mp4::Sample::new(p.clone()).non_sync()]),
            mp4::Traf::new(2, Some(0), vec![mp4::Sample::new(vec![0x21; 9])]),
        ],
    ));
    out.extend(mp4::media_segment(2, &[mp4::Traf::new(1, None, vec![mp4::Sample::new(p).non_sync()])]));
    out
}

fn naked_stream() -> Vec<u8> {
    let mut data = testing::annex_b(&[
        &testing::AVC_SPS,
        &testing::AVC_PPS,
        testing::AVC_IDR_SLICE,
    ]);
    for _ in 0..3 {
        data.extend(testing::annex_b(&[&[0x09, 0xF0], testing::AVC_P_SLICE]));
    }
    data
}

fn mpeg4_stream() -> Vec<u8> {
    let mut data = mpeg4::vos(0x01);
    data.extend(mpeg4::vo());
    data.extend(mpeg4::vol(320, 240, 30, 1));
    data.extend(mpeg4::vop(VopType::I, &[0x5A; 24]));
    data.extend(mpeg4::vop(VopType::P, &[0x3C; 12]));
    data.extend(mpeg4::vop(VopType::P, &[0x3C; 12]));
    data
}

fn sample(kind: ContainerKind) -> Vec<u8> {
    match kind {
        ContainerKind::Flv => flv_stream(),
        ContainerKind::Ts => ts_stream(),
        ContainerKind::Fmp4 => fmp4_stream(),
        ContainerKind::NakedFlow => naked_stream(),
        ContainerKind::Mpeg4 => mpeg4_stream(),
    }
}

/// Feed `data` cut at `cuts` (sorted, deduplicated positions) and flush
fn run(kind: ContainerKind, data: &[u8], cuts: &[usize]) -> CollectingSink {
    let mut demuxer = DemuxerFactory::create(kind, &DemuxerOptions::default()).unwrap();
    let mut sink = CollectingSink::new();
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&data.len())) {
        demuxer.feed(&data[start..cut], &mut sink).unwrap();
        start = cut;
    }
    demuxer.flush(&mut sink).unwrap();
    sink
}

#[test]
fn test_every_format_produces_frames() {
    for kind in ContainerKind::ALL {
        let data = sample(kind);
        let sink = run(kind, &data, &[]);
        assert!(sink.video_frames().count() >= 3, "{kind}: {:?}", sink.events);
        assert!(sink.warnings().is_empty(), "{kind}: {:?}", sink.warnings());
    }
}

#[test]
fn test_single_byte_chunks() {
    for kind in ContainerKind::ALL {
        let data = sample(kind);
        let whole = run(kind, &data, &[]);
        let cuts: Vec<usize> = (1..data.len()).collect();
        let split = run(kind, &data, &cuts);
        assert_eq!(whole.frames, split.frames, "{kind}");
        assert_eq!(whole.events, split.events, "{kind}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_splits_match_whole_feed(
        kind_index in 0usize..ContainerKind::ALL.len(),
        fractions in proptest::collection::vec(0.0f64..1.0, 0..12),
    ) {
        let kind = ContainerKind::ALL[kind_index];
        let data = sample(kind);
        let mut cuts: Vec<usize> = fractions.iter().map(|f| (f * data.len() as f64) as usize).collect();
        cuts.sort_unstable();
        cuts.dedup();

        let whole = run(kind, &data, &[]);
        let split = run(kind, &data, &cuts);
        prop_assert_eq!(&whole.frames, &split.frames);
        prop_assert_eq!(&whole.events, &split.events);
    }
}
