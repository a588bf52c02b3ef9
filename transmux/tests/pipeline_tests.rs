//! End-to-end pipeline tests: synthetic FLV bytes in, fMP4 segments out.

use std::cell::RefCell;
use std::rc::Rc;

use transmux::{
    LoadRequest, Loader, LoaderStatus, MediaDataSource, TrackKind, TransmuxConfig, TransmuxEvent,
    Transmuxer, TransportError,
};

// ============================================================================
// Synthetic FLV construction
// ============================================================================

// Baseline 3.1, 640x360, square SAR, fixed 30 fps
const SPS: &[u8] = &[
    0x67, 0x42, 0x00, 0x1F, 0xF4, 0x05, 0x01, 0x7F, 0xCB, 0x80, 0x88, 0x00, 0x00, 0x1F, 0x40,
    0x00, 0x07, 0x53, 0x04, 0x20,
];
const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

fn avcc() -> Vec<u8> {
    let mut out = vec![0x01, 0x42, 0x00, 0x1F, 0xFF, 0xE1];
    out.extend_from_slice(&(SPS.len() as u16).to_be_bytes());
    out.extend_from_slice(SPS);
    out.push(0x01);
    out.extend_from_slice(&(PPS.len() as u16).to_be_bytes());
    out.extend_from_slice(PPS);
    out
}

fn flv_header(flags: u8) -> Vec<u8> {
    let mut out = vec![b'F', b'L', b'V', 1, flags];
    out.extend_from_slice(&9u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // PreviousTagSize0
    out
}

fn tag(tag_type: u8, timestamp: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(11 + body.len() + 4);
    out.push(tag_type);
    out.push((body.len() >> 16) as u8);
    out.push((body.len() >> 8) as u8);
    out.push(body.len() as u8);
    out.push((timestamp >> 16) as u8);
    out.push((timestamp >> 8) as u8);
    out.push(timestamp as u8);
    out.push((timestamp >> 24) as u8);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(body);
    out.extend_from_slice(&((11 + body.len()) as u32).to_be_bytes());
    out
}

fn avc_sequence_header_tag() -> Vec<u8> {
    let mut body = vec![0x17, 0x00, 0x00, 0x00, 0x00];
    body.extend_from_slice(&avcc());
    tag(9, 0, &body)
}

fn avc_nalu_tag(timestamp: u32, keyframe: bool, payload_len: usize) -> Vec<u8> {
    let mut body = vec![if keyframe { 0x17 } else { 0x27 }, 0x01, 0, 0, 0];
    let nal_header = if keyframe { 0x65 } else { 0x41 };
    body.extend_from_slice(&((payload_len + 1) as u32).to_be_bytes());
    body.push(nal_header);
    body.extend_from_slice(&vec![0xAA; payload_len]);
    tag(9, timestamp, &body)
}

fn aac_sequence_header_tag() -> Vec<u8> {
    // objectType=2, 44100 Hz, stereo
    tag(8, 0, &[0xAF, 0x00, 0x12, 0x10])
}

fn aac_frame_tag(timestamp: u32, payload_len: usize) -> Vec<u8> {
    let mut body = vec![0xAF, 0x01];
    body.extend_from_slice(&vec![0xBB; payload_len]);
    tag(8, timestamp, &body)
}

fn amf_number(n: f64) -> Vec<u8> {
    let mut out = vec![0x00];
    out.extend_from_slice(&n.to_be_bytes());
    out
}

fn amf_prop(name: &str, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(name.len() as u16).to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(value);
    out
}

fn amf_strict_array(values: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0x0A];
    out.extend_from_slice(&(values.len() as u32).to_be_bytes());
    for value in values {
        out.extend_from_slice(value);
    }
    out
}

fn script_tag(props: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut body = vec![0x02];
    body.extend_from_slice(&10u16.to_be_bytes());
    body.extend_from_slice(b"onMetaData");
    body.push(0x08);
    body.extend_from_slice(&(props.len() as u32).to_be_bytes());
    for (name, value) in props {
        body.extend_from_slice(&amf_prop(name, value));
    }
    body.extend_from_slice(&[0, 0, 0x09]);
    tag(18, 0, &body)
}

fn keyframes_object(entries: &[(f64, f64)]) -> Vec<u8> {
    let times: Vec<Vec<u8>> = entries.iter().map(|(t, _)| amf_number(*t)).collect();
    let positions: Vec<Vec<u8>> = entries.iter().map(|(_, p)| amf_number(*p)).collect();
    let mut obj = vec![0x03];
    obj.extend_from_slice(&amf_prop("times", &amf_strict_array(&times)));
    obj.extend_from_slice(&amf_prop("filepositions", &amf_strict_array(&positions)));
    obj.extend_from_slice(&[0, 0, 0x09]);
    obj
}

// ============================================================================
// Mock loader
// ============================================================================

#[derive(Default)]
struct MockLoaderState {
    opens: Vec<LoadRequest>,
    status: LoaderStatus,
}

#[derive(Clone, Default)]
struct MockLoader {
    state: Rc<RefCell<MockLoaderState>>,
}

impl Loader for MockLoader {
    fn open(&mut self, request: &LoadRequest) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.opens.push(request.clone());
        state.status = LoaderStatus::Buffering;
        Ok(())
    }

    fn abort(&mut self) {
        self.state.borrow_mut().status = LoaderStatus::Idle;
    }

    fn status(&self) -> LoaderStatus {
        self.state.borrow().status
    }
}

fn transmuxer_with(
    configure: impl FnOnce(&mut TransmuxConfig),
) -> (Transmuxer, MockLoader) {
    let loader = MockLoader::default();
    let mut config = TransmuxConfig::default();
    config.enable_stash_buffer = false; // deterministic dispatch in tests
    configure(&mut config);
    let source = MediaDataSource::new("http://example.com/stream.flv");
    let mut transmuxer = Transmuxer::new(source, config, Box::new(loader.clone()));
    transmuxer.open().unwrap();
    (transmuxer, loader)
}

fn drain(transmuxer: &mut Transmuxer) -> Vec<TransmuxEvent> {
    let mut events = Vec::new();
    while let Some(event) = transmuxer.poll_event() {
        events.push(event);
    }
    events
}

fn mfhd_sequence_number(segment: &[u8]) -> u32 {
    let pos = segment
        .windows(4)
        .position(|w| w == b"mfhd")
        .expect("mfhd present");
    u32::from_be_bytes(segment[pos + 8..pos + 12].try_into().unwrap())
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn init_segments_and_media_info_from_config_tags() {
    let (mut transmuxer, _loader) = transmuxer_with(|config| {
        config.prefer_he_aac = true;
    });

    let mut stream = flv_header(0x05);
    stream.extend_from_slice(&script_tag(&[
        ("duration", amf_number(10.0)),
        ("width", amf_number(640.0)),
        ("height", amf_number(360.0)),
    ]));
    stream.extend_from_slice(&avc_sequence_header_tag());
    stream.extend_from_slice(&aac_sequence_header_tag());
    transmuxer.on_data_arrival(&stream, 0);

    let events = drain(&mut transmuxer);
    assert_eq!(events.len(), 3);

    let TransmuxEvent::InitSegment(video) = &events[0] else {
        panic!("expected video init segment, got {:?}", events[0]);
    };
    assert_eq!(video.kind, TrackKind::Video);
    assert_eq!(video.container, "video/mp4");
    assert_eq!(video.codec, "avc1.42001f");
    assert_eq!(video.media_duration, 10_000);
    assert_eq!(&video.data[4..8], b"ftyp");

    let TransmuxEvent::InitSegment(audio) = &events[1] else {
        panic!("expected audio init segment, got {:?}", events[1]);
    };
    assert_eq!(audio.kind, TrackKind::Audio);
    assert_eq!(audio.container, "audio/mp4");
    assert_eq!(audio.codec, "mp4a.40.5"); // HE-AAC promotion
    assert_eq!(audio.media_duration, 10_000);

    let TransmuxEvent::MediaInfo(info) = &events[2] else {
        panic!("expected media info, got {:?}", events[2]);
    };
    assert_eq!(
        info.mime_type.as_deref(),
        Some("video/x-flv; codecs=\"avc1.42001f,mp4a.40.5\"")
    );
    assert_eq!(info.duration, Some(10_000));
}

#[test]
fn media_segments_follow_init_and_info_in_order() {
    let (mut transmuxer, _loader) = transmuxer_with(|_| {});

    let mut stream = flv_header(0x05);
    stream.extend_from_slice(&avc_sequence_header_tag());
    stream.extend_from_slice(&aac_sequence_header_tag());
    for i in 0..4u32 {
        stream.extend_from_slice(&avc_nalu_tag(i * 33, i == 0, 64));
        stream.extend_from_slice(&aac_frame_tag(i * 23, 32));
    }
    transmuxer.on_data_arrival(&stream, 0);

    let events = drain(&mut transmuxer);

    let mut seen_media_info = false;
    let mut init_kinds = Vec::new();
    let mut media_kinds = Vec::new();
    for event in &events {
        match event {
            TransmuxEvent::InitSegment(segment) => {
                assert!(media_kinds.is_empty(), "init must precede media segments");
                init_kinds.push(segment.kind);
            }
            TransmuxEvent::MediaInfo(_) => {
                assert!(
                    media_kinds.is_empty(),
                    "media info must precede media segments"
                );
                seen_media_info = true;
            }
            TransmuxEvent::MediaSegment(segment) => {
                media_kinds.push(segment.kind);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(seen_media_info);
    assert_eq!(init_kinds, vec![TrackKind::Video, TrackKind::Audio]);
    // one segment per track, video remuxed first
    assert_eq!(media_kinds, vec![TrackKind::Video, TrackKind::Audio]);
}

#[test]
fn sequence_numbers_increase_across_arrivals() {
    let (mut transmuxer, _loader) = transmuxer_with(|_| {});

    let mut stream = flv_header(0x01);
    stream.extend_from_slice(&avc_sequence_header_tag());
    transmuxer.on_data_arrival(&stream, 0);
    let mut offset = stream.len() as u64;

    let mut video_sequences = Vec::new();
    for round in 0..3u32 {
        let mut chunk = Vec::new();
        for i in 0..4u32 {
            let ts = round * 132 + i * 33;
            chunk.extend_from_slice(&avc_nalu_tag(ts, i == 0, 64));
        }
        transmuxer.on_data_arrival(&chunk, offset);
        offset += chunk.len() as u64;

        for event in drain(&mut transmuxer) {
            if let TransmuxEvent::MediaSegment(segment) = event {
                video_sequences.push(mfhd_sequence_number(&segment.data));
            }
        }
    }
    assert_eq!(video_sequences, vec![1, 2, 3]);
}

#[test]
fn keyframe_seek_reopens_loader_and_recommends_seekpoint() {
    let (mut transmuxer, loader) = transmuxer_with(|_| {});

    let mut stream = flv_header(0x01);
    stream.extend_from_slice(&script_tag(&[
        ("duration", amf_number(8.0)),
        (
            "keyframes",
            keyframes_object(&[
                (0.0, 5.0), // entry 0 describes the sequence header
                (0.0, 9.0),
                (2.0, 50_000.0),
                (4.0, 100_000.0),
                (6.0, 150_000.0),
            ]),
        ),
    ]));
    stream.extend_from_slice(&avc_sequence_header_tag());
    for i in 0..3u32 {
        stream.extend_from_slice(&avc_nalu_tag(i * 33, i == 0, 64));
    }
    transmuxer.on_data_arrival(&stream, 0);
    drain(&mut transmuxer);

    let info = transmuxer.media_info().expect("media info").clone();
    assert!(info.is_seekable());
    let hit = info.get_nearest_keyframe(3000).unwrap();
    assert_eq!(
        (hit.index, hit.milliseconds, hit.file_position),
        (1, 2000, 50_000)
    );

    transmuxer.seek(3000);
    {
        let state = loader.state.borrow();
        let reopened = state.opens.last().unwrap();
        assert_eq!(reopened.range.from, 50_000);
        assert_eq!(
            reopened.headers,
            vec![("Range".to_string(), "bytes=50000-".to_string())]
        );
    }

    // the keyframe tag and its successors arrive at the seeked offset
    let mut chunk = Vec::new();
    for i in 0..3u32 {
        chunk.extend_from_slice(&avc_nalu_tag(2000 + i * 33, i == 0, 64));
    }
    transmuxer.on_data_arrival(&chunk, 50_000);

    let events = drain(&mut transmuxer);
    let mut segment_begin = None;
    let mut recommend = None;
    for (index, event) in events.iter().enumerate() {
        match event {
            TransmuxEvent::MediaSegment(segment) => {
                segment_begin = Some((index, segment.info.begin_dts));
            }
            TransmuxEvent::RecommendSeekpoint(ms) => {
                recommend = Some((index, *ms));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    let (segment_index, begin_dts) = segment_begin.expect("video segment after seek");
    let (recommend_index, recommend_ms) = recommend.expect("seekpoint recommendation");
    assert_eq!(recommend_ms, 2000);
    assert_eq!(begin_dts, 2000);
    assert!(recommend_index > segment_index);
}

#[test]
fn loading_complete_flushes_stash_and_stashed_samples() {
    // stash enabled: nothing flows until the stash overflows or completes
    let (mut transmuxer, _loader) = transmuxer_with(|config| {
        config.enable_stash_buffer = true;
    });

    let mut stream = flv_header(0x01);
    stream.extend_from_slice(&avc_sequence_header_tag());
    for i in 0..4u32 {
        stream.extend_from_slice(&avc_nalu_tag(i * 33, i == 0, 64));
    }
    transmuxer.on_data_arrival(&stream, 0);
    assert!(drain(&mut transmuxer).is_empty());

    let total = stream.len() as u64;
    transmuxer.on_loader_complete(0, total - 1);
    let events = drain(&mut transmuxer);

    // init, one 3-sample segment, the flushed stashed sample, completion
    let media_segments: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            TransmuxEvent::MediaSegment(segment) => Some(segment.sample_count),
            _ => None,
        })
        .collect();
    assert_eq!(media_segments, vec![3, 1]);
    assert!(matches!(events.last(), Some(TransmuxEvent::LoadingComplete)));
}

#[test]
fn non_flv_input_is_a_fatal_format_error() {
    let (mut transmuxer, _loader) = transmuxer_with(|_| {});

    transmuxer.on_data_arrival(&[0x42; 64], 0);
    let events = drain(&mut transmuxer);
    assert!(matches!(
        events.as_slice(),
        [TransmuxEvent::Error(transmux::Error::Demux(_))]
    ));

    // later arrivals are swallowed
    transmuxer.on_data_arrival(&[0x42; 64], 64);
    assert!(drain(&mut transmuxer).is_empty());
}

#[test]
fn close_is_idempotent() {
    let (mut transmuxer, _loader) = transmuxer_with(|_| {});
    transmuxer.close();
    transmuxer.close();
    transmuxer.on_data_arrival(&flv_header(0x05), 0);
    assert!(drain(&mut transmuxer).is_empty());
}

#[test]
fn statistics_snapshot_event() {
    let (mut transmuxer, _loader) = transmuxer_with(|_| {});
    let mut stream = flv_header(0x01);
    stream.extend_from_slice(&avc_sequence_header_tag());
    transmuxer.on_data_arrival(&stream, 0);
    transmuxer.on_content_length_known(1_000_000);
    drain(&mut transmuxer);

    transmuxer.tick_statistics();
    let events = drain(&mut transmuxer);
    let TransmuxEvent::Statistics(info) = &events[0] else {
        panic!("expected statistics event");
    };
    assert!(info.has_total_length);
    assert_eq!(info.total_length, Some(1_000_000));
    assert!(info.total_received > 0);
}
