//! Integration tests driving the FLV demuxer with synthetic streams.

use transmux_core::{AudioSample, MediaInfo, Result as CoreResult, TrackMetadata, VideoSample};
use transmux_core::{AudioTrack, VideoTrack};
use transmux_flv::{AacPromotion, DemuxSink, DemuxerConfig, FlvDemuxer};

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
    out.extend_from_slice(&[0, 0, 0]); // stream id
    out.extend_from_slice(body);
    out.extend_from_slice(&((11 + body.len()) as u32).to_be_bytes());
    out
}

fn avc_sequence_header_tag() -> Vec<u8> {
    let mut body = vec![0x17, 0x00, 0x00, 0x00, 0x00];
    body.extend_from_slice(&avcc());
    tag(9, 0, &body)
}

fn avc_nalu_tag(timestamp: u32, keyframe: bool, cts: u32, payload: &[u8]) -> Vec<u8> {
    let frame_byte = if keyframe { 0x17 } else { 0x27 };
    let mut body = vec![frame_byte, 0x01];
    body.extend_from_slice(&[(cts >> 16) as u8, (cts >> 8) as u8, cts as u8]);
    // one NALU: IDR (5) for keyframes, non-IDR slice (1) otherwise
    let nal_header = if keyframe { 0x65 } else { 0x41 };
    body.extend_from_slice(&((payload.len() + 1) as u32).to_be_bytes());
    body.push(nal_header);
    body.extend_from_slice(payload);
    tag(9, timestamp, &body)
}

fn aac_sequence_header_tag(asc: &[u8]) -> Vec<u8> {
    let mut body = vec![0xAF, 0x00];
    body.extend_from_slice(asc);
    tag(8, 0, &body)
}

fn aac_frame_tag(timestamp: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0xAF, 0x01];
    body.extend_from_slice(payload);
    tag(8, timestamp, &body)
}

fn amf_string_value(s: &str) -> Vec<u8> {
    let mut out = vec![0x02];
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    out
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
    let mut body = amf_string_value("onMetaData");
    body.push(0x08); // ECMA array
    body.extend_from_slice(&(props.len() as u32).to_be_bytes());
    for (name, value) in props {
        body.extend_from_slice(&amf_prop(name, value));
    }
    body.extend_from_slice(&[0, 0, 0x09]);
    tag(18, 0, &body)
}

fn basic_metadata_tag() -> Vec<u8> {
    script_tag(&[
        ("duration", amf_number(10.0)),
        ("width", amf_number(640.0)),
        ("height", amf_number(360.0)),
        ("framerate", amf_number(30.0)),
    ])
}

// ============================================================================
// Test sink
// ============================================================================

#[derive(Default)]
struct TestSink {
    metadata: Vec<TrackMetadata>,
    media_info: Vec<MediaInfo>,
    audio_samples: Vec<AudioSample>,
    video_samples: Vec<VideoSample>,
    batches: usize,
}

impl DemuxSink for TestSink {
    fn on_track_metadata(&mut self, metadata: TrackMetadata) -> CoreResult<()> {
        self.metadata.push(metadata);
        Ok(())
    }

    fn on_media_info(&mut self, info: &MediaInfo) {
        self.media_info.push(info.clone());
    }

    fn on_data_available(
        &mut self,
        audio: &mut AudioTrack,
        video: &mut VideoTrack,
    ) -> CoreResult<()> {
        self.batches += 1;
        self.audio_samples.extend(audio.samples.drain(..));
        self.video_samples.extend(video.samples.drain(..));
        audio.clear();
        video.clear();
        Ok(())
    }
}

fn demuxer_for(stream: &[u8], promotion: AacPromotion) -> FlvDemuxer {
    let probe = FlvDemuxer::probe(stream).expect("valid FLV header");
    FlvDemuxer::new(
        probe,
        DemuxerConfig {
            promotion,
            ..DemuxerConfig::default()
        },
    )
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn parses_header_and_sequence_headers_into_metadata() {
    let mut stream = flv_header(0x05);
    stream.extend_from_slice(&basic_metadata_tag());
    stream.extend_from_slice(&avc_sequence_header_tag());
    stream.extend_from_slice(&aac_sequence_header_tag(&[0x12, 0x10]));

    let mut demuxer = demuxer_for(&stream, AacPromotion::PreferHe);
    let mut sink = TestSink::default();
    let consumed = demuxer.parse_chunks(&stream, 0, &mut sink).unwrap();
    assert_eq!(consumed, stream.len());

    assert_eq!(sink.metadata.len(), 2);
    let video = sink
        .metadata
        .iter()
        .find_map(|m| match m {
            TrackMetadata::Video(v) => Some(v),
            _ => None,
        })
        .expect("video metadata");
    assert_eq!(video.codec, "avc1.42001f");
    assert_eq!(video.codec_width, 640);
    assert_eq!(video.codec_height, 360);
    assert_eq!(video.duration, 10_000);
    assert!((video.ref_sample_duration - 1000.0 / 30.0).abs() < 1e-6);

    let audio = sink
        .metadata
        .iter()
        .find_map(|m| match m {
            TrackMetadata::Audio(a) => Some(a),
            _ => None,
        })
        .expect("audio metadata");
    assert_eq!(audio.codec, "mp4a.40.5");
    assert_eq!(audio.original_codec, "mp4a.40.2");
    assert_eq!(audio.audio_sample_rate, 44100);
    assert_eq!(audio.channel_count, 2);

    // media info dispatched exactly once, with the combined mime type
    assert_eq!(sink.media_info.len(), 1);
    let info = &sink.media_info[0];
    assert_eq!(
        info.mime_type.as_deref(),
        Some("video/x-flv; codecs=\"avc1.42001f,mp4a.40.5\"")
    );
    assert_eq!(info.duration, Some(10_000));
    assert!(info.is_complete());
}

#[test]
fn queues_samples_and_dispatches_batches() {
    let mut stream = flv_header(0x05);
    stream.extend_from_slice(&avc_sequence_header_tag());
    stream.extend_from_slice(&aac_sequence_header_tag(&[0x12, 0x10]));
    stream.extend_from_slice(&avc_nalu_tag(0, true, 0, &[0xAA; 32]));
    stream.extend_from_slice(&aac_frame_tag(0, &[0xBB; 16]));
    stream.extend_from_slice(&avc_nalu_tag(33, false, 33, &[0xCC; 24]));
    stream.extend_from_slice(&aac_frame_tag(23, &[0xDD; 16]));

    let mut demuxer = demuxer_for(&stream, AacPromotion::None);
    let mut sink = TestSink::default();
    let consumed = demuxer.parse_chunks(&stream, 0, &mut sink).unwrap();
    assert_eq!(consumed, stream.len());

    assert_eq!(sink.batches, 1);
    assert_eq!(sink.audio_samples.len(), 2);
    assert_eq!(sink.video_samples.len(), 2);

    // original_dts equals the tag timestamp
    assert_eq!(sink.audio_samples[1].original_dts, 23);
    assert_eq!(sink.video_samples[1].original_dts, 33);
    assert_eq!(sink.video_samples[1].cts, 33);
    assert_eq!(sink.video_samples[1].pts, 66);

    assert!(sink.video_samples[0].is_keyframe);
    assert!(sink.video_samples[0].file_position.is_some());
    assert!(!sink.video_samples[1].is_keyframe);

    // NALU payloads keep their 4-byte length prefix
    let unit = &sink.video_samples[0].units[0];
    assert_eq!(unit.data.len(), 4 + 1 + 32);
    assert_eq!(&unit.data[0..4], &(33u32).to_be_bytes());
    assert_eq!(unit.unit_type, 5);
}

#[test]
fn partial_tag_is_not_consumed() {
    let mut stream = flv_header(0x05);
    stream.extend_from_slice(&avc_sequence_header_tag());
    let header_len = stream.len();
    stream.extend_from_slice(&avc_nalu_tag(0, true, 0, &[0xAA; 64]));

    // present everything except the last 10 bytes of the final tag
    let truncated = &stream[..stream.len() - 10];

    let mut demuxer = demuxer_for(&stream, AacPromotion::None);
    let mut sink = TestSink::default();
    let consumed = demuxer.parse_chunks(truncated, 0, &mut sink).unwrap();
    assert_eq!(consumed, header_len);

    // re-present the retained remainder: the tag parses now
    let consumed2 = demuxer
        .parse_chunks(&stream[header_len..], header_len as u64, &mut sink)
        .unwrap();
    assert_eq!(consumed2, stream.len() - header_len);
}

#[test]
fn single_byte_chunk_consumes_nothing() {
    let stream = flv_header(0x05);
    let mut demuxer = demuxer_for(&stream, AacPromotion::None);
    let mut sink = TestSink::default();
    assert_eq!(demuxer.parse_chunks(&stream[..1], 0, &mut sink).unwrap(), 0);
}

#[test]
fn unknown_tag_types_are_skipped() {
    let mut stream = flv_header(0x05);
    stream.extend_from_slice(&tag(15, 0, &[0u8; 8])); // bogus tag type
    stream.extend_from_slice(&avc_sequence_header_tag());

    let mut demuxer = demuxer_for(&stream, AacPromotion::None);
    let mut sink = TestSink::default();
    let consumed = demuxer.parse_chunks(&stream, 0, &mut sink).unwrap();
    assert_eq!(consumed, stream.len());
    assert_eq!(sink.metadata.len(), 1);
}

#[test]
fn keyframes_index_strips_sequence_header_entry() {
    let keyframes = {
        let mut obj = vec![0x03]; // AMF object
        obj.extend_from_slice(&amf_prop(
            "times",
            &amf_strict_array(&[
                amf_number(0.0),
                amf_number(0.0),
                amf_number(2.0),
                amf_number(4.0),
                amf_number(6.0),
            ]),
        ));
        obj.extend_from_slice(&amf_prop(
            "filepositions",
            &amf_strict_array(&[
                amf_number(5.0),
                amf_number(9.0),
                amf_number(50_000.0),
                amf_number(100_000.0),
                amf_number(150_000.0),
            ]),
        ));
        obj.extend_from_slice(&[0, 0, 0x09]);
        obj
    };

    let mut stream = flv_header(0x05);
    stream.extend_from_slice(&script_tag(&[
        ("duration", amf_number(10.0)),
        ("keyframes", keyframes),
    ]));
    stream.extend_from_slice(&avc_sequence_header_tag());
    stream.extend_from_slice(&aac_sequence_header_tag(&[0x12, 0x10]));

    let mut demuxer = demuxer_for(&stream, AacPromotion::None);
    let mut sink = TestSink::default();
    demuxer.parse_chunks(&stream, 0, &mut sink).unwrap();

    let info = demuxer.media_info();
    let index = info.keyframes_index.as_ref().expect("keyframes index");
    assert_eq!(index.times, vec![0, 2000, 4000, 6000]);
    assert_eq!(index.file_positions, vec![9, 50_000, 100_000, 150_000]);

    let hit = info.get_nearest_keyframe(3000).unwrap();
    assert_eq!(hit.index, 1);
    assert_eq!(hit.milliseconds, 2000);
    assert_eq!(hit.file_position, 50_000);
}

#[test]
fn unsupported_video_codec_is_an_error() {
    let mut stream = flv_header(0x01);
    // codec id 2 = Sorenson H.263
    stream.extend_from_slice(&tag(9, 0, &[0x12, 0x00, 0x00]));

    let mut demuxer = demuxer_for(&stream, AacPromotion::None);
    let mut sink = TestSink::default();
    let err = demuxer.parse_chunks(&stream, 0, &mut sink).unwrap_err();
    assert!(matches!(
        err,
        transmux_core::Error::Demux(transmux_core::DemuxError::CodecUnsupported(_))
    ));
}

#[test]
fn oversized_nalu_aborts_tag_but_keeps_stream_alive() {
    let mut stream = flv_header(0x01);
    stream.extend_from_slice(&avc_sequence_header_tag());

    // NALU declaring more bytes than the tag holds
    let mut body = vec![0x17, 0x01, 0x00, 0x00, 0x00];
    body.extend_from_slice(&1000u32.to_be_bytes());
    body.extend_from_slice(&[0x65, 0xAA, 0xBB]);
    stream.extend_from_slice(&tag(9, 0, &body));
    stream.extend_from_slice(&avc_nalu_tag(33, true, 0, &[0xAA; 8]));

    let mut demuxer = demuxer_for(&stream, AacPromotion::None);
    let mut sink = TestSink::default();
    let consumed = demuxer.parse_chunks(&stream, 0, &mut sink).unwrap();
    assert_eq!(consumed, stream.len());
    // only the well-formed tag produced a sample
    assert_eq!(sink.video_samples.len(), 1);
    assert_eq!(sink.video_samples[0].original_dts, 33);
}

#[test]
fn mp3_stream_metadata_from_first_frame() {
    // MPEG-1 Layer III 44.1 kHz stereo frame header + a little payload
    let mut frame = vec![0xFF, 0xFB, 0x90, 0x00];
    frame.extend_from_slice(&[0u8; 16]);

    let mut body = vec![0x2F]; // MP3, 44.1 kHz, 16-bit, stereo
    body.extend_from_slice(&frame);

    let mut stream = flv_header(0x04);
    stream.extend_from_slice(&tag(8, 0, &body));
    // a second frame re-arms the dispatch flag the metadata emission cleared
    stream.extend_from_slice(&tag(8, 26, &body));

    let mut demuxer = demuxer_for(&stream, AacPromotion::None);
    let mut sink = TestSink::default();
    demuxer.parse_chunks(&stream, 0, &mut sink).unwrap();

    let audio = sink
        .metadata
        .iter()
        .find_map(|m| match m {
            TrackMetadata::Audio(a) => Some(a),
            _ => None,
        })
        .expect("audio metadata");
    assert_eq!(audio.codec, "mp3");
    assert_eq!(audio.audio_sample_rate, 44100);
    assert_eq!(audio.channel_count, 2);
    assert!((audio.ref_sample_duration - 1152.0 * 1000.0 / 44100.0).abs() < 1e-6);

    // the frame that carried the header is also queued as a sample
    assert_eq!(sink.audio_samples.len(), 2);
    assert_eq!(sink.audio_samples[0].unit, frame);
    assert_eq!(sink.audio_samples[1].original_dts, 26);
}
