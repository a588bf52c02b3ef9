//! Push-based FLV demuxer.
//!
//! `parse_chunks` consumes as many whole tag records as the provided slice
//! holds and reports the number of bytes it absorbed; the I/O controller
//! keeps the remainder in its stash until more data arrives. Samples are
//! queued into per-track batches and handed to the sink once initial track
//! metadata for every declared track has been dispatched.

use std::collections::HashMap;

use tracing::{debug, warn};

use transmux_core::{
    AudioMetadata, AudioSample, AudioTrack, FrameRate, KeyframesIndex, MediaDataSource, MediaInfo,
    NaluRecord, Result as CoreResult, SampleFlags, TrackMetadata, TransmuxConfig, VideoMetadata,
    VideoSample, VideoTrack, TIMESCALE,
};

use crate::amf::{self, AmfValue};
use crate::audio::{
    parse_audio_specific_config, parse_mp3_header, AacPromotion, AudioTagHeader, SOUND_FORMAT_AAC,
};
use crate::error::FlvError;
use crate::probe::{probe, FlvProbe};
use crate::tag::{read_u24, read_u32, TagHeader, TagType, PREV_TAG_SIZE_LEN, TAG_HEADER_SIZE};
use crate::video::{composition_time, AvcConfig, AvcPacketType, FrameType, CODEC_ID_AVC};

/// Receiver for demuxer output.
///
/// The demuxer borrows the sink for the duration of one `parse_chunks` call;
/// implementations must not retain references past the call.
pub trait DemuxSink {
    /// First-time (or changed) codec configuration for a track.
    fn on_track_metadata(&mut self, metadata: TrackMetadata) -> CoreResult<()>;

    /// The aggregated media info became complete. Called at most once.
    fn on_media_info(&mut self, info: &MediaInfo);

    /// Raw `onMetaData` values, for consumers that surface them.
    fn on_metadata_arrived(&mut self, _values: &HashMap<String, AmfValue>) {}

    /// Samples are ready to be drained from the track batches.
    fn on_data_available(
        &mut self,
        audio: &mut AudioTrack,
        video: &mut VideoTrack,
    ) -> CoreResult<()>;
}

/// Demuxer-relevant configuration, extracted from the media source
/// description and the pipeline config.
#[derive(Debug, Clone)]
pub struct DemuxerConfig {
    /// Audio-presence override from the media source.
    pub has_audio_override: Option<bool>,
    /// Video-presence override from the media source.
    pub has_video_override: Option<bool>,
    /// Duration override in milliseconds from the media source.
    pub duration_ms: Option<u64>,
    /// AAC codec promotion policy.
    pub promotion: AacPromotion,
    /// Substitute frame rate for streams without a usable one.
    pub reference_frame_rate: f64,
}

impl DemuxerConfig {
    /// Build from the media source and pipeline configuration.
    pub fn new(source: &MediaDataSource, config: &TransmuxConfig) -> Self {
        let promotion = if config.always_lc_aac {
            AacPromotion::AlwaysLc
        } else if config.prefer_he_aac {
            AacPromotion::PreferHe
        } else {
            AacPromotion::None
        };
        Self {
            has_audio_override: source.has_audio,
            has_video_override: source.has_video,
            duration_ms: source.duration,
            promotion,
            reference_frame_rate: config.reference_frame_rate,
        }
    }
}

impl Default for DemuxerConfig {
    fn default() -> Self {
        Self {
            has_audio_override: None,
            has_video_override: None,
            duration_ms: None,
            promotion: AacPromotion::None,
            reference_frame_rate: 23.976,
        }
    }
}

/// Stateful FLV tag-stream parser.
pub struct FlvDemuxer {
    config: DemuxerConfig,

    media_info: MediaInfo,
    media_info_dispatched: bool,
    metadata: Option<HashMap<String, AmfValue>>,

    first_parse: bool,
    data_offset: usize,
    has_audio: bool,
    has_video: bool,
    audio_initial_metadata_dispatched: bool,
    video_initial_metadata_dispatched: bool,

    audio_metadata: Option<AudioMetadata>,
    video_metadata: Option<VideoMetadata>,

    nalu_length_size: u8,
    timestamp_base: i64,
    duration: i64,
    duration_overridden: bool,
    reference_frame_rate: FrameRate,

    audio_track: AudioTrack,
    video_track: VideoTrack,
    dispatch: bool,
}

impl FlvDemuxer {
    /// Validate the first bytes of a stream as an FLV header.
    pub fn probe(data: &[u8]) -> Option<FlvProbe> {
        probe(data)
    }

    /// Create a demuxer for a probed stream.
    pub fn new(probe_data: FlvProbe, config: DemuxerConfig) -> Self {
        let has_audio = config.has_audio_override.unwrap_or(probe_data.has_audio);
        let has_video = config.has_video_override.unwrap_or(probe_data.has_video);

        let (duration, duration_overridden) = match config.duration_ms {
            Some(ms) => (ms as i64, true),
            None => (0, false),
        };

        let mut media_info = MediaInfo::new();
        media_info.has_audio = Some(has_audio);
        media_info.has_video = Some(has_video);
        if duration_overridden {
            media_info.duration = Some(duration as u64);
        }

        let fps = config.reference_frame_rate;
        let reference_frame_rate = FrameRate {
            fixed: true,
            fps,
            fps_num: (fps * 1000.0).round() as u32,
            fps_den: 1000,
        };

        Self {
            config,
            media_info,
            media_info_dispatched: false,
            metadata: None,
            first_parse: true,
            data_offset: probe_data.data_offset,
            has_audio,
            has_video,
            audio_initial_metadata_dispatched: false,
            video_initial_metadata_dispatched: false,
            audio_metadata: None,
            video_metadata: None,
            nalu_length_size: 4,
            timestamp_base: 0,
            duration,
            duration_overridden,
            reference_frame_rate,
            audio_track: AudioTrack::new(),
            video_track: VideoTrack::new(),
            dispatch: false,
        }
    }

    /// The aggregated media info in its current state.
    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// Timestamp base added to every tag timestamp.
    pub fn timestamp_base(&self) -> i64 {
        self.timestamp_base
    }

    /// Override the timestamp base (multipart playlists).
    pub fn set_timestamp_base(&mut self, base: i64) {
        self.timestamp_base = base;
    }

    fn is_initial_metadata_dispatched(&self) -> bool {
        match (self.has_audio, self.has_video) {
            (true, true) => {
                self.audio_initial_metadata_dispatched && self.video_initial_metadata_dispatched
            }
            (true, false) => self.audio_initial_metadata_dispatched,
            (false, true) => self.video_initial_metadata_dispatched,
            (false, false) => false,
        }
    }

    /// Parse as many whole tags as `chunk` holds.
    ///
    /// `byte_start` is the absolute source offset of `chunk[0]`. Returns the
    /// number of bytes consumed; the caller must re-present the remainder
    /// together with subsequent data.
    pub fn parse_chunks(
        &mut self,
        chunk: &[u8],
        byte_start: u64,
        sink: &mut dyn DemuxSink,
    ) -> CoreResult<usize> {
        let mut offset = 0usize;

        if byte_start == 0 {
            // chunk carries the FLV header; needs header + PrevTagSize0 + a
            // little lookahead before anything can be consumed
            if chunk.len() > 13 {
                let probe_data = probe(chunk).ok_or(FlvError::InvalidHeader)?;
                offset = probe_data.data_offset;
            } else {
                return Ok(0);
            }
        }

        if self.first_parse {
            if offset + PREV_TAG_SIZE_LEN > chunk.len() {
                return Ok(0);
            }
            self.first_parse = false;
            if byte_start + offset as u64 != self.data_offset as u64 {
                warn!("First time parsing but chunk byte_start invalid!");
            }
            let prev_tag_size0 = read_u32(chunk, offset);
            if prev_tag_size0 != 0 {
                warn!(prev_tag_size0, "PrevTagSize0 != 0 !!!");
            }
            offset += PREV_TAG_SIZE_LEN;
        }

        while offset < chunk.len() {
            self.dispatch = true;

            if offset + TAG_HEADER_SIZE + PREV_TAG_SIZE_LEN > chunk.len() {
                // data not enough for parsing an flv tag
                break;
            }

            let data_size = TagHeader::raw_data_size(&chunk[offset..]);
            let record_size = TAG_HEADER_SIZE + data_size + PREV_TAG_SIZE_LEN;
            if offset + record_size > chunk.len() {
                // data not enough for the tag body
                break;
            }

            let Some(header) = TagHeader::parse(&chunk[offset..]) else {
                warn!(
                    tag_type = TagHeader::raw_type(&chunk[offset..]),
                    "Unsupported tag type, skipped"
                );
                offset += record_size;
                continue;
            };

            if header.stream_id != 0 {
                warn!("Meet tag which has StreamID != 0!");
            }

            let data_start = offset + TAG_HEADER_SIZE;
            match header.tag_type {
                TagType::Audio => {
                    self.parse_audio_data(chunk, data_start, data_size, header.timestamp, sink)?;
                }
                TagType::Video => {
                    self.parse_video_data(
                        chunk,
                        data_start,
                        data_size,
                        header.timestamp,
                        byte_start + offset as u64,
                        sink,
                    )?;
                }
                TagType::ScriptData => {
                    self.parse_script_data(chunk, data_start, data_size, sink);
                }
            }

            let prev_tag_size = read_u32(chunk, offset + TAG_HEADER_SIZE + data_size);
            if prev_tag_size as usize != TAG_HEADER_SIZE + data_size {
                warn!(prev_tag_size, "Invalid PrevTagSize");
            }

            offset += record_size;
        }

        // dispatch queued samples once every declared track has its config
        if self.is_initial_metadata_dispatched()
            && self.dispatch
            && (!self.audio_track.is_empty() || !self.video_track.is_empty())
        {
            sink.on_data_available(&mut self.audio_track, &mut self.video_track)?;
        }

        Ok(offset)
    }

    // ========================================================================
    // Script data
    // ========================================================================

    fn parse_script_data(
        &mut self,
        chunk: &[u8],
        data_start: usize,
        data_size: usize,
        sink: &mut dyn DemuxSink,
    ) {
        let data = &chunk[data_start..data_start + data_size];
        let (name, value) = match amf::parse_script_data(data) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "Error occurred while parsing AMF script data");
                return;
            }
        };

        if name != "onMetaData" {
            debug!(%name, "Ignoring script tag");
            return;
        }
        let Some(object) = value.as_object() else {
            warn!("onMetaData value is not an object");
            return;
        };
        if self.metadata.is_some() {
            warn!("Found another onMetaData tag!");
        }

        sink.on_metadata_arrived(object);
        self.metadata = Some(object.clone());
        self.media_info.metadata_present = true;

        self.apply_on_metadata(object);

        self.maybe_dispatch_media_info(sink);
    }

    fn apply_on_metadata(&mut self, object: &HashMap<String, AmfValue>) {
        if let Some(value) = object.get("hasAudio") {
            match value.as_boolean() {
                Some(has_audio) if self.config.has_audio_override.is_none() => {
                    self.has_audio = has_audio;
                    self.media_info.has_audio = Some(has_audio);
                }
                Some(_) => {}
                None => warn!("onMetaData.hasAudio has unexpected type"),
            }
        }
        if let Some(value) = object.get("hasVideo") {
            match value.as_boolean() {
                Some(has_video) if self.config.has_video_override.is_none() => {
                    self.has_video = has_video;
                    self.media_info.has_video = Some(has_video);
                }
                Some(_) => {}
                None => warn!("onMetaData.hasVideo has unexpected type"),
            }
        }

        for (key, slot) in [
            ("audiodatarate", &mut self.media_info.audio_data_rate),
            ("videodatarate", &mut self.media_info.video_data_rate),
        ] {
            if let Some(value) = object.get(key) {
                match value.as_number() {
                    Some(n) => *slot = Some(n),
                    None => warn!(key, "onMetaData field has unexpected type"),
                }
            }
        }
        for (key, slot) in [
            ("width", &mut self.media_info.width),
            ("height", &mut self.media_info.height),
        ] {
            if let Some(value) = object.get(key) {
                match value.as_number() {
                    Some(n) => *slot = Some(n as u32),
                    None => warn!(key, "onMetaData field has unexpected type"),
                }
            }
        }

        if let Some(value) = object.get("duration") {
            if !self.duration_overridden {
                match value.as_number() {
                    Some(seconds) => {
                        self.duration = (seconds * TIMESCALE as f64).floor() as i64;
                        self.media_info.duration = Some(self.duration as u64);
                    }
                    None => warn!("onMetaData.duration has unexpected type"),
                }
            }
        } else if self.duration_overridden {
            self.media_info.duration = Some(self.duration as u64);
        }

        if let Some(value) = object.get("framerate") {
            match value.as_number() {
                Some(fps) if fps > 0.0 => self.media_info.fps = Some(fps),
                Some(_) => {}
                None => warn!("onMetaData.framerate has unexpected type"),
            }
        }

        if let Some(value) = object.get("keyframes") {
            match value.as_object() {
                Some(keyframes) => {
                    let index = self.parse_keyframes_index(keyframes);
                    if !index.is_empty() {
                        self.media_info.keyframes_index = Some(index);
                    }
                }
                None => warn!("onMetaData.keyframes has unexpected type"),
            }
        }
    }

    fn parse_keyframes_index(&self, keyframes: &HashMap<String, AmfValue>) -> KeyframesIndex {
        let mut index = KeyframesIndex::default();
        let (Some(times), Some(positions)) = (
            keyframes.get("times").and_then(AmfValue::as_array),
            keyframes.get("filepositions").and_then(AmfValue::as_array),
        ) else {
            warn!("onMetaData.keyframes is missing times/filepositions");
            return index;
        };

        // entry 0 describes the AVC sequence header, not a real keyframe
        for i in 1..times.len().min(positions.len()) {
            let (Some(time), Some(position)) = (times[i].as_number(), positions[i].as_number())
            else {
                warn!(entry = i, "Malformed keyframes entry");
                continue;
            };
            let milliseconds = self.timestamp_base + (time * 1000.0).floor() as i64;
            index.times.push(milliseconds.max(0) as u64);
            index.file_positions.push(position as u64);
        }
        index
    }

    // ========================================================================
    // Audio tags
    // ========================================================================

    fn parse_audio_data(
        &mut self,
        chunk: &[u8],
        data_start: usize,
        data_size: usize,
        timestamp: i64,
        sink: &mut dyn DemuxSink,
    ) -> CoreResult<()> {
        if data_size <= 1 {
            warn!("Flv: Invalid audio packet, missing SoundData payload!");
            return Ok(());
        }
        if self.config.has_audio_override == Some(false) {
            // audio stripped by the consumer
            return Ok(());
        }

        let data = &chunk[data_start..data_start + data_size];
        let header = AudioTagHeader::parse(data[0])?;

        if self.audio_metadata.is_none() {
            if !self.has_audio && self.config.has_audio_override.is_none() {
                // the header flags lied; the stream does carry audio
                self.has_audio = true;
                self.media_info.has_audio = Some(true);
            }
            self.audio_metadata = Some(AudioMetadata {
                id: self.audio_track.id,
                timescale: TIMESCALE,
                duration: self.duration,
                codec: String::new(),
                original_codec: String::new(),
                audio_sample_rate: header.sound_rate,
                channel_count: 0,
                config: Vec::new(),
                ref_sample_duration: 0.0,
            });
        }

        if header.sound_format == SOUND_FORMAT_AAC {
            if data_size <= 2 {
                warn!("Flv: Invalid AAC packet, missing AACPacketType or/and Data!");
                return Ok(());
            }
            match data[1] {
                0 => self.parse_aac_sequence_header(&data[2..], sink)?,
                1 => {
                    let dts = self.timestamp_base + timestamp;
                    self.audio_track.push(AudioSample::new(dts, data[2..].to_vec()));
                }
                other => {
                    return Err(transmux_core::Error::format(format!(
                        "Flv: Unsupported AAC data type {other}"
                    )));
                }
            }
        } else {
            // MP3: metadata comes from the first frame's MPEG header
            if self
                .audio_metadata
                .as_ref()
                .is_some_and(|meta| meta.codec.is_empty())
            {
                let Some(info) = parse_mp3_header(&data[1..]) else {
                    return Ok(());
                };
                let meta = self.audio_metadata.as_mut().expect("created above");
                meta.audio_sample_rate = info.sampling_rate;
                meta.channel_count = info.channel_count;
                meta.codec = info.codec.clone();
                meta.original_codec = info.codec.clone();
                meta.ref_sample_duration = 1152.0 * TIMESCALE as f64 / info.sampling_rate as f64;
                meta.duration = self.duration;

                self.media_info.audio_codec = Some(meta.codec.clone());
                self.media_info.audio_sample_rate = Some(meta.audio_sample_rate);
                self.media_info.audio_channel_count = Some(meta.channel_count);
                self.media_info.audio_data_rate = self
                    .media_info
                    .audio_data_rate
                    .or(Some(info.bit_rate as f64));
                self.update_mime_type();

                self.dispatch_audio_metadata(sink)?;
                self.maybe_dispatch_media_info(sink);
            }

            let dts = self.timestamp_base + timestamp;
            self.audio_track.push(AudioSample::new(dts, data[1..].to_vec()));
        }

        Ok(())
    }

    fn parse_aac_sequence_header(
        &mut self,
        asc: &[u8],
        sink: &mut dyn DemuxSink,
    ) -> CoreResult<()> {
        if self
            .audio_metadata
            .as_ref()
            .is_some_and(|meta| !meta.config.is_empty())
        {
            warn!("Found another AudioSpecificConfig!");
        }

        let aac = parse_audio_specific_config(asc, self.config.promotion)?;
        let meta = self.audio_metadata.as_mut().expect("created by caller");
        meta.audio_sample_rate = aac.sampling_rate;
        meta.channel_count = aac.channel_count;
        meta.codec = aac.codec.clone();
        meta.original_codec = aac.original_codec.clone();
        meta.ref_sample_duration = 1024.0 * TIMESCALE as f64 / aac.sampling_rate as f64;
        meta.config = aac.config.clone();
        meta.duration = self.duration;

        self.media_info.audio_codec = Some(aac.codec);
        self.media_info.audio_sample_rate = Some(meta.audio_sample_rate);
        self.media_info.audio_channel_count = Some(meta.channel_count);
        self.update_mime_type();

        self.dispatch_audio_metadata(sink)?;
        self.maybe_dispatch_media_info(sink);
        Ok(())
    }

    fn dispatch_audio_metadata(&mut self, sink: &mut dyn DemuxSink) -> CoreResult<()> {
        if self.is_initial_metadata_dispatched() {
            // the configuration changed mid-stream: flush what was parsed
            // against the previous configuration first
            if self.dispatch && (!self.audio_track.is_empty() || !self.video_track.is_empty()) {
                sink.on_data_available(&mut self.audio_track, &mut self.video_track)?;
            }
        } else {
            self.audio_initial_metadata_dispatched = true;
        }
        self.dispatch = false;
        let meta = self.audio_metadata.as_ref().expect("set by caller").clone();
        sink.on_track_metadata(TrackMetadata::Audio(meta))
    }

    // ========================================================================
    // Video tags
    // ========================================================================

    fn parse_video_data(
        &mut self,
        chunk: &[u8],
        data_start: usize,
        data_size: usize,
        timestamp: i64,
        tag_position: u64,
        sink: &mut dyn DemuxSink,
    ) -> CoreResult<()> {
        if data_size <= 1 {
            warn!("Flv: Invalid video packet, missing VideoData payload!");
            return Ok(());
        }
        if self.config.has_video_override == Some(false) {
            return Ok(());
        }

        let spec = chunk[data_start];
        let codec_id = spec & 0x0F;
        if codec_id != CODEC_ID_AVC {
            return Err(FlvError::UnsupportedVideoCodec(codec_id).into());
        }
        let frame_type = FrameType::from_u8((spec & 0xF0) >> 4).unwrap_or_else(|| {
            warn!(raw = (spec & 0xF0) >> 4, "Unknown video frame type");
            FrameType::Inter
        });

        self.parse_avc_video_packet(
            &chunk[data_start + 1..data_start + data_size],
            timestamp,
            tag_position,
            frame_type,
            sink,
        )
    }

    fn parse_avc_video_packet(
        &mut self,
        data: &[u8],
        timestamp: i64,
        tag_position: u64,
        frame_type: FrameType,
        sink: &mut dyn DemuxSink,
    ) -> CoreResult<()> {
        if data.len() < 4 {
            warn!("Flv: Invalid AVC packet, missing AVCPacketType or/and CompositionTime");
            return Ok(());
        }

        let packet_type = data[0];
        let cts = composition_time(read_u24(data, 1)) as i64;

        match AvcPacketType::from_u8(packet_type) {
            Some(AvcPacketType::SequenceHeader) => {
                self.parse_avc_decoder_configuration_record(&data[4..], sink)
            }
            Some(AvcPacketType::Nalu) => {
                self.parse_avc_video_data(&data[4..], timestamp, tag_position, frame_type, cts);
                Ok(())
            }
            Some(AvcPacketType::EndOfSequence) => {
                debug!("AVC sequence end");
                Ok(())
            }
            None => Err(transmux_core::Error::format(format!(
                "Flv: Invalid video packet type {packet_type}"
            ))),
        }
    }

    fn parse_avc_decoder_configuration_record(
        &mut self,
        data: &[u8],
        sink: &mut dyn DemuxSink,
    ) -> CoreResult<()> {
        if self
            .video_metadata
            .as_ref()
            .is_some_and(|meta| !meta.avcc.is_empty())
        {
            warn!("Found another AVCDecoderConfigurationRecord!");
        }

        let avc = AvcConfig::parse(data)?;
        self.nalu_length_size = avc.nalu_length_size;

        if self.video_metadata.is_none() && !self.has_video && self.config.has_video_override.is_none()
        {
            self.has_video = true;
            self.media_info.has_video = Some(true);
        }

        let sps = &avc.sps_info;
        let frame_rate = if !sps.frame_rate.fixed || sps.frame_rate.fps_num == 0 {
            self.reference_frame_rate
        } else {
            sps.frame_rate
        };
        let ref_sample_duration =
            TIMESCALE as f64 * frame_rate.fps_den as f64 / frame_rate.fps_num as f64;

        self.video_metadata = Some(VideoMetadata {
            id: self.video_track.id,
            timescale: TIMESCALE,
            duration: self.duration,
            codec: avc.codec.clone(),
            codec_width: sps.codec_size.width,
            codec_height: sps.codec_size.height,
            present_width: sps.present_size.width,
            present_height: sps.present_size.height,
            profile: sps.profile_string.clone(),
            level: sps.level_string.clone(),
            bit_depth: sps.bit_depth,
            chroma_format: match sps.chroma_format {
                420 => 1,
                422 => 2,
                444 => 3,
                _ => 0,
            },
            sar_ratio: sps.sar_ratio,
            frame_rate,
            ref_sample_duration,
            avcc: avc.raw.clone(),
        });

        self.media_info.video_codec = Some(avc.codec);
        self.media_info.width = Some(sps.codec_size.width);
        self.media_info.height = Some(sps.codec_size.height);
        self.media_info.fps = Some(frame_rate.fps);
        self.media_info.profile = Some(sps.profile_string.clone());
        self.media_info.level = Some(sps.level_string.clone());
        self.media_info.chroma_format = Some(sps.chroma_format_string.clone());
        self.media_info.sar_num = Some(sps.sar_ratio.0);
        self.media_info.sar_den = Some(sps.sar_ratio.1);
        self.update_mime_type();

        self.dispatch_video_metadata(sink)?;
        self.maybe_dispatch_media_info(sink);
        Ok(())
    }

    fn dispatch_video_metadata(&mut self, sink: &mut dyn DemuxSink) -> CoreResult<()> {
        if self.is_initial_metadata_dispatched() {
            if self.dispatch && (!self.audio_track.is_empty() || !self.video_track.is_empty()) {
                sink.on_data_available(&mut self.audio_track, &mut self.video_track)?;
            }
        } else {
            self.video_initial_metadata_dispatched = true;
        }
        self.dispatch = false;
        let meta = self.video_metadata.as_ref().expect("set by caller").clone();
        sink.on_track_metadata(TrackMetadata::Video(meta))
    }

    fn parse_avc_video_data(
        &mut self,
        data: &[u8],
        timestamp: i64,
        tag_position: u64,
        frame_type: FrameType,
        cts: i64,
    ) {
        let length_size = self.nalu_length_size as usize;
        let data_size = data.len();
        let dts = self.timestamp_base + timestamp;

        let mut units: Vec<NaluRecord> = Vec::with_capacity(4);
        let mut total_length = 0usize;
        let mut keyframe = frame_type.is_keyframe();

        let mut offset = 0usize;
        while offset < data_size {
            if offset + 4 >= data_size {
                warn!(
                    timestamp,
                    offset, data_size, "Malformed Nalu near timestamp, offset = {offset}"
                );
                break;
            }
            let nalu_size = if length_size == 3 {
                read_u24(data, offset) as usize
            } else {
                read_u32(data, offset) as usize
            };
            if nalu_size > data_size - length_size - offset {
                warn!(timestamp, "Malformed Nalus near timestamp, NaluSize > DataSize!");
                return;
            }

            let unit_type = data[offset + length_size] & 0x1F;
            if unit_type == 5 {
                // IDR
                keyframe = true;
            }

            let unit = data[offset..offset + length_size + nalu_size].to_vec();
            total_length += unit.len();
            units.push(NaluRecord {
                unit_type,
                data: unit,
            });
            offset += length_size + nalu_size;
        }

        if units.is_empty() {
            return;
        }

        self.video_track.push(VideoSample {
            dts,
            pts: dts + cts,
            cts,
            duration: 0,
            size: total_length,
            is_keyframe: keyframe,
            original_dts: dts,
            units,
            flags: if keyframe {
                SampleFlags::sync()
            } else {
                SampleFlags::non_sync()
            },
            file_position: keyframe.then_some(tag_position),
        });
    }

    // ========================================================================
    // MediaInfo maintenance
    // ========================================================================

    fn update_mime_type(&mut self) {
        let mut codecs: Vec<String> = Vec::with_capacity(2);
        if self.has_video {
            match &self.media_info.video_codec {
                Some(codec) => codecs.push(codec.clone()),
                None => return,
            }
        }
        if self.has_audio {
            match &self.media_info.audio_codec {
                Some(codec) => codecs.push(codec.clone()),
                None => return,
            }
        }
        self.media_info.mime_type = Some(format!("video/x-flv; codecs=\"{}\"", codecs.join(",")));
    }

    fn maybe_dispatch_media_info(&mut self, sink: &mut dyn DemuxSink) {
        if !self.media_info_dispatched && self.media_info.is_complete() {
            self.media_info_dispatched = true;
            sink.on_media_info(&self.media_info);
        }
    }
}
