//! fMP4 remuxer.
//!
//! Consumes the demuxer's per-track sample batches, corrects decode
//! timestamps against a shared base, interpolates per-sample durations, and
//! emits `ftyp`+`moov` initialization segments and `moof`+`mdat` media
//! segments. The trailing sample of each batch is stashed until the next
//! batch so its duration can be computed exactly.

use bytes::Bytes;
use tracing::{debug, warn};

use transmux_core::{
    AudioSample, AudioTrack, InitSegmentData, MediaSegmentData, MediaSegmentInfo,
    MediaSegmentInfoList, SampleFlags, SampleInfo, TrackKind, TrackMetadata, TransmuxConfig,
    VideoTrack,
};

use crate::boxes::{self, FragmentHeader, Mp4Sample};
use crate::silent::silent_frame;

/// Receiver for emitted segments.
pub trait SegmentSink {
    /// A track's initialization segment. Emitted once per metadata dispatch,
    /// always before that track's first media segment.
    fn on_init_segment(&mut self, kind: TrackKind, segment: InitSegmentData);

    /// One media segment for a track.
    fn on_media_segment(&mut self, kind: TrackKind, segment: MediaSegmentData);
}

/// Remuxer-relevant configuration, extracted from the pipeline config.
#[derive(Debug, Clone)]
pub struct RemuxerConfig {
    /// Live mode: skip the segment-info bookkeeping used for seeking.
    pub is_live: bool,
    /// Insert silent AAC frames over large timestamp gaps.
    pub fix_audio_timestamp_gap: bool,
    /// Flag the first sample of each video segment as an IDR.
    pub force_first_idr: bool,
    /// Prepend a silent audio frame after keyframe seeks.
    pub fill_silent_after_seek: bool,
    /// Emit MP3 as a raw MPEG stream instead of boxed segments.
    pub mp3_use_mpeg_audio: bool,
}

impl RemuxerConfig {
    /// Build from the pipeline configuration.
    pub fn new(config: &TransmuxConfig) -> Self {
        Self {
            is_live: config.is_live,
            fix_audio_timestamp_gap: config.fix_audio_timestamp_gap,
            force_first_idr: config.force_first_idr,
            fill_silent_after_seek: config.fill_silent_after_seek,
            mp3_use_mpeg_audio: config.mp3_use_mpeg_audio,
        }
    }
}

impl Default for RemuxerConfig {
    fn default() -> Self {
        Self::new(&TransmuxConfig::default())
    }
}

// an output sample with its payload, pre-box-generation
struct OutAudioSample {
    dts: i64,
    duration: i64,
    original_dts: i64,
    unit: Vec<u8>,
    flags: SampleFlags,
}

struct OutVideoSample {
    dts: i64,
    pts: i64,
    cts: i64,
    duration: i64,
    original_dts: i64,
    size: usize,
    units: Vec<transmux_core::NaluRecord>,
    flags: SampleFlags,
}

fn audio_sample_flags() -> SampleFlags {
    SampleFlags {
        is_leading: 0,
        depends_on: 1,
        is_depended_on: 0,
        has_redundancy: 0,
        is_non_sync: 0,
    }
}

/// Correction derived from the segment-info list when the running `nextDts`
/// is unknown (start of stream, or after `insert_discontinuity`).
fn dts_correction_from_list(list: &MediaSegmentInfoList, first_sample_original_dts: i64) -> i64 {
    match list.get_last_sample_before(first_sample_original_dts) {
        Some(last_sample) => {
            let mut distance =
                first_sample_original_dts - (last_sample.original_dts + last_sample.duration);
            if distance <= 3 {
                // timestamps this close are continuous in practice
                distance = 0;
            }
            let expected_dts = last_sample.dts + last_sample.duration + distance;
            first_sample_original_dts - expected_dts
        }
        None => 0,
    }
}

/// FLV-sample to fMP4-segment remuxer.
pub struct Mp4Remuxer {
    config: RemuxerConfig,

    dts_base: Option<i64>,
    audio_next_dts: Option<i64>,
    video_next_dts: Option<i64>,

    audio_stashed_last_sample: Option<AudioSample>,
    video_stashed_last_sample: Option<transmux_core::VideoSample>,

    audio_meta: Option<transmux_core::AudioMetadata>,
    video_meta: Option<transmux_core::VideoMetadata>,

    audio_segment_info_list: MediaSegmentInfoList,
    video_segment_info_list: MediaSegmentInfoList,

    audio_sequence_number: u32,
    video_sequence_number: u32,
}

impl Mp4Remuxer {
    /// Create a remuxer.
    pub fn new(config: RemuxerConfig) -> Self {
        Self {
            config,
            dts_base: None,
            audio_next_dts: None,
            video_next_dts: None,
            audio_stashed_last_sample: None,
            video_stashed_last_sample: None,
            audio_meta: None,
            video_meta: None,
            audio_segment_info_list: MediaSegmentInfoList::new("audio"),
            video_segment_info_list: MediaSegmentInfoList::new("video"),
            audio_sequence_number: 0,
            video_sequence_number: 0,
        }
    }

    /// The shared DTS base, once the first batch established it.
    pub fn dts_base(&self) -> Option<i64> {
        self.dts_base
    }

    /// Per-track segment bookkeeping (empty in live mode).
    pub fn audio_segment_info_list(&self) -> &MediaSegmentInfoList {
        &self.audio_segment_info_list
    }

    /// Per-track segment bookkeeping (empty in live mode).
    pub fn video_segment_info_list(&self) -> &MediaSegmentInfoList {
        &self.video_segment_info_list
    }

    /// Store track metadata and emit the corresponding init segment.
    pub fn on_track_metadata(&mut self, metadata: TrackMetadata, sink: &mut dyn SegmentSink) {
        let kind = metadata.kind();
        match &metadata {
            TrackMetadata::Audio(meta) => {
                let mpeg_raw = meta.is_mp3() && self.config.mp3_use_mpeg_audio;
                let (data, codec, container) = if mpeg_raw {
                    // marked as a raw MPEG audio stream; no init segment body
                    (Bytes::new(), String::new(), "audio/mpeg".to_string())
                } else {
                    (
                        Bytes::from(boxes::generate_init_segment(&metadata)),
                        meta.codec.clone(),
                        "audio/mp4".to_string(),
                    )
                };
                let segment = InitSegmentData {
                    kind,
                    data,
                    codec,
                    container,
                    media_duration: meta.duration,
                };
                self.audio_meta = Some(meta.clone());
                sink.on_init_segment(kind, segment);
            }
            TrackMetadata::Video(meta) => {
                let segment = InitSegmentData {
                    kind,
                    data: Bytes::from(boxes::generate_init_segment(&metadata)),
                    codec: meta.codec.clone(),
                    container: "video/mp4".to_string(),
                    media_duration: meta.duration,
                };
                self.video_meta = Some(meta.clone());
                sink.on_init_segment(kind, segment);
            }
        }
    }

    /// Remux both track batches. Video first, so seek-start audio padding
    /// can align against the video segment emitted in the same pass.
    pub fn remux(
        &mut self,
        audio: &mut AudioTrack,
        video: &mut VideoTrack,
        sink: &mut dyn SegmentSink,
    ) {
        if self.dts_base.is_none() {
            self.calculate_dts_base(audio, video);
        }
        self.remux_video(video, false, sink);
        self.remux_audio(audio, false, sink);
    }

    /// Reinject the stashed trailing samples as one-sample forced batches.
    /// Called before teardown or on an explicit drain.
    pub fn flush_stashed_samples(&mut self, sink: &mut dyn SegmentSink) {
        let audio_sample = self.audio_stashed_last_sample.take();
        let video_sample = self.video_stashed_last_sample.take();

        let mut video_track = VideoTrack::new();
        if let Some(sample) = video_sample {
            video_track.push(sample);
        }
        let mut audio_track = AudioTrack::new();
        if let Some(sample) = audio_sample {
            audio_track.push(sample);
        }

        self.remux_video(&mut video_track, true, sink);
        self.remux_audio(&mut audio_track, true, sink);
    }

    /// Drop stashed samples and segment bookkeeping for a seek.
    pub fn seek(&mut self) {
        self.audio_stashed_last_sample = None;
        self.video_stashed_last_sample = None;
        self.audio_segment_info_list.clear();
        self.video_segment_info_list.clear();
    }

    /// Forget the running end-DTS so the next batch re-derives its
    /// correction from the segment-info lists.
    pub fn insert_discontinuity(&mut self) {
        self.audio_next_dts = None;
        self.video_next_dts = None;
    }

    fn calculate_dts_base(&mut self, audio: &AudioTrack, video: &VideoTrack) {
        let mut low = i64::MAX;
        if let Some(sample) = audio.samples.first() {
            low = low.min(sample.dts);
        }
        if let Some(sample) = video.samples.first() {
            low = low.min(sample.dts);
        }
        if low != i64::MAX {
            self.dts_base = Some(low);
        }
    }

    // ========================================================================
    // Audio
    // ========================================================================

    fn remux_audio(&mut self, track: &mut AudioTrack, force: bool, sink: &mut dyn SegmentSink) {
        let Some(meta) = self.audio_meta.clone() else {
            return;
        };
        if track.samples.is_empty() {
            return;
        }
        if track.samples.len() == 1 && !force {
            // a lone sample cannot produce a valid duration yet
            return;
        }

        let mpeg_raw = meta.is_mp3() && self.config.mp3_use_mpeg_audio;
        let first_segment_after_seek = self.dts_base.is_some() && self.audio_next_dts.is_none();
        let ref_sample_duration = meta.ref_sample_duration;
        let dts_base = self.dts_base.unwrap_or(0);

        let mut samples = std::mem::take(&mut track.samples);
        track.length = 0;

        let stash_candidate = if samples.len() > 1 { samples.pop() } else { None };
        if let Some(previous) = self.audio_stashed_last_sample.take() {
            samples.insert(0, previous);
        }
        if let Some(last) = stash_candidate {
            self.audio_stashed_last_sample = Some(last);
        }

        let first_sample_original_dts = samples[0].dts - dts_base;

        let mut insert_prefix_silent_frame = false;
        let dts_correction = if let Some(next_dts) = self.audio_next_dts {
            first_sample_original_dts - next_dts
        } else if self.audio_segment_info_list.is_empty() {
            if self.config.fill_silent_after_seek
                && !self.video_segment_info_list.is_empty()
                && !meta.is_mp3()
            {
                insert_prefix_silent_frame = true;
            }
            0
        } else {
            dts_correction_from_list(&self.audio_segment_info_list, first_sample_original_dts)
        };

        let mut out: Vec<OutAudioSample> = Vec::with_capacity(samples.len() + 1);

        if insert_prefix_silent_frame {
            // align the audio segment's beginDts with the video segment's
            let first_dts = first_sample_original_dts - dts_correction;
            match self
                .video_segment_info_list
                .get_last_segment_before(first_sample_original_dts)
            {
                Some(video_segment) if video_segment.begin_dts < first_dts => {
                    if let Some(unit) = silent_frame(&meta.original_codec, meta.channel_count) {
                        let dts = video_segment.begin_dts;
                        let duration = first_dts - dts;
                        debug!(dts, duration, "InsertPrefixSilentAudio");
                        out.push(OutAudioSample {
                            dts,
                            duration,
                            original_dts: dts,
                            unit: unit.to_vec(),
                            flags: audio_sample_flags(),
                        });
                    }
                    // no table entry: cannot generate, skip
                }
                _ => {}
            }
        }

        let count = samples.len();
        let corrected_dts: Vec<i64> = samples
            .iter()
            .map(|s| s.dts - dts_base - dts_correction)
            .collect();

        for (i, sample) in samples.into_iter().enumerate() {
            let original_dts = sample.dts - dts_base;
            let dts = corrected_dts[i];

            let mut sample_duration = if i + 1 < count {
                corrected_dts[i + 1] - dts
            } else if let Some(stashed) = &self.audio_stashed_last_sample {
                (stashed.dts - dts_base - dts_correction) - dts
            } else if let Some(previous) = out.last() {
                previous.duration
            } else {
                ref_sample_duration.floor() as i64
            };

            let mut silent_frames: Vec<OutAudioSample> = Vec::new();
            if sample_duration as f64 > ref_sample_duration * 1.5
                && !meta.is_mp3()
                && self.config.fix_audio_timestamp_gap
            {
                let frame_count = ((sample_duration as f64 - ref_sample_duration).abs()
                    / ref_sample_duration)
                    .ceil() as i64;
                warn!(
                    gap = sample_duration,
                    frame_count, "Large audio timestamp gap detected, filling with silent frames"
                );

                let silent_unit: Vec<u8> =
                    match silent_frame(&meta.original_codec, meta.channel_count) {
                        Some(unit) => unit.to_vec(),
                        None => {
                            warn!("Unable to generate silent frame, repeating the previous frame");
                            sample.unit.clone()
                        }
                    };

                let mut current_dts = dts as f64 + ref_sample_duration;
                for _ in 0..frame_count {
                    let frame_dts = current_dts.round() as i64;
                    if let Some(previous) = silent_frames.last_mut() {
                        previous.duration = frame_dts - previous.dts;
                    }
                    silent_frames.push(OutAudioSample {
                        dts: frame_dts,
                        duration: ref_sample_duration.round() as i64,
                        original_dts,
                        unit: silent_unit.clone(),
                        flags: audio_sample_flags(),
                    });
                    current_dts += ref_sample_duration;
                }
                // pad the final frame so the cumulative end lands exactly on
                // the next real sample's DTS
                if let Some(last) = silent_frames.last_mut() {
                    last.duration = dts + sample_duration - last.dts;
                }
                sample_duration = ref_sample_duration.round() as i64;
            }

            out.push(OutAudioSample {
                dts,
                duration: sample_duration,
                original_dts,
                unit: sample.unit,
                flags: audio_sample_flags(),
            });
            out.append(&mut silent_frames);
        }

        if out.is_empty() {
            return;
        }

        let first_dts = out[0].dts;
        let latest_dts = out.last().map(|s| s.dts + s.duration).expect("non-empty");
        self.audio_next_dts = Some(latest_dts);

        let mut info = MediaSegmentInfo::new();
        info.begin_dts = first_dts;
        info.end_dts = latest_dts;
        info.begin_pts = first_dts;
        info.end_pts = latest_dts;
        info.original_begin_dts = out[0].original_dts;
        {
            let latest = out.last().expect("non-empty");
            info.original_end_dts = latest.original_dts + latest.duration;
            info.first_sample = Some(SampleInfo::new(
                out[0].dts,
                out[0].dts,
                out[0].duration,
                out[0].original_dts,
                false,
            ));
            info.last_sample = Some(SampleInfo::new(
                latest.dts,
                latest.dts,
                latest.duration,
                latest.original_dts,
                false,
            ));
        }
        if !self.config.is_live {
            self.audio_segment_info_list.append(info.clone());
        }

        self.audio_sequence_number += 1;
        track.sequence_number = self.audio_sequence_number;

        let mut payload = Vec::with_capacity(out.iter().map(|s| s.unit.len()).sum());
        for sample in &out {
            payload.extend_from_slice(&sample.unit);
        }

        let data = if mpeg_raw {
            // raw MPEG stream: no box wrapper at all
            payload
        } else {
            let mp4_samples: Vec<Mp4Sample> = out
                .iter()
                .map(|s| Mp4Sample {
                    dts: s.dts,
                    cts: 0,
                    duration: s.duration,
                    size: s.unit.len(),
                    flags: s.flags,
                })
                .collect();
            let mut data = boxes::generate_moof(&FragmentHeader {
                track_id: track.id,
                sequence_number: self.audio_sequence_number,
                base_media_decode_time: first_dts,
                samples: &mp4_samples,
            });
            data.extend_from_slice(&boxes::mdat(&payload));
            data
        };

        sink.on_media_segment(
            TrackKind::Audio,
            MediaSegmentData {
                kind: TrackKind::Audio,
                data: Bytes::from(data),
                sample_count: out.len(),
                info,
                timestamp_offset: (mpeg_raw && first_segment_after_seek).then_some(first_dts),
            },
        );
    }

    // ========================================================================
    // Video
    // ========================================================================

    fn remux_video(&mut self, track: &mut VideoTrack, force: bool, sink: &mut dyn SegmentSink) {
        if self.video_meta.is_none() {
            return;
        }
        if track.samples.is_empty() {
            return;
        }
        if track.samples.len() == 1 && !force {
            return;
        }

        let dts_base = self.dts_base.unwrap_or(0);

        let mut samples = std::mem::take(&mut track.samples);
        track.length = 0;

        let stash_candidate = if samples.len() > 1 { samples.pop() } else { None };
        if let Some(previous) = self.video_stashed_last_sample.take() {
            samples.insert(0, previous);
        }
        if let Some(last) = stash_candidate {
            self.video_stashed_last_sample = Some(last);
        }

        let first_sample_original_dts = samples[0].dts - dts_base;

        let dts_correction = if let Some(next_dts) = self.video_next_dts {
            first_sample_original_dts - next_dts
        } else if self.video_segment_info_list.is_empty() {
            0
        } else {
            dts_correction_from_list(&self.video_segment_info_list, first_sample_original_dts)
        };

        let mut info = MediaSegmentInfo::new();
        let mut out: Vec<OutVideoSample> = Vec::with_capacity(samples.len());

        let count = samples.len();
        let corrected_dts: Vec<i64> = samples
            .iter()
            .map(|s| s.dts - dts_base - dts_correction)
            .collect();
        let ref_sample_duration = self
            .video_meta
            .as_ref()
            .map(|m| m.ref_sample_duration)
            .unwrap_or(1000.0 / 23.976);

        for (i, sample) in samples.into_iter().enumerate() {
            let original_dts = sample.dts - dts_base;
            let dts = corrected_dts[i];
            let cts = sample.cts;
            let pts = dts + cts;

            let sample_duration = if i + 1 < count {
                corrected_dts[i + 1] - dts
            } else if let Some(stashed) = &self.video_stashed_last_sample {
                (stashed.dts - dts_base - dts_correction) - dts
            } else if let Some(previous) = out.last() {
                previous.duration
            } else {
                ref_sample_duration.floor() as i64
            };

            if sample.is_keyframe {
                let mut sync_point = SampleInfo::new(dts, pts, sample_duration, original_dts, true);
                sync_point.file_position = sample.file_position;
                info.append_sync_point(sync_point);
            }

            out.push(OutVideoSample {
                dts,
                pts,
                cts,
                duration: sample_duration,
                original_dts,
                size: sample.size,
                units: sample.units,
                flags: sample.flags,
            });
        }

        if out.is_empty() {
            return;
        }

        if self.config.force_first_idr {
            // some decoders refuse segments that do not open on a random
            // access point
            let flags = &mut out[0].flags;
            flags.depends_on = 2;
            flags.is_non_sync = 0;
        }

        let first_dts = out[0].dts;
        let latest = out.last().expect("non-empty");
        let latest_dts = latest.dts + latest.duration;
        let latest_pts = latest.pts;
        self.video_next_dts = Some(latest_dts);

        info.begin_dts = first_dts;
        info.end_dts = latest_dts;
        info.begin_pts = out[0].pts;
        info.end_pts = latest_pts;
        info.original_begin_dts = out[0].original_dts;
        info.original_end_dts = latest.original_dts + latest.duration;
        info.first_sample = Some(SampleInfo::new(
            out[0].dts,
            out[0].pts,
            out[0].duration,
            out[0].original_dts,
            out[0].flags.is_non_sync == 0,
        ));
        info.last_sample = Some(SampleInfo::new(
            latest.dts,
            latest.pts,
            latest.duration,
            latest.original_dts,
            latest.flags.is_non_sync == 0,
        ));
        if !self.config.is_live {
            self.video_segment_info_list.append(info.clone());
        }

        self.video_sequence_number += 1;
        track.sequence_number = self.video_sequence_number;

        let mut payload = Vec::with_capacity(out.iter().map(|s| s.size).sum());
        for sample in &out {
            for unit in &sample.units {
                payload.extend_from_slice(&unit.data);
            }
        }

        let mp4_samples: Vec<Mp4Sample> = out
            .iter()
            .map(|s| Mp4Sample {
                dts: s.dts,
                cts: s.cts,
                duration: s.duration,
                size: s.size,
                flags: s.flags,
            })
            .collect();
        let mut data = boxes::generate_moof(&FragmentHeader {
            track_id: track.id,
            sequence_number: self.video_sequence_number,
            base_media_decode_time: first_dts,
            samples: &mp4_samples,
        });
        data.extend_from_slice(&boxes::mdat(&payload));

        sink.on_media_segment(
            TrackKind::Video,
            MediaSegmentData {
                kind: TrackKind::Video,
                data: Bytes::from(data),
                sample_count: out.len(),
                info,
                timestamp_offset: None,
            },
        );
    }
}
