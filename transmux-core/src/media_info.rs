//! Aggregated stream description emitted once per open session.
//!
//! `MediaInfo` is filled incrementally from `onMetaData` script data and the
//! first codec configuration records; it is dispatched to the consumer the
//! first time `is_complete()` holds.

use serde::{Deserialize, Serialize};

/// Keyframe index from the `onMetaData.keyframes` object: parallel arrays of
/// presentation times (ms) and absolute file positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframesIndex {
    /// Keyframe times in milliseconds, ascending.
    pub times: Vec<u64>,
    /// Absolute file positions of the corresponding tags.
    pub file_positions: Vec<u64>,
}

/// Result of a nearest-keyframe lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestKeyframe {
    /// Index into the keyframe arrays.
    pub index: usize,
    /// Keyframe time in milliseconds.
    pub milliseconds: u64,
    /// Absolute file position of the keyframe tag.
    pub file_position: u64,
}

impl KeyframesIndex {
    /// Number of indexed keyframes.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Binary-search the latest keyframe at or before `milliseconds`.
    ///
    /// Falls back to the first entry when the target precedes the index.
    pub fn nearest(&self, milliseconds: u64) -> Option<NearestKeyframe> {
        if self.times.is_empty() {
            return None;
        }
        // partition_point: count of entries <= target
        let upper = self.times.partition_point(|&t| t <= milliseconds);
        let index = upper.saturating_sub(1);
        Some(NearestKeyframe {
            index,
            milliseconds: self.times[index],
            file_position: self.file_positions[index],
        })
    }
}

/// Aggregated read-only media description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Finalized MIME type, `video/x-flv; codecs="…"`.
    pub mime_type: Option<String>,
    /// Stream duration in milliseconds.
    pub duration: Option<u64>,

    /// Whether the stream declares an audio track.
    pub has_audio: Option<bool>,
    /// Whether the stream declares a video track.
    pub has_video: Option<bool>,
    /// Audio codec string.
    pub audio_codec: Option<String>,
    /// Video codec string.
    pub video_codec: Option<String>,
    /// Audio data rate from metadata, kbps.
    pub audio_data_rate: Option<f64>,
    /// Video data rate from metadata, kbps.
    pub video_data_rate: Option<f64>,
    /// Audio sample rate in Hz.
    pub audio_sample_rate: Option<u32>,
    /// Audio channel count.
    pub audio_channel_count: Option<u8>,

    /// Coded width.
    pub width: Option<u32>,
    /// Coded height.
    pub height: Option<u32>,
    /// Frames per second.
    pub fps: Option<f64>,
    /// H.264 profile name.
    pub profile: Option<String>,
    /// H.264 level string.
    pub level: Option<String>,
    /// Chroma format description, e.g. "4:2:0".
    pub chroma_format: Option<String>,
    /// Sample aspect ratio numerator.
    pub sar_num: Option<u32>,
    /// Sample aspect ratio denominator.
    pub sar_den: Option<u32>,

    /// Script-tag metadata presence.
    pub metadata_present: bool,
    /// Keyframe index, when `onMetaData.keyframes` was present.
    pub keyframes_index: Option<KeyframesIndex>,
}

impl MediaInfo {
    /// Create an empty media info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every required field for the declared tracks is populated.
    pub fn is_complete(&self) -> bool {
        let audio_info_complete = match self.has_audio {
            Some(true) => {
                self.audio_codec.is_some()
                    && self.audio_sample_rate.is_some()
                    && self.audio_channel_count.is_some()
            }
            Some(false) => true,
            None => false,
        };
        let video_info_complete = match self.has_video {
            Some(true) => {
                self.video_codec.is_some()
                    && self.width.is_some()
                    && self.height.is_some()
                    && self.fps.is_some()
                    && self.profile.is_some()
                    && self.level.is_some()
                    && self.chroma_format.is_some()
                    && self.sar_num.is_some()
                    && self.sar_den.is_some()
            }
            Some(false) => true,
            None => false,
        };
        self.mime_type.is_some() && audio_info_complete && video_info_complete
    }

    /// Whether a keyframe index is available for byte-accurate seeking.
    pub fn is_seekable(&self) -> bool {
        self.keyframes_index
            .as_ref()
            .is_some_and(|idx| !idx.is_empty())
    }

    /// Nearest keyframe at or before `milliseconds`, when seekable.
    pub fn get_nearest_keyframe(&self, milliseconds: u64) -> Option<NearestKeyframe> {
        self.keyframes_index.as_ref()?.nearest(milliseconds)
    }
}
