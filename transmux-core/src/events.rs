//! Payload types for the segments and notifications the pipeline emits.
//!
//! Segment payloads carry their bytes as [`Bytes`] so ownership can be moved
//! across a worker boundary without copying.

use bytes::Bytes;

use crate::sample::TrackKind;
use crate::segment_info::MediaSegmentInfo;

/// An `ftyp`+`moov` initialization segment for one track.
#[derive(Debug, Clone)]
pub struct InitSegmentData {
    /// Which track this initializes.
    pub kind: TrackKind,
    /// Segment bytes.
    pub data: Bytes,
    /// RFC 6381 codec string.
    pub codec: String,
    /// Container MIME type, `video/mp4` or `audio/mp4` (or `audio/mpeg` for
    /// raw MP3 passthrough).
    pub container: String,
    /// Total media duration in milliseconds (0 when unknown/live).
    pub media_duration: i64,
}

/// A `moof`+`mdat` media segment (or raw MPEG payload for MP3 passthrough).
#[derive(Debug, Clone)]
pub struct MediaSegmentData {
    /// Which track this segment belongs to.
    pub kind: TrackKind,
    /// Segment bytes.
    pub data: Bytes,
    /// Number of samples inside.
    pub sample_count: usize,
    /// Timing summary.
    pub info: MediaSegmentInfo,
    /// For raw MPEG audio: the timestamp offset the consumer must apply to
    /// the first segment after a seek.
    pub timestamp_offset: Option<i64>,
}

/// Periodic transfer statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatisticsInfo {
    /// Absolute offset of the current request range.
    pub current_range_from: u64,
    /// End of the current request range (`u64::MAX` for open-ended).
    pub current_range_to: u64,
    /// Bytes received since open.
    pub total_received: u64,
    /// Smoothed receive speed, KiB/s.
    pub current_speed: f64,
    /// Whether the loader reported the total content length.
    pub has_total_length: bool,
    /// Total length in bytes, when known.
    pub total_length: Option<u64>,
}
