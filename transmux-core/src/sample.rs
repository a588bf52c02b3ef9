//! Sample records exchanged between the demuxer and the remuxer.
//!
//! All timestamps are integer milliseconds in the shared 1000 Hz timescale.
//! `original_dts` carries the tag timestamp as seen on the wire, before the
//! remuxer subtracts its DTS base; the remuxer uses it for cross-segment
//! correction and seek bookkeeping.

/// Track kind. Track ids are fixed: video is 1, audio is 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Video track (id 1).
    Video,
    /// Audio track (id 2).
    Audio,
}

impl TrackKind {
    /// Fixed track id used in `tkhd`/`tfhd`.
    pub fn id(self) -> u32 {
        match self {
            TrackKind::Video => 1,
            TrackKind::Audio => 2,
        }
    }

    /// Name as used in event payloads ("video" / "audio").
    pub fn name(self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

/// Per-sample dependency flags, written into `trun`/`sdtp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleFlags {
    /// ISO 14496-12 `is_leading` (2 bits).
    pub is_leading: u8,
    /// `sample_depends_on`: 2 = I-frame, 1 = depends on others.
    pub depends_on: u8,
    /// `sample_is_depended_on`.
    pub is_depended_on: u8,
    /// `sample_has_redundancy`.
    pub has_redundancy: u8,
    /// `sample_is_non_sync_sample`: 0 for keyframes, 1 otherwise.
    pub is_non_sync: u8,
}

impl SampleFlags {
    /// Flags for a sync (key) frame.
    pub fn sync() -> Self {
        Self {
            is_leading: 0,
            depends_on: 2,
            is_depended_on: 1,
            has_redundancy: 0,
            is_non_sync: 0,
        }
    }

    /// Flags for a dependent (non-key) frame.
    pub fn non_sync() -> Self {
        Self {
            is_leading: 0,
            depends_on: 1,
            is_depended_on: 0,
            has_redundancy: 0,
            is_non_sync: 1,
        }
    }
}

/// One length-prefixed NAL unit inside a video sample.
///
/// `data` retains the 3- or 4-byte big-endian length header dictated by the
/// AVC decoder configuration record, so the remuxer can copy it into `mdat`
/// without rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaluRecord {
    /// NAL unit type (low 5 bits of the first payload byte).
    pub unit_type: u8,
    /// Length-prefixed NAL unit bytes.
    pub data: Vec<u8>,
}

impl NaluRecord {
    /// Total byte length including the length prefix.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the record is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An audio access unit queued for remuxing.
///
/// For AAC, `unit` is a raw AAC frame without ADTS header; for MP3, the raw
/// MPEG audio frame. Audio samples always have `pts == dts` and zero CTS.
#[derive(Debug, Clone)]
pub struct AudioSample {
    /// Decode timestamp (ms), after DTS-base subtraction.
    pub dts: i64,
    /// Presentation timestamp (ms); equals `dts` for audio.
    pub pts: i64,
    /// Duration (ms); filled in by the remuxer.
    pub duration: i64,
    /// Payload byte length.
    pub size: usize,
    /// Tag timestamp as seen on the wire.
    pub original_dts: i64,
    /// Frame payload.
    pub unit: Vec<u8>,
    /// Dependency flags.
    pub flags: SampleFlags,
}

impl AudioSample {
    /// Create a sample from a raw frame at the given tag timestamp.
    pub fn new(dts: i64, unit: Vec<u8>) -> Self {
        Self {
            dts,
            pts: dts,
            duration: 0,
            size: unit.len(),
            original_dts: dts,
            unit,
            flags: SampleFlags::sync(),
        }
    }
}

/// A video access unit (one or more NALUs) queued for remuxing.
#[derive(Debug, Clone)]
pub struct VideoSample {
    /// Decode timestamp (ms), after DTS-base subtraction.
    pub dts: i64,
    /// Presentation timestamp (ms): `dts + cts`.
    pub pts: i64,
    /// Composition time offset (ms).
    pub cts: i64,
    /// Duration (ms); filled in by the remuxer.
    pub duration: i64,
    /// Total payload byte length (sum of all length-prefixed units).
    pub size: usize,
    /// Whether this is an IDR-bearing keyframe.
    pub is_keyframe: bool,
    /// Tag timestamp as seen on the wire.
    pub original_dts: i64,
    /// Length-prefixed NAL units, in decode order.
    pub units: Vec<NaluRecord>,
    /// Dependency flags.
    pub flags: SampleFlags,
    /// Absolute file position of the containing tag, for keyframes.
    pub file_position: Option<u64>,
}

/// Compact descriptor of an emitted sample, kept in segment bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// Decode timestamp (ms) after correction.
    pub dts: i64,
    /// Presentation timestamp (ms) after correction.
    pub pts: i64,
    /// Duration (ms).
    pub duration: i64,
    /// Wire timestamp before correction.
    pub original_dts: i64,
    /// Whether the sample is a sync point.
    pub is_sync_point: bool,
    /// Absolute file position, when known (video keyframes).
    pub file_position: Option<u64>,
}

impl SampleInfo {
    /// Create a new sample descriptor.
    pub fn new(dts: i64, pts: i64, duration: i64, original_dts: i64, is_sync_point: bool) -> Self {
        Self {
            dts,
            pts,
            duration,
            original_dts,
            is_sync_point,
            file_position: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_kind() {
        assert_eq!(TrackKind::Video.id(), 1);
        assert_eq!(TrackKind::Audio.id(), 2);
        assert_eq!(TrackKind::Video.name(), "video");
        assert_eq!(TrackKind::Audio.name(), "audio");
    }

    #[test]
    fn test_sample_flags() {
        let sync = SampleFlags::sync();
        assert_eq!(sync.depends_on, 2);
        assert_eq!(sync.is_non_sync, 0);

        let non_sync = SampleFlags::non_sync();
        assert_eq!(non_sync.depends_on, 1);
        assert_eq!(non_sync.is_non_sync, 1);
    }

    #[test]
    fn test_audio_sample_new() {
        let sample = AudioSample::new(1500, vec![0xAA; 12]);
        assert_eq!(sample.dts, 1500);
        assert_eq!(sample.pts, 1500);
        assert_eq!(sample.original_dts, 1500);
        assert_eq!(sample.size, 12);
    }
}
