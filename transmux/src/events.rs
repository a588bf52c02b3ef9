//! Events emitted by the pipeline, drained by the embedder.

use transmux_core::{Error, InitSegmentData, MediaInfo, MediaSegmentData, StatisticsInfo};

/// One pipeline event.
///
/// For a given open session the pipeline guarantees: a track's `InitSegment`
/// precedes its first `MediaSegment`; per-track media segments arrive in
/// strictly increasing fragment order; `MediaInfo` precedes the first
/// `MediaSegment`.
#[derive(Debug)]
pub enum TransmuxEvent {
    /// The aggregated media description became complete. Emitted once.
    MediaInfo(MediaInfo),
    /// An `ftyp`+`moov` initialization segment for one track.
    InitSegment(InitSegmentData),
    /// A `moof`+`mdat` media segment (or raw MPEG payload).
    MediaSegment(MediaSegmentData),
    /// The loader finished delivering the stream.
    LoadingComplete,
    /// An early EOF was transparently recovered by a range reconnect.
    RecoveredEarlyEof,
    /// Transfer statistics snapshot.
    Statistics(StatisticsInfo),
    /// The DTS (ms) the consumer should seek its media element to after a
    /// keyframe-accurate seek resolved.
    RecommendSeekpoint(u64),
    /// A fatal pipeline error. The session must be reopened to continue.
    Error(Error),
}
