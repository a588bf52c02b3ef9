//! # transmux-core
//!
//! Core types for the transmux FLV → fragmented-MP4 pipeline:
//! - Error hierarchy (transport / demux / remux taxonomies)
//! - Sample, NALU and track batch containers
//! - Track metadata and the aggregated [`MediaInfo`]
//! - Segment bookkeeping ([`MediaSegmentInfoList`], [`IdrSampleList`])
//! - Pipeline configuration and event payload types
//!
//! All timestamps across the pipeline are integer milliseconds; the fMP4
//! timescale is fixed at 1000.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod events;
pub mod media_info;
pub mod metadata;
pub mod sample;
pub mod segment_info;
pub mod track;

pub use config::{MediaDataSource, SeekType, TransmuxConfig};
pub use error::{DemuxError, Error, RemuxError, Result, TransportError};
pub use events::{InitSegmentData, MediaSegmentData, StatisticsInfo};
pub use media_info::{KeyframesIndex, MediaInfo, NearestKeyframe};
pub use metadata::{AudioMetadata, FrameRate, TrackMetadata, VideoMetadata, TIMESCALE};
pub use sample::{AudioSample, NaluRecord, SampleFlags, SampleInfo, TrackKind, VideoSample};
pub use segment_info::{IdrSampleList, MediaSegmentInfo, MediaSegmentInfoList};
pub use track::{AudioTrack, VideoTrack};
