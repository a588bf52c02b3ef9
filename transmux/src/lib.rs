//! # transmux
//!
//! A live/VOD FLV → fragmented-MP4 transmuxing pipeline.
//!
//! transmux ingests a byte stream of the FLV container (as delivered by HTTP
//! streaming or WebSocket), parses AAC/MP3/H.264 elementary streams from FLV
//! tags, and emits ISO BMFF initialization segments and `moof`+`mdat` media
//! segments suitable for a downstream media-source pipeline.
//!
//! ## Architecture
//!
//! Data flows one way through three stages, wired by [`Transmuxer`]:
//!
//! 1. **I/O controller** (`transmux-io`): owns a growable stash buffer with
//!    adaptive sizing, presents record-aligned bytes to the demuxer, and
//!    recovers early EOFs with range reconnects.
//! 2. **FLV demuxer** (`transmux-flv`): a tag-level push state machine
//!    producing track metadata and timestamped samples.
//! 3. **fMP4 remuxer** (`transmux-fmp4`): corrects timestamps, patches audio
//!    gaps with silent frames, and generates init and media segments.
//!
//! The pipeline is sans-IO: the embedder's transport implements
//! [`Loader`](transmux_io::Loader), pushes bytes and lifecycle notifications
//! into the [`Transmuxer`], and drains [`TransmuxEvent`]s.
//!
//! ## Example
//!
//! ```no_run
//! use transmux::{MediaDataSource, Transmuxer, TransmuxConfig, TransmuxEvent};
//! # fn loader() -> Box<dyn transmux::Loader> { unimplemented!() }
//!
//! let source = MediaDataSource::new("https://example.com/stream.flv");
//! let mut transmuxer = Transmuxer::new(source, TransmuxConfig::default(), loader());
//! transmuxer.open().unwrap();
//!
//! // transport glue:
//! // transmuxer.on_data_arrival(&chunk, byte_start);
//! // transmuxer.on_loader_complete(from, to);
//!
//! while let Some(event) = transmuxer.poll_event() {
//!     match event {
//!         TransmuxEvent::InitSegment(segment) => { /* append to SourceBuffer */ }
//!         TransmuxEvent::MediaSegment(segment) => { /* append to SourceBuffer */ }
//!         TransmuxEvent::MediaInfo(info) => println!("{:?}", info.mime_type),
//!         _ => {}
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod transmuxer;

pub use events::TransmuxEvent;
pub use transmuxer::Transmuxer;

pub use transmux_core::{
    AudioMetadata, DemuxError, Error, FrameRate, InitSegmentData, KeyframesIndex, MediaDataSource,
    MediaInfo, MediaSegmentData, MediaSegmentInfo, NearestKeyframe, RemuxError, Result, SeekType,
    StatisticsInfo, TrackKind, TransmuxConfig, TransportError, VideoMetadata,
};
pub use transmux_io::{
    LoadRequest, Loader, LoaderStatus, ParamSeekHandler, RangeSeekHandler, SeekHandler, SeekRange,
};
