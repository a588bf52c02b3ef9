//! # transmux-io
//!
//! Streaming I/O layer for the transmux pipeline: the [`Loader`] contract
//! transports implement, HTTP range/param seek encodings, receive-speed
//! sampling, and the stash-buffered [`IoController`] that bridges chunked
//! network delivery and record-aligned parsing.
//!
//! The controller is sans-IO: transports push bytes and lifecycle events in
//! (`on_data_arrival`, `on_loader_complete`, `on_loader_error`), and the
//! controller forwards aligned data to a [`DataSink`] while issuing loader
//! commands (open/abort) through the [`Loader`] it owns.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod loader;
pub mod seek_handler;
pub mod speed;

pub use controller::{DataSink, IoController, IoEventSink, IoSink};
pub use loader::{LoadRequest, Loader, LoaderStatus, SeekRange};
pub use seek_handler::{ParamSeekHandler, RangeSeekHandler, SeekConfig, SeekHandler};
pub use speed::{normalize_speed, SpeedSampler, SPEED_LADDER};
