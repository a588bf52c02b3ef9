//! Stash-buffered I/O controller.
//!
//! Sits between a transport loader and the demuxer. Incoming chunks are
//! presented to the consumer with absolute offsets; the consumer declares
//! how many leading bytes it absorbed and the controller preserves the
//! remainder, so the demuxer can refuse records that are not fully buffered
//! without copying on its side. The stash is sized adaptively from the
//! observed receive speed, and recoverable `EarlyEof` errors are retried
//! with a range request before the consumer ever sees them.

use tracing::{debug, warn};

use transmux_core::{MediaDataSource, StatisticsInfo, TransmuxConfig, TransportError};

use crate::loader::{LoadRequest, Loader, LoaderStatus, SeekRange};
use crate::seek_handler::{ParamSeekHandler, RangeSeekHandler, SeekHandler};
use crate::speed::{normalize_speed, SpeedSampler};

/// Consumer of the byte stream (the demuxer, behind the pipeline facade).
pub trait DataSink {
    /// Absorb leading bytes of `chunk`, which starts at absolute offset
    /// `byte_start`. Returns how many bytes were consumed; the controller
    /// re-presents the remainder together with subsequent data.
    fn feed(&mut self, chunk: &[u8], byte_start: u64) -> usize;
}

/// Out-of-band notifications from the controller.
pub trait IoEventSink {
    /// The loader finished delivering the requested range.
    fn on_complete(&mut self) {}

    /// A recoverable early EOF was successfully bridged by an internal
    /// reconnect. Emitted once per recovery, on the first arrival after it.
    fn on_recovered_early_eof(&mut self) {}

    /// The transport followed a redirect.
    fn on_redirect(&mut self, _url: &str) {}

    /// A non-recoverable transport error.
    fn on_error(&mut self, _error: TransportError) {}
}

/// Combined consumer: the data path and the notification path, one object.
pub trait IoSink: DataSink + IoEventSink {}

impl<T: DataSink + IoEventSink> IoSink for T {}

const DEFAULT_STASH_INITIAL_SIZE: usize = 384 * 1024;
const ONE_MIB: usize = 1024 * 1024;
const INITIAL_BUFFER_SIZE: usize = 3 * ONE_MIB;
const MAX_STASH_KIB: u32 = 8192;

/// Streaming I/O controller with adaptive stash buffering.
pub struct IoController {
    source: MediaDataSource,
    is_live: bool,
    enable_stash: bool,
    stash_initial_size: usize,
    reuse_redirected_url: bool,

    loader: Box<dyn Loader>,
    seek_handler: Box<dyn SeekHandler>,

    stash: Vec<u8>,
    stash_size: usize,
    buffer_size: usize,
    stash_byte_start: u64,

    total_length: Option<u64>,
    full_request_flag: bool,
    current_range: SeekRange,
    redirected_url: Option<String>,

    speed_sampler: SpeedSampler,
    speed_normalized: u32,

    early_eof_reconnecting: bool,
    paused: bool,
    resume_from: u64,
}

impl IoController {
    /// Create a controller for `source`, delivering through `loader`.
    pub fn new(source: MediaDataSource, config: &TransmuxConfig, loader: Box<dyn Loader>) -> Self {
        let seek_handler: Box<dyn SeekHandler> = match config.seek_type {
            transmux_core::SeekType::Param => Box::new(ParamSeekHandler::new(
                config.seek_param_start.clone(),
                config.seek_param_end.clone(),
            )),
            // a custom handler is injected via with_seek_handler
            _ => Box::new(RangeSeekHandler::new(config.range_load_zero_start)),
        };

        let stash_initial_size = config.stash_initial_size.unwrap_or(DEFAULT_STASH_INITIAL_SIZE);
        let enable_stash = config.enable_stash_buffer && loader.needs_stash_buffer();
        let total_length = source.filesize;

        Self {
            source,
            is_live: config.is_live,
            enable_stash,
            stash_initial_size,
            reuse_redirected_url: config.reuse_redirected_url,
            loader,
            seek_handler,
            stash: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            stash_size: stash_initial_size,
            buffer_size: INITIAL_BUFFER_SIZE,
            stash_byte_start: 0,
            total_length,
            full_request_flag: false,
            current_range: SeekRange::open_ended(0),
            redirected_url: None,
            speed_sampler: SpeedSampler::new(),
            speed_normalized: 0,
            early_eof_reconnecting: false,
            paused: false,
            resume_from: 0,
        }
    }

    /// Replace the seek handler (for `SeekType::Custom`).
    pub fn with_seek_handler(mut self, handler: Box<dyn SeekHandler>) -> Self {
        self.seek_handler = handler;
        self
    }

    /// Whether a request is in flight.
    pub fn is_working(&self) -> bool {
        matches!(
            self.loader.status(),
            LoaderStatus::Connecting | LoaderStatus::Buffering
        ) && !self.paused
    }

    /// Whether the controller is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The total resource length, when known.
    pub fn total_length(&self) -> Option<u64> {
        self.total_length
    }

    /// The range of the current request; `to` tracks the last received byte.
    pub fn current_range(&self) -> SeekRange {
        self.current_range
    }

    /// Current stash size limit in bytes.
    pub fn stash_size(&self) -> usize {
        self.stash_size
    }

    /// Current backing buffer size in bytes. Grows, never shrinks.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Bytes currently parked in the stash.
    pub fn stash_used(&self) -> usize {
        self.stash.len()
    }

    /// Absolute source offset of stash byte zero.
    pub fn stash_byte_start(&self) -> u64 {
        self.stash_byte_start
    }

    /// Transfer statistics snapshot.
    pub fn statistics(&mut self) -> StatisticsInfo {
        StatisticsInfo {
            current_range_from: self.current_range.from,
            current_range_to: self.current_range.to.unwrap_or(u64::MAX),
            total_received: self.speed_sampler.total_bytes(),
            current_speed: self.speed_sampler.last_second_kbps(),
            has_total_length: self.total_length.is_some(),
            total_length: self.total_length,
        }
    }

    /// Swap the request URL for subsequent range requests.
    pub fn update_url(&mut self, url: &str) {
        self.source.url = url.to_string();
        self.redirected_url = None;
    }

    /// Open the stream, optionally from a byte offset.
    ///
    /// Omitting `from` marks this as the full request, letting the first
    /// `Content-Length` discovery establish the total length.
    pub fn open(&mut self, from: Option<u64>) -> Result<(), TransportError> {
        self.current_range = SeekRange::open_ended(from.unwrap_or(0));
        self.speed_sampler.reset();
        if from.is_none() {
            self.full_request_flag = true;
        }
        self.open_loader(SeekRange::open_ended(self.current_range.from))
    }

    /// Abort the in-flight request and clear any pause state.
    pub fn abort(&mut self) {
        self.loader.abort();
        if self.paused {
            self.paused = false;
            self.resume_from = 0;
        }
    }

    /// Stop loading, remembering where to pick the stream back up.
    pub fn pause(&mut self) {
        if !self.is_working() {
            return;
        }
        self.loader.abort();

        if !self.stash.is_empty() {
            // the stash holds unconsumed bytes: resume there so the demuxer
            // keeps its record alignment
            self.resume_from = self.stash_byte_start;
            self.current_range.to = Some(self.stash_byte_start.saturating_sub(1));
        } else {
            self.resume_from = self.next_unreceived_byte();
        }
        self.stash.clear();
        self.stash_byte_start = 0;
        self.paused = true;
    }

    /// Resume loading after [`pause`](Self::pause).
    pub fn resume(&mut self, sink: &mut dyn IoSink) {
        if !self.paused {
            return;
        }
        self.paused = false;
        let bytes = self.resume_from;
        self.resume_from = 0;
        self.internal_seek(bytes, false, sink);
    }

    /// Seek to an absolute byte offset, dropping unconsumed stash data.
    pub fn seek(&mut self, bytes: u64, sink: &mut dyn IoSink) {
        self.paused = false;
        self.internal_seek(bytes, true, sink);
    }

    /// Release the loader and all buffered data.
    pub fn destroy(&mut self) {
        self.loader.abort();
        self.loader.destroy();
        self.stash.clear();
        self.stash_byte_start = 0;
        self.paused = false;
    }

    // ========================================================================
    // Loader notifications (called by the embedder's transport glue)
    // ========================================================================

    /// The transport discovered the resource's total length.
    pub fn on_content_length_known(&mut self, content_length: u64) {
        if self.full_request_flag {
            self.total_length = Some(content_length);
            self.full_request_flag = false;
        }
    }

    /// The transport followed a redirect to `url`.
    pub fn on_url_redirect(&mut self, url: &str, sink: &mut dyn IoSink) {
        self.redirected_url = Some(url.to_string());
        sink.on_redirect(url);
    }

    /// The loader delivered a chunk starting at absolute offset
    /// `byte_start`.
    pub fn on_data_arrival(&mut self, chunk: &[u8], byte_start: u64, sink: &mut dyn IoSink) {
        if self.paused || chunk.is_empty() {
            return;
        }
        if self.early_eof_reconnecting {
            // the reconnection is stable
            self.early_eof_reconnecting = false;
            sink.on_recovered_early_eof();
        }

        self.current_range.to = Some(byte_start + chunk.len() as u64 - 1);
        self.speed_sampler.add_bytes(chunk.len() as u64);

        let kbps = self.speed_sampler.last_second_kbps();
        if kbps != 0.0 {
            let normalized = normalize_speed(kbps);
            if self.speed_normalized != normalized {
                self.speed_normalized = normalized;
                self.adjust_stash_size(normalized);
            }
        }

        if !self.enable_stash {
            self.passthrough_arrival(chunk, byte_start, sink);
        } else {
            self.stashed_arrival(chunk, byte_start, sink);
        }
    }

    /// The loader finished delivering the requested range.
    pub fn on_loader_complete(&mut self, _from: u64, _to: u64, sink: &mut dyn IoSink) {
        self.flush_stash_buffer(true, sink);
        sink.on_complete();
    }

    /// The loader failed.
    pub fn on_loader_error(&mut self, error: TransportError, sink: &mut dyn IoSink) {
        warn!(%error, "Loader error");
        self.flush_stash_buffer(false, sink);

        let mut error = error;
        if self.early_eof_reconnecting {
            // the recovery attempt itself failed
            self.early_eof_reconnecting = false;
            error = TransportError::UnrecoverableEarlyEof;
        }

        if error.is_recoverable() {
            if !self.is_live {
                if let Some(total_length) = self.total_length {
                    let next_from = self.next_unreceived_byte();
                    if next_from < total_length {
                        warn!("Connection lost, trying reconnect...");
                        self.early_eof_reconnecting = true;
                        self.internal_seek(next_from, false, sink);
                    }
                    // next_from == total_length: everything already arrived
                    return;
                }
            }
            error = TransportError::UnrecoverableEarlyEof;
        }

        sink.on_error(error);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn next_unreceived_byte(&self) -> u64 {
        self.current_range
            .to
            .map(|to| to + 1)
            .unwrap_or(self.current_range.from)
    }

    fn open_loader(&mut self, range: SeekRange) -> Result<(), TransportError> {
        let url = match (&self.redirected_url, self.reuse_redirected_url) {
            (Some(redirected), true) => redirected.clone(),
            _ => self.source.url.clone(),
        };
        let seek_config = self.seek_handler.get_config(&url, range);
        let request = LoadRequest {
            url: seek_config.url,
            headers: seek_config.headers,
            range,
            with_credentials: self.source.with_credentials,
            cors: self.source.cors,
        };
        self.loader.open(&request)
    }

    fn internal_seek(&mut self, bytes: u64, drop_unconsumed: bool, sink: &mut dyn IoSink) {
        if self.is_working() {
            self.loader.abort();
        }

        // dispatch whatever the stash still holds before moving the range
        self.flush_stash_buffer(drop_unconsumed, sink);
        self.loader.destroy();

        let range = SeekRange::open_ended(bytes);
        self.current_range = range;
        self.speed_sampler.reset();
        self.stash_size = self.stash_initial_size;

        if let Err(err) = self.open_loader(range) {
            sink.on_error(err);
        }
    }

    fn passthrough_arrival(&mut self, chunk: &[u8], byte_start: u64, sink: &mut dyn IoSink) {
        if self.stash.is_empty() {
            let consumed = sink.feed(chunk, byte_start);
            if consumed < chunk.len() {
                let remain = &chunk[consumed..];
                self.reserve_buffer(remain.len());
                self.stash.extend_from_slice(remain);
                self.stash_byte_start = byte_start + consumed as u64;
            }
        } else {
            self.reserve_buffer(self.stash.len() + chunk.len());
            self.stash.extend_from_slice(chunk);
            let consumed = sink.feed(&self.stash, self.stash_byte_start);
            if consumed > 0 {
                self.stash.drain(..consumed);
                self.stash_byte_start += consumed as u64;
            }
        }
    }

    fn stashed_arrival(&mut self, chunk: &[u8], byte_start: u64, sink: &mut dyn IoSink) {
        if self.stash.is_empty() && self.stash_byte_start == 0 {
            // initial arrival, or first arrival after a seek
            self.stash_byte_start = byte_start;
        }

        if self.stash.len() + chunk.len() <= self.stash_size {
            // within limits: accumulate and wait for more
            self.reserve_buffer(self.stash.len() + chunk.len());
            self.stash.extend_from_slice(chunk);
            return;
        }

        if !self.stash.is_empty() {
            // dispatch the stash, keep the unconsumed remainder, then append
            let consumed = sink.feed(&self.stash, self.stash_byte_start);
            if consumed > 0 {
                self.stash.drain(..consumed);
                self.stash_byte_start += consumed as u64;
            }
            self.reserve_buffer(self.stash.len() + chunk.len());
            self.stash.extend_from_slice(chunk);
        } else {
            // the chunk alone exceeds the stash size: dispatch it directly
            let consumed = sink.feed(chunk, byte_start);
            if consumed < chunk.len() {
                let remain = &chunk[consumed..];
                self.reserve_buffer(remain.len());
                self.stash.extend_from_slice(remain);
                self.stash_byte_start = byte_start + consumed as u64;
            }
        }
    }

    /// Dispatch whatever the stash holds. Invoked at seek, completion and
    /// error. With `drop_unconsumed`, any remainder is discarded; otherwise
    /// it is preserved for later arrivals. Returns the dropped byte count.
    fn flush_stash_buffer(&mut self, drop_unconsumed: bool, sink: &mut dyn IoSink) -> usize {
        if self.stash.is_empty() {
            return 0;
        }

        let consumed = sink.feed(&self.stash, self.stash_byte_start);
        let remain = self.stash.len() - consumed;
        if remain > 0 {
            if drop_unconsumed {
                warn!(remain, "Unconsumed data remain when flushing buffer, dropped");
            } else {
                if consumed > 0 {
                    self.stash.drain(..consumed);
                    self.stash_byte_start += consumed as u64;
                }
                return 0;
            }
        }
        self.stash.clear();
        self.stash_byte_start = 0;
        remain
    }

    fn adjust_stash_size(&mut self, normalized_kbps: u32) {
        let mut stash_size_kib = if self.is_live {
            normalized_kbps
        } else if normalized_kbps < 512 {
            normalized_kbps
        } else if normalized_kbps <= 1024 {
            (normalized_kbps as f64 * 1.5).floor() as u32
        } else {
            normalized_kbps * 2
        };
        if stash_size_kib > MAX_STASH_KIB {
            stash_size_kib = MAX_STASH_KIB;
        }

        let wanted_buffer = stash_size_kib as usize * 1024 + ONE_MIB;
        if self.buffer_size < wanted_buffer {
            self.expand_buffer(wanted_buffer);
        }
        self.stash_size = stash_size_kib as usize * 1024;
        debug!(
            stash_size = self.stash_size,
            speed_kbps = normalized_kbps,
            "Adjusted stash size"
        );
    }

    fn expand_buffer(&mut self, expected_bytes: usize) {
        let mut new_size = self.stash_size;
        while new_size + ONE_MIB < expected_bytes {
            new_size *= 2;
        }
        new_size += ONE_MIB;
        if new_size <= self.buffer_size {
            return;
        }
        self.stash.reserve(new_size.saturating_sub(self.stash.len()));
        self.buffer_size = new_size;
        debug!(buffer_size = self.buffer_size, "Expanded stash buffer");
    }

    fn reserve_buffer(&mut self, needed: usize) {
        if needed > self.buffer_size {
            self.expand_buffer(needed);
        }
    }
}
