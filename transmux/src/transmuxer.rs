//! The transmuxing pipeline facade.
//!
//! `Transmuxer` owns the three pipeline stages and wires them at
//! construction: the I/O controller forwards record-aligned bytes to the
//! FLV demuxer, which hands sample batches to the fMP4 remuxer, whose
//! segments land in an event queue the embedder drains with
//! [`poll_event`](Transmuxer::poll_event).
//!
//! The pipeline is sans-IO and single-threaded: the embedder's transport
//! pushes bytes and loader lifecycle notifications in; every callback runs
//! to completion before the next is serviced.

use std::collections::VecDeque;

use tracing::{debug, warn};

use transmux_core::{
    Error, IdrSampleList, MediaDataSource, MediaInfo, RemuxError, TrackKind, TransmuxConfig,
    TransportError,
};
use transmux_flv::{DemuxSink, DemuxerConfig, FlvDemuxer};
use transmux_fmp4::{Mp4Remuxer, RemuxerConfig, SegmentSink};
use transmux_io::{DataSink, IoController, IoEventSink, Loader, SeekHandler};

use crate::events::TransmuxEvent;

// ============================================================================
// Internal sinks
// ============================================================================

/// Segment receiver: queues events and maintains the IDR index.
struct EventSegmentSink<'a> {
    events: &'a mut VecDeque<TransmuxEvent>,
    idr_list: &'a mut IdrSampleList,
    pending_seek_point: &'a mut Option<u64>,
}

impl SegmentSink for EventSegmentSink<'_> {
    fn on_init_segment(&mut self, _kind: TrackKind, segment: transmux_core::InitSegmentData) {
        self.events.push_back(TransmuxEvent::InitSegment(segment));
    }

    fn on_media_segment(&mut self, kind: TrackKind, segment: transmux_core::MediaSegmentData) {
        let resolved_seek_point = if kind == TrackKind::Video {
            self.idr_list.append_array(&segment.info.sync_points);
            self.pending_seek_point.take()
        } else {
            None
        };
        self.events.push_back(TransmuxEvent::MediaSegment(segment));
        if let Some(seek_point) = resolved_seek_point {
            self.events
                .push_back(TransmuxEvent::RecommendSeekpoint(seek_point));
        }
    }
}

/// Demuxer receiver: stores media info, forwards batches to the remuxer.
struct RemuxBridge<'a> {
    remuxer: &'a mut Mp4Remuxer,
    events: &'a mut VecDeque<TransmuxEvent>,
    idr_list: &'a mut IdrSampleList,
    pending_seek_point: &'a mut Option<u64>,
    media_info: &'a mut Option<MediaInfo>,
}

impl DemuxSink for RemuxBridge<'_> {
    fn on_track_metadata(
        &mut self,
        metadata: transmux_core::TrackMetadata,
    ) -> transmux_core::Result<()> {
        let mut sink = EventSegmentSink {
            events: &mut *self.events,
            idr_list: &mut *self.idr_list,
            pending_seek_point: &mut *self.pending_seek_point,
        };
        self.remuxer.on_track_metadata(metadata, &mut sink);
        Ok(())
    }

    fn on_media_info(&mut self, info: &MediaInfo) {
        *self.media_info = Some(info.clone());
        self.events
            .push_back(TransmuxEvent::MediaInfo(info.clone()));
    }

    fn on_data_available(
        &mut self,
        audio: &mut transmux_core::AudioTrack,
        video: &mut transmux_core::VideoTrack,
    ) -> transmux_core::Result<()> {
        let mut sink = EventSegmentSink {
            events: &mut *self.events,
            idr_list: &mut *self.idr_list,
            pending_seek_point: &mut *self.pending_seek_point,
        };
        self.remuxer.remux(audio, video, &mut sink);
        Ok(())
    }
}

/// Combined I/O consumer: the data path feeds the demuxer, the notification
/// path lands in the event queue.
struct PipelineSink<'a> {
    source: &'a MediaDataSource,
    config: &'a TransmuxConfig,
    demuxer: &'a mut Option<FlvDemuxer>,
    remuxer: &'a mut Mp4Remuxer,
    events: &'a mut VecDeque<TransmuxEvent>,
    idr_list: &'a mut IdrSampleList,
    pending_seek_point: &'a mut Option<u64>,
    media_info: &'a mut Option<MediaInfo>,
    fatal: &'a mut bool,
}

impl DataSink for PipelineSink<'_> {
    fn feed(&mut self, chunk: &[u8], byte_start: u64) -> usize {
        if *self.fatal {
            // swallow everything after a fatal error
            return chunk.len();
        }

        if self.demuxer.is_none() {
            match FlvDemuxer::probe(chunk) {
                Some(probe) => {
                    debug!(
                        data_offset = probe.data_offset,
                        has_audio = probe.has_audio,
                        has_video = probe.has_video,
                        "Stream probed as FLV"
                    );
                    *self.demuxer = Some(FlvDemuxer::new(
                        probe,
                        DemuxerConfig::new(self.source, self.config),
                    ));
                }
                None if byte_start == 0 && chunk.len() > 13 => {
                    *self.fatal = true;
                    self.events.push_back(TransmuxEvent::Error(Error::format(
                        "non-FLV, unsupported media type",
                    )));
                    return chunk.len();
                }
                None => return 0, // not enough bytes to probe yet
            }
        }

        let demuxer = self.demuxer.as_mut().expect("created above");
        let mut bridge = RemuxBridge {
            remuxer: &mut *self.remuxer,
            events: &mut *self.events,
            idr_list: &mut *self.idr_list,
            pending_seek_point: &mut *self.pending_seek_point,
            media_info: &mut *self.media_info,
        };
        match demuxer.parse_chunks(chunk, byte_start, &mut bridge) {
            Ok(consumed) => consumed,
            Err(err) => {
                warn!(%err, "Demux error, stopping session");
                *self.fatal = true;
                self.events.push_back(TransmuxEvent::Error(err));
                chunk.len()
            }
        }
    }
}

impl IoEventSink for PipelineSink<'_> {
    fn on_complete(&mut self) {
        // LoadingComplete is queued by the facade after the stashed-sample
        // drain, preserving event order
    }

    fn on_recovered_early_eof(&mut self) {
        self.events.push_back(TransmuxEvent::RecoveredEarlyEof);
    }

    fn on_error(&mut self, error: TransportError) {
        self.events.push_back(TransmuxEvent::Error(error.into()));
    }
}

// ============================================================================
// Facade
// ============================================================================

/// FLV → fMP4 transmuxing session.
pub struct Transmuxer {
    source: MediaDataSource,
    config: TransmuxConfig,

    io: IoController,
    demuxer: Option<FlvDemuxer>,
    remuxer: Mp4Remuxer,

    events: VecDeque<TransmuxEvent>,
    idr_list: IdrSampleList,
    media_info: Option<MediaInfo>,
    pending_seek_point: Option<u64>,

    opened: bool,
    closed: bool,
    fatal: bool,
}

impl Transmuxer {
    /// Create a session for `source`, loading through `loader`.
    pub fn new(source: MediaDataSource, config: TransmuxConfig, loader: Box<dyn Loader>) -> Self {
        let io = IoController::new(source.clone(), &config, loader);
        let remuxer = Mp4Remuxer::new(RemuxerConfig::new(&config));
        Self {
            source,
            config,
            io,
            demuxer: None,
            remuxer,
            events: VecDeque::new(),
            idr_list: IdrSampleList::new(),
            media_info: None,
            pending_seek_point: None,
            opened: false,
            closed: false,
            fatal: false,
        }
    }

    /// Replace the seek handler (for `SeekType::Custom`).
    pub fn with_seek_handler(mut self, handler: Box<dyn SeekHandler>) -> Self {
        self.io = self.io.with_seek_handler(handler);
        self
    }

    /// Start loading from the beginning of the stream.
    ///
    /// A session opens once; after [`close`](Self::close), create a new
    /// `Transmuxer` to play again.
    pub fn open(&mut self) -> transmux_core::Result<()> {
        if self.opened {
            return Err(RemuxError::IllegalState("session already opened".into()).into());
        }
        self.opened = true;
        self.io.open(None)?;
        Ok(())
    }

    /// Tear the session down. Idempotent; queued samples are dropped.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.io.destroy();
        self.demuxer = None;
        self.idr_list.clear();
        self.pending_seek_point = None;
    }

    /// The media description, once complete.
    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.media_info.as_ref()
    }

    /// Pop the next pending event.
    pub fn poll_event(&mut self) -> Option<TransmuxEvent> {
        self.events.pop_front()
    }

    /// Queue a [`TransmuxEvent::Statistics`] snapshot. Timer-driven
    /// reporting is the embedder's concern; call this at the cadence the
    /// consumer wants.
    pub fn tick_statistics(&mut self) {
        let info = self.io.statistics();
        self.events.push_back(TransmuxEvent::Statistics(info));
    }

    /// Pause loading. Segment bookkeeping survives pause/resume.
    pub fn pause(&mut self) {
        self.io.pause();
    }

    /// Resume loading after [`pause`](Self::pause).
    pub fn resume(&mut self) {
        if self.closed {
            return;
        }
        self.with_pipeline(|io, sink| io.resume(sink));
    }

    /// Point the session at a new URL for subsequent requests.
    pub fn update_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.io.update_url(&url);
        self.source.url = url;
    }

    /// Keyframe-accurate seek to a playback position in milliseconds.
    ///
    /// Requires a complete media info with a keyframe index; live streams
    /// and index-less files ignore the call (use
    /// [`seek_to_byte`](Self::seek_to_byte) with a caller-derived offset).
    pub fn seek(&mut self, milliseconds: u64) {
        if self.closed || self.fatal {
            return;
        }
        let Some(info) = &self.media_info else {
            return;
        };
        if !info.is_seekable() {
            return;
        }
        let Some(keyframe) = info.get_nearest_keyframe(milliseconds) else {
            return;
        };
        debug!(
            seek_target = milliseconds,
            keyframe = keyframe.milliseconds,
            file_position = keyframe.file_position,
            "Keyframe-accurate seek"
        );

        self.remuxer.seek();
        self.remuxer.insert_discontinuity();
        self.idr_list.clear();
        // accurate seek recommends the requested position; otherwise the
        // keyframe the transport actually lands on
        self.pending_seek_point = Some(if self.config.accurate_seek {
            milliseconds
        } else {
            keyframe.milliseconds
        });
        self.with_pipeline(|io, sink| io.seek(keyframe.file_position, sink));
    }

    /// Seek the transport to an absolute byte offset supplied by the
    /// caller, for streams without a keyframe index.
    pub fn seek_to_byte(&mut self, bytes: u64) {
        if self.closed || self.fatal {
            return;
        }
        self.remuxer.seek();
        self.remuxer.insert_discontinuity();
        self.idr_list.clear();
        self.with_pipeline(|io, sink| io.seek(bytes, sink));
    }

    /// The most recent sync point at or before `dts`, from segments emitted
    /// so far.
    pub fn nearest_sync_point(&self, dts: i64) -> Option<transmux_core::SampleInfo> {
        self.idr_list.get_last_sync_point_before_dts(dts).copied()
    }

    // ========================================================================
    // Loader notifications (transport glue calls these)
    // ========================================================================

    /// Bytes arrived from the transport.
    pub fn on_data_arrival(&mut self, chunk: &[u8], byte_start: u64) {
        if self.closed {
            return;
        }
        self.with_pipeline(|io, sink| io.on_data_arrival(chunk, byte_start, sink));
    }

    /// The transport discovered the total resource length.
    pub fn on_content_length_known(&mut self, content_length: u64) {
        self.io.on_content_length_known(content_length);
    }

    /// The transport followed a redirect.
    pub fn on_url_redirect(&mut self, url: &str) {
        let url = url.to_string();
        self.with_pipeline(|io, sink| io.on_url_redirect(&url, sink));
    }

    /// The transport delivered the whole requested range.
    pub fn on_loader_complete(&mut self, from: u64, to: u64) {
        if self.closed {
            return;
        }
        self.with_pipeline(|io, sink| io.on_loader_complete(from, to, sink));

        // drain the stashed trailing samples, then signal completion
        let mut sink = EventSegmentSink {
            events: &mut self.events,
            idr_list: &mut self.idr_list,
            pending_seek_point: &mut self.pending_seek_point,
        };
        self.remuxer.flush_stashed_samples(&mut sink);
        self.events.push_back(TransmuxEvent::LoadingComplete);
    }

    /// The transport failed.
    pub fn on_loader_error(&mut self, error: TransportError) {
        if self.closed {
            return;
        }
        self.with_pipeline(|io, sink| io.on_loader_error(error, sink));
    }

    // ========================================================================
    // Borrow plumbing
    // ========================================================================

    /// Split the session so the controller and the pipeline sink can be
    /// borrowed simultaneously.
    fn with_pipeline<R>(
        &mut self,
        operate: impl FnOnce(&mut IoController, &mut PipelineSink<'_>) -> R,
    ) -> R {
        let Self {
            source,
            config,
            io,
            demuxer,
            remuxer,
            events,
            idr_list,
            media_info,
            pending_seek_point,
            fatal,
            ..
        } = self;

        let mut sink = PipelineSink {
            source,
            config,
            demuxer,
            remuxer,
            events,
            idr_list,
            pending_seek_point,
            media_info,
            fatal,
        };
        operate(io, &mut sink)
    }
}
