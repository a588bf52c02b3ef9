//! Per-segment bookkeeping used for seek lookup and cross-discontinuity DTS
//! correction.
//!
//! Both lists are keyed on *original* (wire) timestamps so that lookups keep
//! working across remuxer corrections. `IdrSampleList` resets itself when a
//! batch jumps backwards, which keeps the sorted invariant intact across
//! replays and seeks to the start without an explicit clear from upstream.

use crate::sample::SampleInfo;

/// Ordered list of video keyframe descriptors, sorted by `original_dts`.
#[derive(Debug, Default)]
pub struct IdrSampleList {
    list: Vec<SampleInfo>,
}

impl IdrSampleList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Whether the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Append a batch of sync points.
    ///
    /// An empty batch is a no-op. If the batch's first entry precedes the
    /// current tail, the stream jumped backwards (replay/seek-to-start) and
    /// the list is cleared before appending.
    pub fn append_array(&mut self, sync_points: &[SampleInfo]) {
        if sync_points.is_empty() {
            return;
        }
        if let Some(last) = self.list.last() {
            if sync_points[0].original_dts < last.original_dts {
                self.clear();
            }
        }
        self.list.extend_from_slice(sync_points);
    }

    /// The entry with the largest `dts` strictly before `dts`, or the first
    /// entry when the target precedes the whole list.
    pub fn get_last_sync_point_before_dts(&self, dts: i64) -> Option<&SampleInfo> {
        if self.list.is_empty() {
            return None;
        }
        let idx = self.list.partition_point(|s| s.dts < dts);
        Some(&self.list[idx.saturating_sub(1)])
    }
}

/// One emitted media segment's timing summary.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSegmentInfo {
    /// First sample DTS after correction.
    pub begin_dts: i64,
    /// Last sample end DTS after correction.
    pub end_dts: i64,
    /// First sample PTS after correction.
    pub begin_pts: i64,
    /// Last sample PTS after correction.
    pub end_pts: i64,
    /// First sample wire DTS.
    pub original_begin_dts: i64,
    /// Last sample wire DTS.
    pub original_end_dts: i64,
    /// First sample descriptor.
    pub first_sample: Option<SampleInfo>,
    /// Last sample descriptor.
    pub last_sample: Option<SampleInfo>,
    /// Keyframe descriptors inside this segment.
    pub sync_points: Vec<SampleInfo>,
}

impl MediaSegmentInfo {
    /// Create an empty segment record.
    pub fn new() -> Self {
        Self {
            begin_dts: 0,
            end_dts: 0,
            begin_pts: 0,
            end_pts: 0,
            original_begin_dts: 0,
            original_end_dts: 0,
            first_sample: None,
            last_sample: None,
            sync_points: Vec::new(),
        }
    }

    /// Record a keyframe belonging to this segment.
    pub fn append_sync_point(&mut self, mut sample_info: SampleInfo) {
        sample_info.is_sync_point = true;
        self.sync_points.push(sample_info);
    }
}

impl Default for MediaSegmentInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered list of [`MediaSegmentInfo`], sorted by `original_begin_dts`.
///
/// Appends are usually monotonically increasing, so the insertion position
/// from the previous append is cached and validated before falling back to a
/// binary search.
#[derive(Debug)]
pub struct MediaSegmentInfoList {
    kind: &'static str,
    list: Vec<MediaSegmentInfo>,
    last_append_location: Option<usize>,
}

impl MediaSegmentInfoList {
    /// Create an empty list tagged with a track name for diagnostics.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            list: Vec::new(),
            last_append_location: None,
        }
    }

    /// Track name this list belongs to.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Whether the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Remove all entries and forget the cached append location.
    pub fn clear(&mut self) {
        self.list.clear();
        self.last_append_location = None;
    }

    /// Insert keeping the list sorted by `original_begin_dts`.
    pub fn append(&mut self, info: MediaSegmentInfo) {
        let insert_idx = match self.last_append_location {
            // Fast path: the previous insertion point is still valid for a
            // monotonically increasing append.
            Some(last_idx)
                if last_idx < self.list.len()
                    && info.original_begin_dts >= self.list[last_idx].original_begin_dts
                    && (last_idx + 1 == self.list.len()
                        || info.original_begin_dts
                            < self.list[last_idx + 1].original_begin_dts) =>
            {
                last_idx + 1
            }
            _ => self
                .list
                .partition_point(|seg| seg.original_begin_dts <= info.original_begin_dts),
        };
        self.last_append_location = Some(insert_idx);
        self.list.insert(insert_idx, info);
    }

    /// The last segment whose `original_begin_dts` is strictly before the
    /// target, if any.
    pub fn get_last_segment_before(&self, original_begin_dts: i64) -> Option<&MediaSegmentInfo> {
        let idx = self
            .list
            .partition_point(|seg| seg.original_begin_dts < original_begin_dts);
        if idx == 0 {
            None
        } else {
            Some(&self.list[idx - 1])
        }
    }

    /// The last sample of [`get_last_segment_before`](Self::get_last_segment_before).
    pub fn get_last_sample_before(&self, original_begin_dts: i64) -> Option<&SampleInfo> {
        self.get_last_segment_before(original_begin_dts)?
            .last_sample
            .as_ref()
    }

    /// The most recent sync point at or before the target, walking back
    /// through segments without sync points.
    pub fn get_last_sync_point_before(&self, original_begin_dts: i64) -> Option<&SampleInfo> {
        let idx = self
            .list
            .partition_point(|seg| seg.original_begin_dts < original_begin_dts);
        let mut seg_idx = idx.checked_sub(1)?;
        loop {
            if let Some(sp) = self.list[seg_idx].sync_points.last() {
                return Some(sp);
            }
            seg_idx = seg_idx.checked_sub(1)?;
        }
    }
}
