//! Receive-speed sampling and the stash sizing ladder.

use std::time::Instant;

/// The fixed speed ladder, KiB/s. Observed speeds snap to the
/// nearest-lower entry.
pub const SPEED_LADDER: [u32; 11] = [64, 128, 256, 384, 512, 768, 1024, 1536, 2048, 3072, 4096];

/// Snap a measured speed to the nearest-lower ladder entry.
pub fn normalize_speed(kbps: f64) -> u32 {
    let idx = SPEED_LADDER.partition_point(|&step| (step as f64) <= kbps);
    if idx == 0 {
        SPEED_LADDER[0]
    } else {
        SPEED_LADDER[idx - 1]
    }
}

/// Sliding receive-speed sampler with one-second windows.
///
/// All public accessors have `*_at` twins taking an explicit clock reading
/// in milliseconds so the windowing is testable without sleeping.
#[derive(Debug)]
pub struct SpeedSampler {
    epoch: Instant,
    first_checkpoint: Option<f64>,
    last_checkpoint: f64,
    interval_bytes: u64,
    total_bytes: u64,
    last_second_bytes: u64,
}

impl SpeedSampler {
    /// Create a sampler with an empty window.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            first_checkpoint: None,
            last_checkpoint: 0.0,
            interval_bytes: 0,
            total_bytes: 0,
            last_second_bytes: 0,
        }
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        self.first_checkpoint = None;
        self.last_checkpoint = 0.0;
        self.interval_bytes = 0;
        self.total_bytes = 0;
        self.last_second_bytes = 0;
    }

    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    /// Account received bytes at the current time.
    pub fn add_bytes(&mut self, bytes: u64) {
        self.add_bytes_at(bytes, self.now_ms());
    }

    /// Account received bytes at an explicit clock reading.
    pub fn add_bytes_at(&mut self, bytes: u64, now_ms: f64) {
        match self.first_checkpoint {
            None => {
                self.first_checkpoint = Some(now_ms);
                self.last_checkpoint = now_ms;
                self.interval_bytes += bytes;
                self.total_bytes += bytes;
            }
            Some(_) if now_ms - self.last_checkpoint < 1000.0 => {
                self.interval_bytes += bytes;
                self.total_bytes += bytes;
            }
            Some(_) => {
                // window rolled over
                self.last_second_bytes = self.interval_bytes;
                self.interval_bytes = bytes;
                self.total_bytes += bytes;
                self.last_checkpoint = now_ms;
            }
        }
    }

    /// Speed over the current (possibly partial) window, KiB/s.
    pub fn current_kbps(&mut self) -> f64 {
        self.current_kbps_at(self.now_ms())
    }

    /// [`current_kbps`](Self::current_kbps) at an explicit clock reading.
    pub fn current_kbps_at(&mut self, now_ms: f64) -> f64 {
        self.add_bytes_at(0, now_ms);
        let mut duration_seconds = (now_ms - self.last_checkpoint) / 1000.0;
        if duration_seconds == 0.0 {
            duration_seconds = 1.0;
        }
        (self.interval_bytes as f64 / duration_seconds) / 1024.0
    }

    /// Speed over the last completed window, KiB/s; falls back to the
    /// current window once it is at least half filled.
    pub fn last_second_kbps(&mut self) -> f64 {
        self.last_second_kbps_at(self.now_ms())
    }

    /// [`last_second_kbps`](Self::last_second_kbps) at an explicit reading.
    pub fn last_second_kbps_at(&mut self, now_ms: f64) -> f64 {
        self.add_bytes_at(0, now_ms);
        if self.last_second_bytes != 0 {
            self.last_second_bytes as f64 / 1024.0
        } else if now_ms - self.last_checkpoint >= 500.0 {
            self.current_kbps_at(now_ms)
        } else {
            0.0
        }
    }

    /// Average speed since the first sample, KiB/s.
    pub fn average_kbps(&self) -> f64 {
        self.average_kbps_at(self.now_ms())
    }

    /// [`average_kbps`](Self::average_kbps) at an explicit clock reading.
    pub fn average_kbps_at(&self, now_ms: f64) -> f64 {
        let Some(first) = self.first_checkpoint else {
            return 0.0;
        };
        let duration_seconds = (now_ms - first) / 1000.0;
        if duration_seconds <= 0.0 {
            return 0.0;
        }
        (self.total_bytes as f64 / duration_seconds) / 1024.0
    }

    /// Total bytes accounted since the last reset.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

impl Default for SpeedSampler {
    fn default() -> Self {
        Self::new()
    }
}
