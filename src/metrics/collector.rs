//! Rolling-window frame statistics collector
//!
//! Samples are raw frame durations in milliseconds. The window is a FIFO
//! ring: the newest sample evicts the oldest once capacity is reached, so
//! derived metrics always describe the most recent slice of rendering.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default rolling window: last 300 frames (~5 seconds at 60 fps).
pub const DEFAULT_WINDOW_CAPACITY: usize = 300;

/// Derived snapshot of one viewer's performance state.
///
/// Recomputed on every read; nothing here is cached between calls. The
/// percentile-low FPS fields average the worst frame *durations* first and
/// convert to FPS once, which is the convention downstream comparisons
/// depend on (it is not the mean of per-frame FPS values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    /// Mean frame rate over the window, 1 decimal place.
    pub fps: f64,
    /// Mean frame duration in ms, 2 decimal places.
    pub frame_time_ms: f64,
    /// Population standard deviation of frame durations in ms, 2 decimal places.
    pub frame_time_variance: f64,
    /// Mean FPS of the worst 1% of frames (minimum 1 sample), 1 decimal place.
    pub fps_1_percent_low: f64,
    /// Mean FPS of the worst 0.1% of frames (minimum 1 sample), 1 decimal place.
    pub fps_01_percent_low: f64,
    /// Median frame duration in ms, 2 decimal places.
    pub frame_time_p50: f64,
    /// 95th percentile frame duration in ms, 2 decimal places.
    pub frame_time_p95: f64,
    /// 99th percentile frame duration in ms, 2 decimal places.
    pub frame_time_p99: f64,
    /// File load time in whole milliseconds.
    pub load_time_ms: f64,
    /// Loaded file size in bytes.
    pub file_size_bytes: u64,
    /// Splat primitive count of the loaded scene.
    pub splat_count: u64,
    /// Render surface size as (width, height).
    pub resolution: (u32, u32),
}

/// Bounded frame-timing collector for a single viewer slot.
///
/// Every accessor tolerates degenerate state: an empty window or a zero
/// mean yields `0`, never `NaN` and never a panic.
#[derive(Debug, Clone)]
pub struct FrameStatsCollector {
    frame_times: VecDeque<f64>,
    capacity: usize,
    load_time_ms: f64,
    file_size_bytes: u64,
    splat_count: u64,
    resolution: (u32, u32),
}

impl Default for FrameStatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStatsCollector {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    /// Create a collector with a custom window size. Capacity 0 is bumped
    /// to 1 so `record_frame` always retains the latest sample.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            load_time_ms: 0.0,
            file_size_bytes: 0,
            splat_count: 0,
            resolution: (0, 0),
        }
    }

    /// Append one frame duration (ms). O(1) amortized; the window is not
    /// re-sorted on insert, sorting happens at read time.
    pub fn record_frame(&mut self, delta_ms: f64) {
        self.frame_times.push_back(delta_ms);
        if self.frame_times.len() > self.capacity {
            self.frame_times.pop_front();
        }
    }

    /// Record the load time once. Overwrite semantics, no accumulation.
    pub fn end_load(&mut self, load_time_ms: f64) {
        self.load_time_ms = load_time_ms;
    }

    pub fn set_file_info(&mut self, size_bytes: u64, splat_count: u64) {
        self.file_size_bytes = size_bytes;
        self.splat_count = splat_count;
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = (width, height);
    }

    /// Number of samples currently in the window.
    pub fn sample_count(&self) -> usize {
        self.frame_times.len()
    }

    /// Mean FPS over the window: `1000 / mean(samples)`, 0 when empty or
    /// when the mean is 0.
    pub fn fps(&self) -> f64 {
        let avg = self.frame_time();
        if avg > 0.0 {
            1000.0 / avg
        } else {
            0.0
        }
    }

    /// Mean frame duration in ms, 0 when the window is empty.
    pub fn frame_time(&self) -> f64 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        self.frame_times.iter().sum::<f64>() / self.frame_times.len() as f64
    }

    /// Population standard deviation of the raw frame durations.
    ///
    /// Computed on durations, not on frame rates. Fewer than 2 samples
    /// yield 0.
    pub fn frame_time_variance(&self) -> f64 {
        if self.frame_times.len() < 2 {
            return 0.0;
        }
        let mean = self.frame_time();
        let avg_square_diff = self
            .frame_times
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / self.frame_times.len() as f64;
        avg_square_diff.sqrt()
    }

    /// Frame-duration percentile: sort ascending, index
    /// `ceil(p/100 * n) - 1` clamped to the window bounds.
    pub fn percentile(&self, percentile: f64) -> f64 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.frame_times.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let raw = ((percentile / 100.0) * sorted.len() as f64).ceil() as isize - 1;
        let index = raw.clamp(0, sorted.len() as isize - 1) as usize;
        sorted[index]
    }

    /// Mean FPS of the worst 1% of frames.
    pub fn fps_1_percent_low(&self) -> f64 {
        self.percent_low_fps(0.01)
    }

    /// Mean FPS of the worst 0.1% of frames.
    pub fn fps_01_percent_low(&self) -> f64 {
        self.percent_low_fps(0.001)
    }

    // Worst `fraction` of frames by duration (at least 1), averaged as
    // durations and converted to FPS once. Uniform windows therefore
    // produce a percent-low equal to the mean FPS.
    fn percent_low_fps(&self, fraction: f64) -> f64 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.frame_times.iter().copied().collect();
        // Descending: largest durations (worst frames) first.
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let count = ((sorted.len() as f64 * fraction).ceil() as usize).max(1);
        let worst = &sorted[..count.min(sorted.len())];
        let avg_worst = worst.iter().sum::<f64>() / worst.len() as f64;
        if avg_worst > 0.0 {
            1000.0 / avg_worst
        } else {
            0.0
        }
    }

    /// Derived snapshot with the documented display rounding applied.
    pub fn metrics(&self) -> BenchmarkMetrics {
        BenchmarkMetrics {
            fps: round1(self.fps()),
            frame_time_ms: round2(self.frame_time()),
            frame_time_variance: round2(self.frame_time_variance()),
            fps_1_percent_low: round1(self.fps_1_percent_low()),
            fps_01_percent_low: round1(self.fps_01_percent_low()),
            frame_time_p50: round2(self.percentile(50.0)),
            frame_time_p95: round2(self.percentile(95.0)),
            frame_time_p99: round2(self.percentile(99.0)),
            load_time_ms: self.load_time_ms.round(),
            file_size_bytes: self.file_size_bytes,
            splat_count: self.splat_count,
            resolution: self.resolution,
        }
    }

    /// Clear the window and all static fields.
    pub fn reset(&mut self) {
        self.frame_times.clear();
        self.load_time_ms = 0.0;
        self.file_size_bytes = 0;
        self.splat_count = 0;
        self.resolution = (0, 0);
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
