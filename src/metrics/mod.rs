//! Frame-timing statistics
//!
//! One `FrameStatsCollector` per viewer slot ingests per-frame deltas and
//! derives FPS, percentile, and percentile-low stability metrics on demand.

mod collector;

pub use collector::{BenchmarkMetrics, FrameStatsCollector, DEFAULT_WINDOW_CAPACITY};
