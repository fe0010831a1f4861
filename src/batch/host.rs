//! Collaborator surface for the external splat renderer/loader
//!
//! The core never talks to a GPU or parses splat files itself; everything
//! flows through the `ViewerHost` trait. Load completion is detected by
//! polling `viewer_metrics`, not by awaiting the loader, because loader
//! completion signals are unreliable across formats.

use crate::camera::ViewerContext;
use crate::metrics::BenchmarkMetrics;
use crate::quality::PixelBuffer;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The two rendering-surface slots driven during a comparison. Slot A
/// holds the uncompressed reference, slot B the format under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewerSlot {
    A,
    B,
}

impl fmt::Display for ViewerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerSlot::A => write!(f, "A"),
            ViewerSlot::B => write!(f, "B"),
        }
    }
}

/// Splat container formats the benchmark knows how to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplatFormat {
    /// Uncompressed reference point cloud.
    Ply,
    Splat,
    KSplat,
    Spz,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error(
        "unsupported splat format '{extension}'; supported formats are \
.ply, .splat, .ksplat and .spz - try converting to .splat or .spz"
    )]
    Unsupported { extension: String },
}

impl SplatFormat {
    /// Parse from a file extension, with or without the leading dot.
    pub fn from_extension(extension: &str) -> Result<Self, FormatError> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "ply" => Ok(SplatFormat::Ply),
            "splat" => Ok(SplatFormat::Splat),
            "ksplat" => Ok(SplatFormat::KSplat),
            "spz" => Ok(SplatFormat::Spz),
            other => Err(FormatError::Unsupported {
                extension: other.to_string(),
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SplatFormat::Ply => "ply",
            SplatFormat::Splat => "splat",
            SplatFormat::KSplat => "ksplat",
            SplatFormat::Spz => "spz",
        }
    }
}

impl fmt::Display for SplatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Descriptor of one splat file handed to the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplatFile {
    pub name: String,
    /// Path or URL understood by the host loader.
    pub path: String,
    pub size_bytes: u64,
    pub format: SplatFormat,
}

impl SplatFile {
    /// Build a descriptor from a path, deriving name and format from it.
    pub fn from_path(path: &str, size_bytes: u64) -> Result<Self, FormatError> {
        let name = path.rsplit(['/', '\\']).next().unwrap_or(path).to_string();
        let extension = name.rsplit('.').next().unwrap_or("");
        let format = SplatFormat::from_extension(extension)?;
        Ok(Self {
            name,
            path: path.to_string(),
            size_bytes,
            format,
        })
    }
}

/// Coarse load/render state of one viewer slot, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerMetrics {
    pub fps: f64,
    /// Milliseconds from load dispatch to first usable frame; 0 while loading.
    pub load_time_ms: f64,
    pub memory_mb: f64,
    /// 0 until the loader has produced splats; stability across polls
    /// signals load completion.
    pub splat_count: u64,
    pub resolution: (u32, u32),
}

/// External splat renderer/loader driven by the orchestrator.
///
/// All methods are synchronous from the core's perspective; long-running
/// loads complete in the background and are observed via
/// `viewer_metrics` polling. Implementations must not be called from more
/// than one logical flow at a time - the slots are shared surfaces.
pub trait ViewerHost {
    /// Start loading a file into a slot. Returns once the load is
    /// dispatched, not when it completes.
    fn load_file(&mut self, file: &SplatFile, slot: ViewerSlot) -> Result<()>;

    /// Current coarse metrics for a slot.
    fn viewer_metrics(&self, slot: ViewerSlot) -> ViewerMetrics;

    /// Camera/controls handle for a slot, `None` before the viewer exists.
    fn viewer_context(&mut self, slot: ViewerSlot) -> Option<&mut dyn ViewerContext>;

    /// Capture the slot's framebuffer as a top-down RGBA buffer.
    fn capture_frame(&mut self, slot: ViewerSlot) -> Result<PixelBuffer>;

    /// Frame-timing statistics for a slot when the host drives a
    /// `FrameStatsCollector`; `None` disables stability metrics in results.
    fn frame_stats(&self, _slot: ViewerSlot) -> Option<BenchmarkMetrics> {
        None
    }

    /// Persist a screenshot for one job, returning where it was written.
    /// Default implementation does not persist anything.
    fn save_screenshot(
        &mut self,
        _slot: ViewerSlot,
        _frame: &PixelBuffer,
        _test_id: &str,
    ) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}
