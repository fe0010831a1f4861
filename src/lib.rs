//! gsbench - measurement core for compressed Gaussian-splat benchmarking
//!
//! Everything needed to compare compressed 3D Gaussian-splat formats
//! against an uncompressed reference: frame-timing statistics, image
//! quality metrics (PSNR/SSIM), canonical camera viewpoints, a batch
//! orchestrator that drives two viewer slots through a test matrix, and
//! CSV export of the results.
//!
//! The renderer itself is an external collaborator: hosts implement
//! [`batch::ViewerHost`] (load files, report metrics, hand out camera
//! handles, capture frames) and [`capture::RenderSurface`] (raw
//! framebuffer access), and the core stays renderer-agnostic.
//!
//! Typical flow:
//! 1. Build a [`batch::BatchTestConfig`] (or start from a
//!    [`batch::templates`] preset) and hand it to a [`batch::BatchRunner`].
//! 2. `run` it against a host with a [`batch::CancelToken`].
//! 3. Export with [`export::batch_results_to_csv`] and aggregate with
//!    [`export::summarize`].

pub mod batch;
pub mod camera;
pub mod capture;
pub mod export;
pub mod metrics;
pub mod profile;
pub mod quality;

pub use batch::{BatchRunner, BatchTestConfig, CancelToken, ViewerHost};
pub use metrics::{BenchmarkMetrics, FrameStatsCollector};
pub use quality::{compare, ImageQualityMetrics, PixelBuffer};
