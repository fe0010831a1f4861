//! Framebuffer capture adapter
//!
//! Bridges a live rendering surface to the quality comparator. The GPU
//! context itself is an external collaborator behind the `RenderSurface`
//! trait; this module owns the capture ordering (force render, flush,
//! read back) and the mandatory vertical-flip correction.

use crate::quality::PixelBuffer;
use anyhow::{Context, Result};

/// Handle to a live rendering surface owned by the host.
///
/// `read_pixels` returns the raw framebuffer in GPU order: bottom-up rows,
/// RGBA8. The adapter re-orients it; implementations must not flip.
pub trait RenderSurface {
    /// Current framebuffer size as (width, height).
    fn dimensions(&self) -> (u32, u32);

    /// Issue a draw of the latest scene state.
    fn force_render(&mut self) -> Result<()>;

    /// Flush queued GPU commands so the subsequent read observes them.
    fn flush(&mut self) -> Result<()>;

    /// Read the raw bottom-up RGBA framebuffer.
    fn read_pixels(&mut self) -> Result<Vec<u8>>;
}

/// Capture a pixel buffer from a live surface.
///
/// Suspends once so the capture lands on the next scheduler tick, the
/// analog of waiting for the host's frame boundary. With `force_render`
/// set, a render plus flush is issued immediately before the readback to
/// avoid racing the asynchronous GPU command queue. Surface errors
/// (context lost, readback failure) propagate to the caller; nothing is
/// swallowed here.
pub async fn capture_surface<S: RenderSurface + ?Sized>(
    surface: &mut S,
    force_render: bool,
) -> Result<PixelBuffer> {
    // Frame boundary: let already-scheduled rendering work run first.
    tokio::task::yield_now().await;

    if force_render {
        surface.force_render().context("force render before capture")?;
        surface.flush().context("GPU flush before readback")?;
    }

    let (width, height) = surface.dimensions();
    let raw = surface.read_pixels().context("framebuffer readback")?;
    let flipped = flip_rows(width, height, raw)?;
    PixelBuffer::from_rgba(width, height, flipped).map_err(Into::into)
}

/// Reorder bottom-up framebuffer rows into top-down row order.
///
/// Skipping this produces structurally mirrored buffers and meaningless
/// PSNR/SSIM on any non-symmetric scene.
pub fn flip_rows(width: u32, height: u32, raw: Vec<u8>) -> Result<Vec<u8>> {
    let row_bytes = width as usize * 4;
    let expected = row_bytes * height as usize;
    anyhow::ensure!(
        raw.len() == expected,
        "framebuffer length {} does not match {}x{} RGBA",
        raw.len(),
        width,
        height
    );

    let mut flipped = vec![0u8; raw.len()];
    for y in 0..height as usize {
        let src = (height as usize - 1 - y) * row_bytes;
        flipped[y * row_bytes..(y + 1) * row_bytes]
            .copy_from_slice(&raw[src..src + row_bytes]);
    }
    Ok(flipped)
}
