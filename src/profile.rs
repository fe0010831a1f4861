//! Rendering-environment profiling
//!
//! Every exported record carries the environment it was measured in, so
//! results from different machines and renderers stay comparable. The
//! host supplies renderer and GPU identity when it has them; the sysinfo
//! fallback fills in platform and memory for headless or test setups.

use crate::batch::EnvironmentInfo;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Minimum device memory (GB) before large scenes become an OOM risk.
const LOW_MEMORY_THRESHOLD_GB: f64 = 4.0;

/// Read-once snapshot of the rendering environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    /// Renderer/engine embedding the benchmark, e.g. "Chrome".
    pub renderer_name: String,
    pub renderer_version: String,
    /// Underlying engine family, e.g. "Blink" or "WebKit".
    pub renderer_engine: String,
    /// OS or runtime platform string.
    pub platform: String,
    /// GPU adapter string as reported by the graphics stack.
    pub gpu: String,
    /// Graphics API tier, e.g. "WebGL 2.0"; "None" when unavailable.
    pub graphics_api: String,
    /// e.g. "1920x1080".
    pub screen_resolution: String,
    pub device_pixel_ratio: f64,
    /// Total device memory in GB, when the platform exposes it.
    pub device_memory_gb: Option<f64>,
}

impl Default for EnvironmentProfile {
    fn default() -> Self {
        Self {
            renderer_name: "Unknown".to_string(),
            renderer_version: "Unknown".to_string(),
            renderer_engine: "Unknown".to_string(),
            platform: "Unknown".to_string(),
            gpu: "Unknown".to_string(),
            graphics_api: "None".to_string(),
            screen_resolution: "Unknown".to_string(),
            device_pixel_ratio: 1.0,
            device_memory_gb: None,
        }
    }
}

/// Result of the pre-benchmark environment check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReadiness {
    pub ready: bool,
    pub issues: Vec<String>,
}

impl EnvironmentProfile {
    /// Probe the local machine for platform and memory. Renderer and GPU
    /// identity stay "Unknown"; only a live host can report those.
    pub fn host_snapshot() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let platform = match (System::name(), System::os_version()) {
            (Some(name), Some(version)) => format!("{name} {version}"),
            (Some(name), None) => name,
            _ => "Unknown".to_string(),
        };
        let device_memory_gb = match sys.total_memory() {
            0 => None,
            bytes => Some(bytes as f64 / (1024.0 * 1024.0 * 1024.0)),
        };

        Self {
            platform,
            device_memory_gb,
            ..Self::default()
        }
    }

    /// One-line form for logs and result headers.
    pub fn summary_line(&self) -> String {
        format!(
            "{} {} | {} | {}",
            self.renderer_name, self.renderer_version, self.gpu, self.graphics_api
        )
    }

    /// Check whether this environment will produce trustworthy numbers.
    /// Issues are advisory; running anyway is allowed.
    pub fn readiness(&self) -> BenchmarkReadiness {
        let mut issues = Vec::new();

        if self.renderer_name == "Unknown" {
            issues.push("Unknown renderer - results may be unreliable".to_string());
        }
        if self.gpu == "Unknown" {
            issues.push("GPU not detected - rendering may not be hardware accelerated".to_string());
        }
        if self.graphics_api == "None" {
            issues.push("No graphics API available - splat rendering will fail".to_string());
        }
        if let Some(memory_gb) = self.device_memory_gb {
            if memory_gb < LOW_MEMORY_THRESHOLD_GB {
                issues.push(format!(
                    "Low device memory ({memory_gb:.0}GB) - may cause OOM on large scenes"
                ));
            }
        }

        BenchmarkReadiness {
            ready: issues.is_empty(),
            issues,
        }
    }

    /// The subset stamped onto batch result rows.
    pub fn environment_info(&self) -> EnvironmentInfo {
        EnvironmentInfo {
            renderer_name: self.renderer_name.clone(),
            renderer_version: self.renderer_version.clone(),
            gpu: self.gpu.clone(),
        }
    }
}
