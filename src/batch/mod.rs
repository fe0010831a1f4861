//! Batch testing
//!
//! Expands a declarative test configuration into an ordered queue of
//! (scene, format, viewpoint, replicate) jobs and runs them sequentially
//! with per-job failure isolation. Partial failure never aborts a run.

pub mod host;
pub mod runner;

pub use host::{
    FormatError, SplatFile, SplatFormat, ViewerHost, ViewerMetrics, ViewerSlot,
};
pub use runner::{
    BatchError, BatchPlan, BatchRunner, BatchTuning, CancelToken, RunState, RunSummary,
};

use crate::camera::ViewpointPreset;
use crate::quality::ImageQualityMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Files for one scene: the uncompressed reference plus one test file per
/// format under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSceneConfig {
    pub scene_name: String,
    /// Path/URL of the reference file.
    pub reference_file: String,
    /// Format extension -> path of the compressed variant.
    pub test_files: BTreeMap<String, String>,
}

/// Declarative description of a whole batch run. Pure value; consumed
/// once to generate the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTestConfig {
    pub test_name: String,
    #[serde(default)]
    pub description: Option<String>,

    pub scenes: Vec<BatchSceneConfig>,
    /// e.g. "ply"
    pub reference_format: String,
    /// e.g. ["splat", "ksplat", "spz"]
    pub test_formats: Vec<String>,
    pub viewpoints: Vec<ViewpointPreset>,

    /// Captures per (scene, format, viewpoint) configuration.
    pub replicates: u32,
    /// Wait between consecutive jobs, in milliseconds.
    pub delay_between_captures_ms: u64,
    pub capture_quality_metrics: bool,
    pub capture_performance_metrics: bool,
    pub capture_screenshots: bool,
}

impl BatchTestConfig {
    /// Total job count of the full cross-product.
    pub fn total_tests(&self) -> usize {
        self.scenes.len()
            * self.test_formats.len()
            * self.viewpoints.len()
            * self.replicates as usize
    }
}

/// One queue entry. Replicates are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub scene: BatchSceneConfig,
    pub format: String,
    pub viewpoint: ViewpointPreset,
    pub replicate: u32,
}

impl BatchJob {
    /// Stable human-readable job identifier.
    pub fn test_id(&self) -> String {
        format!(
            "{}_{}_{}_r{}",
            self.scene.scene_name, self.format, self.viewpoint.id, self.replicate
        )
    }
}

/// Expand a configuration into the full ordered job queue.
///
/// Deterministic nested order: scene, then format, then viewpoint, then
/// replicate innermost. The whole queue is generated eagerly before
/// execution starts.
pub fn expand_queue(config: &BatchTestConfig) -> Vec<BatchJob> {
    let mut queue = Vec::with_capacity(config.total_tests());
    for scene in &config.scenes {
        for format in &config.test_formats {
            for viewpoint in &config.viewpoints {
                for replicate in 1..=config.replicates {
                    queue.push(BatchJob {
                        scene: scene.clone(),
                        format: format.clone(),
                        viewpoint: viewpoint.clone(),
                        replicate,
                    });
                }
            }
        }
    }
    queue
}

/// Outcome of one completed job. Appended to the result list and never
/// mutated afterwards; a failed job contributes no result at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub test_id: String,
    pub timestamp: DateTime<Utc>,

    pub scene_name: String,
    pub test_format: String,
    pub viewpoint_name: String,
    pub replicate_number: u32,

    /// Absent when quality capture was disabled for the run.
    pub quality: Option<ImageQualityMetrics>,

    pub load_time_ms: Option<f64>,
    pub fps: Option<f64>,
    pub fps_1_percent_low: Option<f64>,
    pub memory_mb: Option<f64>,
    pub frame_time_variance: Option<f64>,

    pub screenshot_path: Option<PathBuf>,

    pub environment: EnvironmentInfo,
}

/// Environment columns carried on every result record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub renderer_name: String,
    pub renderer_version: String,
    pub gpu: String,
}

/// Progress snapshot reported before each job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    pub total_tests: usize,
    pub completed_tests: usize,
    pub current_test: Option<CurrentTest>,
    /// Extrapolated from elapsed time over completed jobs, in seconds.
    pub estimated_time_remaining_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentTest {
    pub scene: String,
    pub format: String,
    pub viewpoint: String,
    pub replicate: u32,
}

impl From<&BatchJob> for CurrentTest {
    fn from(job: &BatchJob) -> Self {
        Self {
            scene: job.scene.scene_name.clone(),
            format: job.format.clone(),
            viewpoint: job.viewpoint.name.clone(),
            replicate: job.replicate,
        }
    }
}

fn base_config(test_name: &str, description: &str) -> BatchTestConfig {
    BatchTestConfig {
        test_name: test_name.to_string(),
        description: Some(description.to_string()),
        scenes: Vec::new(),
        reference_format: "ply".to_string(),
        test_formats: Vec::new(),
        viewpoints: Vec::new(),
        replicates: 1,
        delay_between_captures_ms: 500,
        capture_quality_metrics: true,
        capture_performance_metrics: true,
        capture_screenshots: false,
    }
}

/// Predefined test templates. Scenes and viewpoints are filled in by the
/// caller based on what is available.
pub mod templates {
    use super::{base_config, BatchTestConfig};
    use crate::camera::standard_viewpoints;

    /// Fast 2-viewpoint, 1-replicate smoke test (~2-5 min).
    pub fn quick_validation() -> BatchTestConfig {
        let mut config = base_config(
            "quick-validation",
            "Fast validation (2 viewpoints, 1 replicate)",
        );
        config.test_formats = vec!["splat".into(), "spz".into()];
        config.viewpoints = standard_viewpoints().into_iter().take(2).collect();
        config.delay_between_captures_ms = 200;
        config
    }

    /// All formats across scenes, 2 replicates (~10-20 min).
    pub fn format_comparison() -> BatchTestConfig {
        let mut config = base_config(
            "format-comparison",
            "Compare all formats across scenes (3 viewpoints, 2 replicates)",
        );
        config.test_formats = vec!["splat".into(), "ksplat".into(), "spz".into()];
        config.viewpoints = standard_viewpoints().into_iter().take(3).collect();
        config.replicates = 2;
        config.capture_screenshots = true;
        config
    }

    /// Complete evaluation for paper submissions (~1-2 hours).
    pub fn paper_evaluation() -> BatchTestConfig {
        let mut config = base_config(
            "paper-evaluation",
            "Complete benchmark (5 viewpoints, 3 replicates)",
        );
        config.test_formats = vec!["splat".into(), "ksplat".into(), "spz".into()];
        config.viewpoints = standard_viewpoints();
        config.replicates = 3;
        config.capture_screenshots = true;
        config
    }

    /// FPS/memory focus with extra replicates; quality capture disabled.
    pub fn performance_profiling() -> BatchTestConfig {
        let mut config = base_config(
            "performance-profile",
            "FPS/memory profiling with 5 replicates (2 viewpoints)",
        );
        config.test_formats = vec!["splat".into(), "ksplat".into(), "spz".into()];
        config.viewpoints = standard_viewpoints().into_iter().take(2).collect();
        config.replicates = 5;
        config.delay_between_captures_ms = 1000;
        config.capture_quality_metrics = false;
        config
    }

    /// Deep evaluation of one format across all scenes.
    pub fn single_format(format: &str) -> BatchTestConfig {
        let mut config = base_config(
            "single-format",
            "Deep evaluation of one format across all scenes",
        );
        config.test_formats = vec![format.to_string()];
        config.viewpoints = standard_viewpoints();
        config.replicates = 3;
        config.capture_screenshots = true;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::{expand_queue, templates, BatchSceneConfig, BatchTestConfig};
    use crate::camera::standard_viewpoints;
    use std::collections::BTreeMap;

    pub(crate) fn scene(name: &str, formats: &[&str]) -> BatchSceneConfig {
        let mut test_files = BTreeMap::new();
        for format in formats {
            test_files.insert(format.to_string(), format!("{name}.{format}"));
        }
        BatchSceneConfig {
            scene_name: name.to_string(),
            reference_file: format!("{name}.ply"),
            test_files,
        }
    }

    pub(crate) fn two_scene_config() -> BatchTestConfig {
        BatchTestConfig {
            test_name: "test".to_string(),
            description: None,
            scenes: vec![scene("bonsai", &["splat", "spz"]), scene("truck", &["splat", "spz"])],
            reference_format: "ply".to_string(),
            test_formats: vec!["splat".to_string(), "spz".to_string()],
            viewpoints: standard_viewpoints().into_iter().take(3).collect(),
            replicates: 2,
            delay_between_captures_ms: 100,
            capture_quality_metrics: true,
            capture_performance_metrics: true,
            capture_screenshots: false,
        }
    }

    #[test]
    fn queue_size_is_the_full_cross_product() {
        let config = two_scene_config();
        let queue = expand_queue(&config);
        assert_eq!(queue.len(), 2 * 2 * 3 * 2);
        assert_eq!(queue.len(), config.total_tests());
    }

    #[test]
    fn queue_order_nests_replicate_innermost() {
        let config = two_scene_config();
        let queue = expand_queue(&config);

        // First jobs: same scene/format/viewpoint, replicates 1 then 2.
        assert_eq!(queue[0].scene.scene_name, "bonsai");
        assert_eq!(queue[0].format, "splat");
        assert_eq!(queue[0].viewpoint.id, "front");
        assert_eq!(queue[0].replicate, 1);
        assert_eq!(queue[1].replicate, 2);
        // Then the next viewpoint.
        assert_eq!(queue[2].viewpoint.id, "close");
        // Formats change only after all viewpoints for the scene.
        assert_eq!(queue[6].format, "spz");
        // Second scene starts at the halfway point.
        assert_eq!(queue[12].scene.scene_name, "truck");
    }

    #[test]
    fn empty_axes_produce_empty_queue() {
        let mut config = two_scene_config();
        config.test_formats.clear();
        assert!(expand_queue(&config).is_empty());
    }

    #[test]
    fn test_id_is_stable_and_descriptive() {
        let queue = expand_queue(&two_scene_config());
        assert_eq!(queue[0].test_id(), "bonsai_splat_front_r1");
    }

    #[test]
    fn templates_have_expected_shape() {
        let quick = templates::quick_validation();
        assert_eq!(quick.viewpoints.len(), 2);
        assert_eq!(quick.replicates, 1);
        assert!(quick.capture_quality_metrics);

        // Front, close-up and wide views only.
        let comparison = templates::format_comparison();
        assert_eq!(comparison.viewpoints.len(), 3);
        assert_eq!(comparison.replicates, 2);

        let paper = templates::paper_evaluation();
        assert_eq!(paper.viewpoints.len(), 5);
        assert_eq!(paper.replicates, 3);
        assert!(paper.capture_screenshots);

        let perf = templates::performance_profiling();
        assert!(!perf.capture_quality_metrics);
        assert_eq!(perf.replicates, 5);

        let single = templates::single_format("spz");
        assert_eq!(single.test_formats, vec!["spz".to_string()]);
    }

    #[test]
    fn standard_viewpoints_feed_template_queues() {
        let mut config = templates::format_comparison();
        config.scenes = vec![scene("garden", &["splat", "ksplat", "spz"])];
        let queue = expand_queue(&config);
        assert_eq!(queue.len(), 1 * 3 * 3 * 2);
        assert_eq!(queue.len(), config.total_tests());
        assert_eq!(queue[0].viewpoint.id, standard_viewpoints()[0].id);
    }
}
