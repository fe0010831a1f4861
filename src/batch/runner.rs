//! Batch run execution
//!
//! Strictly sequential job loop over the shared viewer slots: no two jobs
//! ever overlap, and no job starts before the previous one's capture and
//! inter-job delay have finished. Concurrent loads would corrupt the two
//! rendering surfaces, which are singletons on the host side.
//!
//! Load completion is observed by polling: a file counts as loaded once
//! its splat count is nonzero and unchanged across
//! `BatchTuning::stable_polls` consecutive polls, or the job fails after
//! `BatchTuning::load_timeout_ms`. Cancellation is cooperative - a shared
//! flag checked at the top of the job loop and inside the poll loop, so a
//! request can take up to one poll interval to be observed.

use super::host::{SplatFile, ViewerHost, ViewerSlot};
use super::{
    expand_queue, BatchJob, BatchProgress, BatchResult, BatchTestConfig, CurrentTest,
    EnvironmentInfo,
};
use crate::camera::{apply_viewpoint, scaled_for_scene};
use crate::quality::{self, ImageQualityMetrics, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rough per-job wall time used for queue estimates before any job has
/// run (load + stabilization + capture).
const ESTIMATED_SECS_PER_JOB: f64 = 30.0;

/// Cooperative cancellation token shared between the orchestrator and
/// whoever wants to stop it. Cancelling is idempotent and never discards
/// results already collected.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Tunable orchestration constants. These are deliberate parameters, not
/// hidden magic numbers; the defaults mirror the documented protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTuning {
    /// Load-wait poll tick in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive polls with an unchanged nonzero splat count required
    /// to call a load complete.
    #[serde(default = "default_stable_polls")]
    pub stable_polls: u32,

    /// Per-file load timeout in milliseconds; hitting it fails that job
    /// only, never the whole run.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Settle delay after dispatching a load, before polling starts.
    #[serde(default = "default_post_dispatch_delay_ms")]
    pub post_dispatch_delay_ms: u64,

    /// Fixed wait after applying a viewpoint, before capture. Compensates
    /// for streaming decode and camera-damping settle time.
    #[serde(default = "default_stabilization_delay_ms")]
    pub stabilization_delay_ms: u64,
}

impl Default for BatchTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stable_polls: default_stable_polls(),
            load_timeout_ms: default_load_timeout_ms(),
            post_dispatch_delay_ms: default_post_dispatch_delay_ms(),
            stabilization_delay_ms: default_stabilization_delay_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stable_polls() -> u32 {
    5
}

fn default_load_timeout_ms() -> u64 {
    60_000
}

fn default_post_dispatch_delay_ms() -> u64 {
    500
}

fn default_stabilization_delay_ms() -> u64 {
    2_000
}

/// Run lifecycle. Only one run may be active per runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Complete,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum BatchError {
    /// A second run was started while one is active. Rejected up front
    /// with no partial state change.
    #[error("a batch run is already in progress")]
    AlreadyRunning,
}

/// Job-level failure. Caught by the run loop, logged, and swallowed so
/// the run continues; `Aborted` is the one variant that ends the loop.
#[derive(Debug, Error)]
enum JobError {
    #[error("no test file configured for scene '{scene}' in format '{format}'")]
    MissingTestFile { scene: String, format: String },

    #[error(transparent)]
    Format(#[from] super::host::FormatError),

    #[error("failed to dispatch load of {file}: {source}")]
    LoadDispatch {
        file: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("load timeout for {file}; final state: {splat_count} splats")]
    LoadTimeout { file: String, splat_count: u64 },

    #[error("run cancelled")]
    Aborted,
}

/// Aggregate outcome of one run. Per-job failures surface here only as a
/// count; individual errors have already been logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Preview of a planned run. Produced without any host attached - this is
/// the degraded/offline mode for demonstration, and `executed` is always
/// false so it cannot be mistaken for a result set.
#[derive(Debug, Clone, Serialize)]
pub struct BatchPlan {
    pub run_id: Uuid,
    pub total_tests: usize,
    pub estimated_duration_secs: f64,
    pub executed: bool,
    pub jobs: Vec<CurrentTest>,
}

type ProgressCallback = Box<dyn FnMut(BatchProgress) + Send>;

/// Drives one batch configuration through its job queue.
///
/// Constructible from a configuration alone; queue, plan and progress are
/// available immediately, while `run` additionally needs a live
/// `ViewerHost`.
pub struct BatchRunner {
    run_id: Uuid,
    config: BatchTestConfig,
    queue: Vec<BatchJob>,
    results: Vec<BatchResult>,
    current_index: usize,
    state: RunState,
    tuning: BatchTuning,
    environment: EnvironmentInfo,
    progress_callback: Option<ProgressCallback>,
}

impl BatchRunner {
    /// Expand the configuration into its job queue eagerly.
    pub fn new(config: BatchTestConfig) -> Self {
        let queue = expand_queue(&config);
        Self {
            run_id: Uuid::new_v4(),
            config,
            queue,
            results: Vec::new(),
            current_index: 0,
            state: RunState::Idle,
            tuning: BatchTuning::default(),
            environment: EnvironmentInfo::default(),
            progress_callback: None,
        }
    }

    pub fn with_tuning(mut self, tuning: BatchTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Environment columns stamped onto every result record.
    pub fn with_environment(mut self, environment: EnvironmentInfo) -> Self {
        self.environment = environment;
        self
    }

    /// Register a progress observer, called before each job starts.
    pub fn on_progress(&mut self, callback: impl FnMut(BatchProgress) + Send + 'static) {
        self.progress_callback = Some(Box::new(callback));
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn queue(&self) -> &[BatchJob] {
        &self.queue
    }

    pub fn total_jobs(&self) -> usize {
        self.queue.len()
    }

    /// Results collected so far. Grows monotonically during a run and is
    /// retained across cancellation.
    pub fn results(&self) -> &[BatchResult] {
        &self.results
    }

    /// Offline preview of the planned run; works without a host.
    pub fn preview(&self) -> BatchPlan {
        BatchPlan {
            run_id: self.run_id,
            total_tests: self.queue.len(),
            estimated_duration_secs: self.queue.len() as f64 * ESTIMATED_SECS_PER_JOB,
            executed: false,
            jobs: self.queue.iter().map(CurrentTest::from).collect(),
        }
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> BatchProgress {
        BatchProgress {
            total_tests: self.queue.len(),
            completed_tests: self.current_index,
            current_test: self.queue.get(self.current_index).map(CurrentTest::from),
            estimated_time_remaining_secs: 0.0,
        }
    }

    fn begin(&mut self) -> Result<(), BatchError> {
        if self.state == RunState::Running {
            return Err(BatchError::AlreadyRunning);
        }
        self.state = RunState::Running;
        self.results.clear();
        self.current_index = 0;
        Ok(())
    }

    fn report_progress(&mut self, started: Instant, index: usize, job: &BatchJob) {
        let total = self.queue.len();
        let elapsed = started.elapsed().as_secs_f64();
        let avg_per_job = elapsed / (index + 1) as f64;
        let remaining = (total - index - 1) as f64 * avg_per_job;

        let progress = BatchProgress {
            total_tests: total,
            completed_tests: index,
            current_test: Some(CurrentTest::from(job)),
            estimated_time_remaining_secs: remaining,
        };
        if let Some(callback) = self.progress_callback.as_mut() {
            callback(progress);
        }
    }

    /// Execute every queued job in order.
    ///
    /// Per-job failures are logged and skipped; the run continues.
    /// Cancellation ends the loop at the next check point and keeps the
    /// results collected so far. Fails only when a run is already active.
    pub async fn run(
        &mut self,
        host: &mut dyn ViewerHost,
        cancel: &CancelToken,
    ) -> Result<RunSummary, BatchError> {
        self.begin()?;
        let total = self.queue.len();
        let started = Instant::now();
        let mut failed = 0usize;
        let mut cancelled = false;

        info!(run_id = %self.run_id, total, "batch run started");

        for index in 0..total {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.current_index = index;
            let job = self.queue[index].clone();
            self.report_progress(started, index, &job);

            let outcome = execute_job(
                host,
                &self.config,
                &self.tuning,
                &self.environment,
                &job,
                cancel,
            )
            .await;
            match outcome {
                Ok(result) => {
                    debug!(test_id = %result.test_id, "job complete");
                    self.results.push(result);
                    // Inter-capture delay applies after completed jobs only.
                    if index + 1 < total {
                        sleep(Duration::from_millis(self.config.delay_between_captures_ms))
                            .await;
                    }
                }
                Err(JobError::Aborted) => {
                    cancelled = true;
                    break;
                }
                Err(err) => {
                    // Partial failure never aborts the batch.
                    failed += 1;
                    warn!(test_id = %job.test_id(), error = %err, "job failed; continuing");
                }
            }
        }

        cancelled = cancelled || cancel.is_cancelled();
        self.state = if cancelled {
            RunState::Cancelled
        } else {
            RunState::Complete
        };
        self.current_index = self.results.len() + failed;

        let summary = RunSummary {
            total,
            completed: self.results.len(),
            failed,
            cancelled,
        };
        info!(
            run_id = %self.run_id,
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "batch run finished"
        );
        Ok(summary)
    }
}

async fn execute_job(
    host: &mut dyn ViewerHost,
    config: &BatchTestConfig,
    tuning: &BatchTuning,
    environment: &EnvironmentInfo,
    job: &BatchJob,
    cancel: &CancelToken,
) -> Result<BatchResult, JobError> {
    let reference = SplatFile::from_path(&job.scene.reference_file, 0)?;
    let test_path =
        job.scene
            .test_files
            .get(&job.format)
            .ok_or_else(|| JobError::MissingTestFile {
                scene: job.scene.scene_name.clone(),
                format: job.format.clone(),
            })?;
    let test_file = SplatFile::from_path(test_path, 0)?;

    load_into_slot(host, &reference, ViewerSlot::A, tuning, cancel).await?;
    load_into_slot(host, &test_file, ViewerSlot::B, tuning, cancel).await?;

    // Position both cameras identically, scaled for the scene.
    let viewpoint = scaled_for_scene(&job.viewpoint, &job.scene.scene_name);
    for slot in [ViewerSlot::A, ViewerSlot::B] {
        if let Some(context) = host.viewer_context(slot) {
            apply_viewpoint(context, &viewpoint);
        }
    }

    sleep(Duration::from_millis(tuning.stabilization_delay_ms)).await;
    if cancel.is_cancelled() {
        return Err(JobError::Aborted);
    }

    let test_id = job.test_id();
    let mut result = BatchResult {
        test_id: test_id.clone(),
        timestamp: chrono::Utc::now(),
        scene_name: job.scene.scene_name.clone(),
        test_format: job.format.clone(),
        viewpoint_name: job.viewpoint.name.clone(),
        replicate_number: job.replicate,
        quality: None,
        load_time_ms: None,
        fps: None,
        fps_1_percent_low: None,
        memory_mb: None,
        frame_time_variance: None,
        screenshot_path: None,
        environment: environment.clone(),
    };

    if config.capture_performance_metrics {
        let viewer = host.viewer_metrics(ViewerSlot::B);
        result.load_time_ms = Some(viewer.load_time_ms);
        result.fps = Some(viewer.fps);
        result.memory_mb = Some(viewer.memory_mb);
        if let Some(stats) = host.frame_stats(ViewerSlot::B) {
            result.fps = Some(stats.fps);
            result.fps_1_percent_low = Some(stats.fps_1_percent_low);
            result.frame_time_variance = Some(stats.frame_time_variance);
        }
    }

    if config.capture_quality_metrics {
        // A comparison failure degrades this result, not the job.
        let (quality, test_frame) = match capture_pair(host) {
            Ok((frame_a, frame_b)) => (quality::compare(&frame_a, &frame_b), Some(frame_b)),
            Err(err) => {
                warn!(test_id = %test_id, error = %err, "quality capture failed");
                (ImageQualityMetrics::failed(format!("{err:#}")), None)
            }
        };
        result.quality = Some(quality);

        if config.capture_screenshots {
            if let Some(frame) = test_frame.as_ref() {
                result.screenshot_path = save_screenshot(host, frame, &test_id);
            }
        }
    } else if config.capture_screenshots {
        match host.capture_frame(ViewerSlot::B) {
            Ok(frame) => result.screenshot_path = save_screenshot(host, &frame, &test_id),
            Err(err) => warn!(test_id = %test_id, error = %err, "screenshot capture failed"),
        }
    }

    Ok(result)
}

fn capture_pair(host: &mut dyn ViewerHost) -> anyhow::Result<(PixelBuffer, PixelBuffer)> {
    let frame_a = host.capture_frame(ViewerSlot::A)?;
    let frame_b = host.capture_frame(ViewerSlot::B)?;
    Ok((frame_a, frame_b))
}

fn save_screenshot(
    host: &mut dyn ViewerHost,
    frame: &PixelBuffer,
    test_id: &str,
) -> Option<std::path::PathBuf> {
    match host.save_screenshot(ViewerSlot::B, frame, test_id) {
        Ok(path) => path,
        Err(err) => {
            warn!(test_id, error = %err, "screenshot save failed");
            None
        }
    }
}

async fn load_into_slot(
    host: &mut dyn ViewerHost,
    file: &SplatFile,
    slot: ViewerSlot,
    tuning: &BatchTuning,
    cancel: &CancelToken,
) -> Result<(), JobError> {
    host.load_file(file, slot)
        .map_err(|source| JobError::LoadDispatch {
            file: file.name.clone(),
            source,
        })?;
    sleep(Duration::from_millis(tuning.post_dispatch_delay_ms)).await;
    wait_for_load(host, slot, &file.name, tuning, cancel).await?;
    Ok(())
}

/// Poll a slot until its load settles or the timeout elapses.
///
/// Completion requires a nonzero load time and a splat count that stays
/// unchanged for `stable_polls` consecutive ticks - progressive decoders
/// keep growing the count while streaming.
async fn wait_for_load(
    host: &mut dyn ViewerHost,
    slot: ViewerSlot,
    file_name: &str,
    tuning: &BatchTuning,
    cancel: &CancelToken,
) -> Result<(), JobError> {
    let mut waited_ms = 0u64;
    let mut last_splat_count = 0u64;
    let mut stable_count = 0u32;

    while waited_ms < tuning.load_timeout_ms {
        if cancel.is_cancelled() {
            return Err(JobError::Aborted);
        }

        let metrics = host.viewer_metrics(slot);
        if metrics.load_time_ms > 0.0 && metrics.splat_count > 0 {
            if metrics.splat_count == last_splat_count {
                stable_count += 1;
                if stable_count >= tuning.stable_polls {
                    debug!(
                        file = file_name,
                        slot = %slot,
                        splats = metrics.splat_count,
                        "load settled"
                    );
                    return Ok(());
                }
            } else {
                stable_count = 0;
                last_splat_count = metrics.splat_count;
            }
        }

        sleep(Duration::from_millis(tuning.poll_interval_ms)).await;
        waited_ms += tuning.poll_interval_ms;
    }

    let final_metrics = host.viewer_metrics(slot);
    Err(JobError::LoadTimeout {
        file: file_name.to_string(),
        splat_count: final_metrics.splat_count,
    })
}
