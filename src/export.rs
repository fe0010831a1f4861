//! CSV export and summary statistics
//!
//! Two export shapes: the compact per-job batch CSV with a fixed
//! 16-column layout that downstream analysis scripts key on, and the
//! detailed single-comparison record with reference and test metrics
//! side by side for reproducibility audits. Column order is part of the
//! contract; never reorder.

use crate::batch::BatchResult;
use crate::camera::ViewpointPreset;
use crate::metrics::BenchmarkMetrics;
use crate::profile::EnvironmentProfile;
use crate::quality::ImageQualityMetrics;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::path::Path;

/// Batch CSV column set, in contract order.
const BATCH_CSV_COLUMNS: [&str; 16] = [
    "timestamp",
    "testId",
    "sceneName",
    "testFormat",
    "viewpointName",
    "replicateNumber",
    "psnr",
    "ssim",
    "loadTimeMs",
    "fps",
    "fps1PercentLow",
    "memoryMB",
    "frameTimeVariance",
    "browserName",
    "browserVersion",
    "gpu",
];

/// Render an optional metric for a CSV field: absent values become empty
/// fields, infinite PSNR is spelled out so spreadsheets keep the row.
fn number_field(value: Option<f64>) -> String {
    match value {
        Some(v) if v == f64::INFINITY => "Infinity".to_string(),
        Some(v) if v == f64::NEG_INFINITY => "-Infinity".to_string(),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// Serialize batch results to the 16-column CSV.
///
/// An empty result set yields an empty string, not a lone header row.
pub fn batch_results_to_csv(results: &[BatchResult]) -> Result<String> {
    if results.is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    writer.write_record(BATCH_CSV_COLUMNS)?;

    for result in results {
        let quality = result.quality.as_ref();
        writer.write_record(&[
            result
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            result.test_id.clone(),
            result.scene_name.clone(),
            result.test_format.clone(),
            result.viewpoint_name.clone(),
            result.replicate_number.to_string(),
            number_field(quality.and_then(|q| q.psnr)),
            number_field(quality.and_then(|q| q.ssim)),
            number_field(result.load_time_ms),
            number_field(result.fps),
            number_field(result.fps_1_percent_low),
            number_field(result.memory_mb),
            number_field(result.frame_time_variance),
            result.environment.renderer_name.clone(),
            result.environment.renderer_version.clone(),
            result.environment.gpu.clone(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("finalize csv writer: {err}"))?;
    String::from_utf8(bytes).context("csv output was not valid UTF-8")
}

/// Aggregate statistics for one (scene, format) group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatSummary {
    pub scene_name: String,
    pub test_format: String,
    /// Results in the group, including those with missing metrics.
    pub count: usize,
    pub avg_psnr: f64,
    pub std_psnr: f64,
    pub avg_ssim: f64,
    pub std_ssim: f64,
    pub avg_fps: f64,
    pub avg_load_time_ms: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; fewer than two samples yields 0.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Group results by (scene, format) and average their metrics.
///
/// Groups appear in first-encounter order and cover the full cross
/// product of scenes and formats seen in the input, so a format that
/// failed every job in one scene still shows up with count 0 and zeroed
/// stats. Only missing metrics are filtered before averaging; infinite
/// PSNR samples stay in and make the mean infinite.
pub fn summarize(results: &[BatchResult]) -> Vec<FormatSummary> {
    let mut scenes: Vec<&str> = Vec::new();
    let mut formats: Vec<&str> = Vec::new();
    for result in results {
        if !scenes.contains(&result.scene_name.as_str()) {
            scenes.push(&result.scene_name);
        }
        if !formats.contains(&result.test_format.as_str()) {
            formats.push(&result.test_format);
        }
    }

    let mut summaries = Vec::with_capacity(scenes.len() * formats.len());
    for scene in &scenes {
        for format in &formats {
            let group: Vec<&BatchResult> = results
                .iter()
                .filter(|r| r.scene_name == *scene && r.test_format == *format)
                .collect();

            let psnrs: Vec<f64> = group
                .iter()
                .filter_map(|r| r.quality.as_ref().and_then(|q| q.psnr))
                .collect();
            let ssims: Vec<f64> = group
                .iter()
                .filter_map(|r| r.quality.as_ref().and_then(|q| q.ssim))
                .collect();
            let fpses: Vec<f64> = group.iter().filter_map(|r| r.fps).collect();
            let load_times: Vec<f64> = group.iter().filter_map(|r| r.load_time_ms).collect();

            summaries.push(FormatSummary {
                scene_name: scene.to_string(),
                test_format: format.to_string(),
                count: group.len(),
                avg_psnr: mean(&psnrs),
                std_psnr: std_dev(&psnrs),
                avg_ssim: mean(&ssims),
                std_ssim: std_dev(&ssims),
                avg_fps: mean(&fpses),
                avg_load_time_ms: mean(&load_times),
            });
        }
    }
    summaries
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Detailed single-comparison export row: reference and test metrics side
/// by side, plus full environment metadata for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    pub timestamp: String,
    pub test_id: String,
    pub scene_name: String,

    pub reference_format: String,
    pub test_format: String,
    pub file_size_reference_mb: f64,
    pub file_size_test_mb: f64,
    pub compression_ratio: f64,

    pub viewpoint_name: String,
    pub camera_distance: f64,
    /// JSON object `{"x":..,"y":..,"z":..}`; the writer quotes it.
    pub camera_position: String,

    /// Pre-formatted: empty when unavailable, "Infinity" for identical frames.
    pub psnr_db: String,
    pub ssim: String,

    pub fps_reference: f64,
    pub frame_time_ms_reference: f64,
    pub memory_mb_reference: f64,
    pub load_time_ms_reference: f64,
    pub fps_1_percent_low_reference: f64,
    pub frame_time_variance_reference: f64,

    pub fps_test: f64,
    pub frame_time_ms_test: f64,
    pub memory_mb_test: f64,
    pub load_time_ms_test: f64,
    pub fps_1_percent_low_test: f64,
    pub frame_time_variance_test: f64,

    pub renderer_name: String,
    pub renderer_version: String,
    pub renderer_engine: String,
    pub platform: String,
    pub gpu: String,
    pub graphics_api: String,
    pub screen_resolution: String,
    pub device_pixel_ratio: f64,

    pub splat_count_reference: u64,
    pub splat_count_test: u64,

    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl ExportRecord {
    /// Build a record from one finished comparison. Memory figures come
    /// from the viewer rather than the frame collector. `test_id`
    /// defaults to `{scene}_{format}_{millis}` when not supplied.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scene_name: &str,
        reference_format: &str,
        test_format: &str,
        viewpoint: &ViewpointPreset,
        reference: &BenchmarkMetrics,
        test: &BenchmarkMetrics,
        memory_mb: (f64, f64),
        quality: &ImageQualityMetrics,
        environment: &EnvironmentProfile,
        test_id: Option<String>,
    ) -> Self {
        const MB: f64 = 1024.0 * 1024.0;
        let now = Utc::now();
        let compression_ratio = if test.file_size_bytes > 0 {
            reference.file_size_bytes as f64 / test.file_size_bytes as f64
        } else {
            0.0
        };
        let position = viewpoint.position;
        let camera_position = serde_json::json!({
            "x": position.x,
            "y": position.y,
            "z": position.z,
        })
        .to_string();

        Self {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            test_id: test_id.unwrap_or_else(|| {
                format!("{scene_name}_{test_format}_{}", now.timestamp_millis())
            }),
            scene_name: scene_name.to_string(),
            reference_format: reference_format.to_string(),
            test_format: test_format.to_string(),
            file_size_reference_mb: round2(reference.file_size_bytes as f64 / MB),
            file_size_test_mb: round2(test.file_size_bytes as f64 / MB),
            compression_ratio: round2(compression_ratio),
            viewpoint_name: viewpoint.name.clone(),
            camera_distance: round2(position.length()),
            camera_position,
            psnr_db: match quality.psnr {
                Some(psnr) if psnr.is_infinite() => "Infinity".to_string(),
                Some(psnr) => format!("{psnr:.2}"),
                None => String::new(),
            },
            ssim: match quality.ssim {
                Some(ssim) => format!("{ssim:.4}"),
                None => String::new(),
            },
            fps_reference: reference.fps,
            frame_time_ms_reference: reference.frame_time_ms,
            memory_mb_reference: round1(memory_mb.0),
            load_time_ms_reference: reference.load_time_ms,
            fps_1_percent_low_reference: reference.fps_1_percent_low,
            frame_time_variance_reference: reference.frame_time_variance,
            fps_test: test.fps,
            frame_time_ms_test: test.frame_time_ms,
            memory_mb_test: round1(memory_mb.1),
            load_time_ms_test: test.load_time_ms,
            fps_1_percent_low_test: test.fps_1_percent_low,
            frame_time_variance_test: test.frame_time_variance,
            renderer_name: environment.renderer_name.clone(),
            renderer_version: environment.renderer_version.clone(),
            renderer_engine: environment.renderer_engine.clone(),
            platform: environment.platform.clone(),
            gpu: environment.gpu.clone(),
            graphics_api: environment.graphics_api.clone(),
            screen_resolution: environment.screen_resolution.clone(),
            device_pixel_ratio: environment.device_pixel_ratio,
            splat_count_reference: reference.splat_count,
            splat_count_test: test.splat_count,
            canvas_width: reference.resolution.0,
            canvas_height: reference.resolution.1,
        }
    }
}

/// Serialize detailed records to CSV; headers come from the field names.
pub fn detailed_records_to_csv(records: &[ExportRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("finalize csv writer: {err}"))?;
    String::from_utf8(bytes).context("csv output was not valid UTF-8")
}

/// Write CSV text to a file, the non-browser analog of the download step.
pub fn write_csv_file<P: AsRef<Path>>(csv: &str, path: P) -> Result<()> {
    std::fs::write(path.as_ref(), csv)
        .with_context(|| format!("failed to write CSV to {}", path.as_ref().display()))
}

#[cfg(test)]
mod tests {
    use super::{
        batch_results_to_csv, detailed_records_to_csv, summarize, write_csv_file, ExportRecord,
        BATCH_CSV_COLUMNS,
    };
    use crate::batch::{BatchResult, EnvironmentInfo};
    use crate::camera::standard_viewpoints;
    use crate::metrics::BenchmarkMetrics;
    use crate::profile::EnvironmentProfile;
    use crate::quality::ImageQualityMetrics;
    use chrono::{TimeZone, Utc};

    fn result(scene: &str, format: &str, psnr: Option<f64>, fps: Option<f64>) -> BatchResult {
        BatchResult {
            test_id: format!("{scene}_{format}_front_r1"),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            scene_name: scene.to_string(),
            test_format: format.to_string(),
            viewpoint_name: "Front Center".to_string(),
            replicate_number: 1,
            quality: Some(ImageQualityMetrics {
                psnr,
                ssim: psnr.map(|_| 0.95),
                captured_at: None,
                error: None,
            }),
            load_time_ms: Some(850.0),
            fps,
            fps_1_percent_low: fps.map(|f| f - 10.0),
            memory_mb: Some(512.0),
            frame_time_variance: Some(1.25),
            screenshot_path: None,
            environment: EnvironmentInfo {
                renderer_name: "Chrome".to_string(),
                renderer_version: "126.0".to_string(),
                gpu: "RTX 3060".to_string(),
            },
        }
    }

    fn metrics(fps: f64, file_size_bytes: u64) -> BenchmarkMetrics {
        BenchmarkMetrics {
            fps,
            frame_time_ms: 16.67,
            frame_time_variance: 1.1,
            fps_1_percent_low: fps - 12.0,
            fps_01_percent_low: fps - 20.0,
            frame_time_p50: 16.5,
            frame_time_p95: 20.0,
            frame_time_p99: 25.0,
            load_time_ms: 900.0,
            file_size_bytes,
            splat_count: 1_500_000,
            resolution: (1920, 1080),
        }
    }

    #[test]
    fn batch_csv_has_the_sixteen_contract_columns_in_order() {
        let csv_text = batch_results_to_csv(&[result("bonsai", "splat", Some(34.15), Some(60.0))])
            .unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers: Vec<&str> = reader.headers().unwrap().iter().collect();
        assert_eq!(headers, BATCH_CSV_COLUMNS);

        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(row.len(), 16);
        assert_eq!(&row[0], "2026-01-02T03:04:05.000Z");
        assert_eq!(&row[6], "34.15");
        assert_eq!(&row[13], "Chrome");
        assert_eq!(&row[15], "RTX 3060");
    }

    #[test]
    fn empty_results_export_as_empty_string() {
        assert_eq!(batch_results_to_csv(&[]).unwrap(), "");
    }

    #[test]
    fn missing_metrics_become_empty_fields() {
        let mut r = result("bonsai", "splat", None, None);
        r.quality = None;
        r.load_time_ms = None;
        r.memory_mb = None;
        r.frame_time_variance = None;
        r.fps_1_percent_low = None;

        let csv_text = batch_results_to_csv(&[r]).unwrap();
        let line = csv_text.lines().nth(1).unwrap();
        let fields: Vec<&str> = line.split(',').collect();
        // psnr through frameTimeVariance are all empty.
        assert_eq!(&fields[6..13], &["", "", "", "", "", "", ""]);
    }

    #[test]
    fn infinite_psnr_is_spelled_out() {
        let r = result("bonsai", "splat", Some(f64::INFINITY), Some(60.0));
        let csv_text = batch_results_to_csv(&[r]).unwrap();
        let line = csv_text.lines().nth(1).unwrap();
        assert!(line.contains(",Infinity,"));
    }

    #[test]
    fn summary_groups_by_scene_and_format() {
        let results = vec![
            result("bonsai", "splat", Some(34.0), Some(60.0)),
            result("bonsai", "splat", Some(36.0), Some(58.0)),
            result("bonsai", "spz", Some(31.0), Some(62.0)),
            result("garden", "splat", Some(29.0), Some(45.0)),
        ];
        let summaries = summarize(&results);
        // Full cross product: 2 scenes x 2 formats.
        assert_eq!(summaries.len(), 4);

        let bonsai_splat = &summaries[0];
        assert_eq!(bonsai_splat.scene_name, "bonsai");
        assert_eq!(bonsai_splat.test_format, "splat");
        assert_eq!(bonsai_splat.count, 2);
        assert_eq!(bonsai_splat.avg_psnr, 35.0);
        assert_eq!(bonsai_splat.std_psnr, 1.0);
        assert_eq!(bonsai_splat.avg_fps, 59.0);

        // garden/spz has no samples: present with zeroed stats.
        let garden_spz = summaries
            .iter()
            .find(|s| s.scene_name == "garden" && s.test_format == "spz")
            .unwrap();
        assert_eq!(garden_spz.count, 0);
        assert_eq!(garden_spz.avg_psnr, 0.0);
        assert_eq!(garden_spz.std_psnr, 0.0);
    }

    #[test]
    fn summary_filters_missing_metrics_but_keeps_infinite_psnr() {
        let results = vec![
            result("bonsai", "splat", Some(f64::INFINITY), Some(60.0)),
            result("bonsai", "splat", None, None),
        ];
        let summaries = summarize(&results);
        assert_eq!(summaries[0].count, 2);
        assert_eq!(summaries[0].avg_psnr, f64::INFINITY);
        assert_eq!(summaries[0].avg_fps, 60.0);
    }

    #[test]
    fn single_sample_std_is_zero() {
        let summaries = summarize(&[result("bonsai", "splat", Some(34.0), Some(60.0))]);
        assert_eq!(summaries[0].std_psnr, 0.0);
    }

    fn sample_record() -> ExportRecord {
        let viewpoint = &standard_viewpoints()[0];
        ExportRecord::new(
            "garden",
            "ply",
            "spz",
            viewpoint,
            &metrics(59.8, 402_653_184),
            &metrics(57.2, 25_165_824),
            (1024.0, 256.0),
            &ImageQualityMetrics {
                psnr: Some(33.472_19),
                ssim: Some(0.912_345),
                captured_at: None,
                error: None,
            },
            &EnvironmentProfile::default(),
            Some("garden_spz_1".to_string()),
        )
    }

    #[test]
    fn detailed_record_has_side_by_side_metrics_and_json_camera() {
        let record = sample_record();
        assert_eq!(record.file_size_reference_mb, 384.0);
        assert_eq!(record.file_size_test_mb, 24.0);
        assert_eq!(record.compression_ratio, 16.0);
        assert_eq!(record.memory_mb_reference, 1024.0);
        assert_eq!(record.memory_mb_test, 256.0);
        assert_eq!(record.camera_distance, 3.5);
        assert_eq!(record.psnr_db, "33.47");
        assert_eq!(record.ssim, "0.9123");

        let csv_text = detailed_records_to_csv(&[record]).unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 37);
        assert_eq!(&headers[0], "timestamp");
        assert_eq!(&headers[10], "camera_position");
        assert_eq!(&headers[27], "renderer_engine");
        assert_eq!(&headers[36], "canvas_height");

        // The JSON camera field survives the CSV round trip intact.
        let row = reader.records().next().unwrap().unwrap();
        let camera: serde_json::Value = serde_json::from_str(&row[10]).unwrap();
        assert_eq!(camera["z"], 3.5);
    }

    #[test]
    fn csv_file_write_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let csv_text =
            batch_results_to_csv(&[result("bonsai", "splat", Some(34.0), Some(60.0))]).unwrap();
        write_csv_file(&csv_text, &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), csv_text);
    }
}
