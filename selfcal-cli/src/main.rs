use clap::Parser;
use selfcal::image::io::load_gray_image;
use selfcal::{
    AverageDifference, AveragingParameter, CalibrationConfig, Calibrator, CameraFamily,
    CorrectionState, Criteria, EngineOptions, FrameDifferenceEstimate, FramePair,
    MemoryRegisterBank, MeshParameter, MeshThreshold, OperationMode, PassReport,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "SelfCal dry run on a still stereo pair (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
enum FamilyConfig {
    Vm,
    Xc,
}

impl From<FamilyConfig> for CameraFamily {
    fn from(value: FamilyConfig) -> Self {
        match value {
            FamilyConfig::Vm => CameraFamily::Vm,
            FamilyConfig::Xc => CameraFamily::Xc,
        }
    }
}

impl From<CameraFamily> for FamilyConfig {
    fn from(value: CameraFamily) -> Self {
        match value {
            CameraFamily::Vm => FamilyConfig::Vm,
            CameraFamily::Xc => FamilyConfig::Xc,
        }
    }
}

/// Copies every field present in the JSON group over the family default.
macro_rules! overlay {
    ($json:expr, $target:expr, [$($field:ident),+ $(,)?]) => {
        $(
            if let Some(value) = $json.$field {
                $target.$field = value;
            }
        )+
    };
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MeshJson {
    tile_width: Option<usize>,
    tile_height: Option<usize>,
    center_x: Option<i32>,
    center_y: Option<i32>,
    tiles_right: Option<usize>,
    tiles_left: Option<usize>,
    tiles_up: Option<usize>,
    tiles_down: Option<usize>,
    region_top: Option<i32>,
    region_bottom: Option<i32>,
    region_left: Option<i32>,
    region_right: Option<i32>,
    search_span_rows: Option<usize>,
    search_span_cols: Option<usize>,
}

impl MeshJson {
    fn apply(&self, target: &mut MeshParameter) {
        overlay!(
            self,
            target,
            [
                tile_width,
                tile_height,
                center_x,
                center_y,
                tiles_right,
                tiles_left,
                tiles_up,
                tiles_down,
                region_top,
                region_bottom,
                region_left,
                region_right,
                search_span_rows,
                search_span_cols,
            ]
        );
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThresholdJson {
    min_brightness: Option<i32>,
    max_brightness: Option<i32>,
    min_contrast: Option<i32>,
    min_edge_ratio: Option<f64>,
    max_displacement_height: Option<i32>,
    max_displacement_width: Option<i32>,
    min_match_ratio: Option<f64>,
}

impl ThresholdJson {
    fn apply(&self, target: &mut MeshThreshold) {
        overlay!(
            self,
            target,
            [
                min_brightness,
                max_brightness,
                min_contrast,
                min_edge_ratio,
                max_displacement_height,
                max_displacement_width,
                min_match_ratio,
            ]
        );
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModeJson {
    gradation_correction: Option<bool>,
    gradation_contrast_factor: Option<f64>,
    gradation_brightness_factor: Option<f64>,
}

impl ModeJson {
    fn apply(&self, target: &mut OperationMode) {
        overlay!(
            self,
            target,
            [
                gradation_correction,
                gradation_contrast_factor,
                gradation_brightness_factor,
            ]
        );
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AveragingJson {
    min_match_number: Option<usize>,
    max_diff_deviation: Option<f64>,
    average_count: Option<usize>,
}

impl AveragingJson {
    fn apply(&self, target: &mut AveragingParameter) {
        overlay!(
            self,
            target,
            [min_match_number, max_diff_deviation, average_count]
        );
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CriteriaJson {
    frame_count: Option<usize>,
    difference: Option<f64>,
    rotation: Option<f64>,
    deviation: Option<f64>,
    rotation_correction: Option<bool>,
    auto_save: Option<bool>,
}

impl CriteriaJson {
    fn apply(&self, target: &mut Criteria) {
        overlay!(
            self,
            target,
            [
                frame_count,
                difference,
                rotation,
                deviation,
                rotation_correction,
                auto_save,
            ]
        );
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    reference_path: String,
    comparison_path: String,
    output_path: Option<String>,
    family: Option<FamilyConfig>,
    passes: usize,
    parallel: bool,
    mesh: MeshJson,
    threshold: ThresholdJson,
    mode: ModeJson,
    averaging: AveragingJson,
    criteria: CriteriaJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_path: String::new(),
            comparison_path: String::new(),
            output_path: None,
            family: None,
            passes: 1,
            parallel: false,
            mesh: MeshJson::default(),
            threshold: ThresholdJson::default(),
            mode: ModeJson::default(),
            averaging: AveragingJson::default(),
            criteria: CriteriaJson::default(),
        }
    }
}

impl Config {
    fn calibration(&self, family: CameraFamily) -> CalibrationConfig {
        let mut cfg = CalibrationConfig::for_family(family);
        self.mesh.apply(&mut cfg.mesh);
        self.threshold.apply(&mut cfg.threshold);
        self.mode.apply(&mut cfg.mode);
        self.averaging.apply(&mut cfg.averaging);
        self.criteria.apply(&mut cfg.criteria);
        cfg
    }
}

#[derive(Debug, Serialize)]
struct EstimateRecord {
    matched_tiles: usize,
    vertical_difference: f64,
    rotation: f64,
    std_dev: f64,
}

impl From<FrameDifferenceEstimate> for EstimateRecord {
    fn from(value: FrameDifferenceEstimate) -> Self {
        Self {
            matched_tiles: value.matched_tiles,
            vertical_difference: value.vertical_difference,
            rotation: value.rotation,
            std_dev: value.std_dev,
        }
    }
}

#[derive(Debug, Serialize)]
struct AverageRecord {
    frame_count: usize,
    vertical_difference: f64,
    rotation: f64,
    std_dev: f64,
}

impl From<AverageDifference> for AverageRecord {
    fn from(value: AverageDifference) -> Self {
        Self {
            frame_count: value.frame_count,
            vertical_difference: value.vertical_difference,
            rotation: value.rotation,
            std_dev: value.std_dev,
        }
    }
}

#[derive(Debug, Serialize)]
struct CorrectionRecord {
    pass: usize,
    vertical_delta: Option<i32>,
    rotation_delta: Option<i32>,
    error: Option<String>,
}

impl CorrectionRecord {
    fn from_report(pass: usize, report: &PassReport) -> Option<Self> {
        let record = match report.correction.as_ref()? {
            Ok(outcome) => Self {
                pass,
                vertical_delta: Some(outcome.vertical_delta),
                rotation_delta: outcome.rotation_delta,
                error: None,
            },
            Err(err) => Self {
                pass,
                vertical_delta: None,
                rotation_delta: None,
                error: Some(err.to_string()),
            },
        };
        Some(record)
    }
}

#[derive(Debug, Serialize)]
struct StateRecord {
    vertical_register: i32,
    vertical_pixels: f64,
    rotation_register: i32,
    rotation_radians: f64,
}

impl From<CorrectionState> for StateRecord {
    fn from(value: CorrectionState) -> Self {
        Self {
            vertical_register: value.vertical_register,
            vertical_pixels: value.vertical_pixels,
            rotation_register: value.rotation_register,
            rotation_radians: value.rotation_radians,
        }
    }
}

#[derive(Debug, Serialize)]
struct RegisterRecord {
    address: u16,
    value: u16,
}

#[derive(Debug, Serialize)]
struct Output {
    family: FamilyConfig,
    width: usize,
    height: usize,
    tiles: usize,
    mesh_truncated: bool,
    textured_tiles: usize,
    matched_tiles: usize,
    passes: usize,
    gated_passes: usize,
    last_estimate: EstimateRecord,
    average: AverageRecord,
    corrections: Vec<CorrectionRecord>,
    correction_state: StateRecord,
    register_writes: Vec<RegisterRecord>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("selfcal=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.reference_path.is_empty() || config.comparison_path.is_empty() {
        return Err("reference_path and comparison_path must be set in the config".into());
    }
    if config.passes == 0 {
        return Err("passes must be at least 1".into());
    }

    let frames = FramePair::from_images(
        load_gray_image(&config.reference_path)?,
        load_gray_image(&config.comparison_path)?,
    )?;
    let width = frames.reference.width();
    let height = frames.reference.height();

    let mut options = EngineOptions::new(width, height).without_delays();
    options.family = config.family.map(CameraFamily::from);
    options.parallel = config.parallel;
    let family = options.camera_family();

    let bank = MemoryRegisterBank::new(family);
    let mut calibrator = Calibrator::new(&options, config.calibration(family), bank.clone())?;

    let mut gated_passes = 0;
    let mut corrections = Vec::new();
    let mut last_estimate = FrameDifferenceEstimate::default();
    for pass in 0..config.passes {
        let report = calibrator.run_pass(frames.reference.view(), frames.comparison.view());
        if report.gated {
            gated_passes += 1;
        }
        corrections.extend(CorrectionRecord::from_report(pass, &report));
        last_estimate = report.estimate;
    }

    let output = Output {
        family: family.into(),
        width,
        height,
        tiles: calibrator.mesh().len(),
        mesh_truncated: calibrator.mesh().truncated(),
        textured_tiles: calibrator
            .texture_metrics()
            .iter()
            .filter(|m| m.textured)
            .count(),
        matched_tiles: calibrator
            .match_results()
            .iter()
            .filter(|m| m.matched)
            .count(),
        passes: config.passes,
        gated_passes,
        last_estimate: last_estimate.into(),
        average: calibrator.average_difference().into(),
        corrections,
        correction_state: calibrator.current_correction().into(),
        register_writes: bank
            .writes()
            .into_iter()
            .map(|w| RegisterRecord {
                address: w.address,
                value: w.value,
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
