//! One calibration pass: texture, match, solve, average, correct.
//!
//! [`Calibrator`] owns every piece of per-configuration state (mesh, texture
//! and match results, averaging queues, correction registers). It is driven
//! by the engine's worker thread but can also be run synchronously, which is
//! how the CLI and the property tests use it.

use crate::camera::CameraFamily;
use crate::config::{
    AveragingParameter, CalibrationConfig, Criteria, EngineOptions, MeshParameter, MeshThreshold,
    OperationMode,
};
use crate::correction::{
    CorrectionApplier, CorrectionOutcome, CorrectionState, EepromTiming, RegisterBus, RegisterIo,
};
use crate::image::ImageView;
use crate::mesh::{Mesh, MeshTile};
use crate::queue::{AverageDifference, DriftAverager};
use crate::search::{BlockMatcher, MatchParams, MatchResult, MatchScratch};
use crate::solve::{FrameDifferenceEstimate, RotationSolution, RotationSolver};
use crate::texture::{TextureEvaluator, TextureMetrics};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{SelfCalError, SelfCalResult};

/// Per-tile residuals and the ungated estimate of the latest pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshDifference {
    /// Residual per mesh tile at the chosen rotation; zero for unmatched tiles.
    pub residuals: Vec<f64>,
    pub estimate: FrameDifferenceEstimate,
}

/// What a single pass did.
#[derive(Clone, Debug, PartialEq)]
pub struct PassReport {
    pub estimate: FrameDifferenceEstimate,
    /// The estimate entered the averaging queues.
    pub gated: bool,
    /// Correction attempt, if the criteria were met.
    pub correction: Option<Result<CorrectionOutcome, SelfCalError>>,
}

impl PassReport {
    /// True if a correction was written successfully.
    pub fn corrected(&self) -> bool {
        matches!(self.correction, Some(Ok(_)))
    }
}

/// Single-threaded calibration state machine.
pub struct Calibrator {
    width: usize,
    height: usize,
    family: CameraFamily,
    parallel: bool,
    config: CalibrationConfig,
    mesh: Mesh,
    evaluator: TextureEvaluator,
    matcher: BlockMatcher,
    solver: RotationSolver,
    scratch: MatchScratch,
    textures: Vec<TextureMetrics>,
    matches: Vec<MatchResult>,
    latest: RotationSolution,
    current: FrameDifferenceEstimate,
    averager: DriftAverager,
    applier: CorrectionApplier,
    last_error: Option<SelfCalError>,
}

impl Calibrator {
    /// Builds the mesh and matching state for `options` and `config`.
    pub fn new(
        options: &EngineOptions,
        config: CalibrationConfig,
        io: impl RegisterIo + 'static,
    ) -> SelfCalResult<Self> {
        if options.width == 0 || options.height == 0 {
            return Err(SelfCalError::InvalidDimensions {
                width: options.width,
                height: options.height,
            });
        }
        let family = options.camera_family();
        let bus = RegisterBus::new(family, Box::new(io), options.register_settle);
        let applier = CorrectionApplier::new(
            bus,
            family,
            EepromTiming {
                poll_interval: options.eeprom_poll_interval,
                max_polls: options.eeprom_max_polls,
            },
        );
        let mesh = Mesh::generate(&config.mesh, options.width);
        let scratch = MatchScratch::new(
            config.mesh.tile_width,
            config.mesh.tile_height,
            config.mesh.search_span_rows,
        );
        Ok(Self {
            width: options.width,
            height: options.height,
            family,
            parallel: options.parallel,
            evaluator: TextureEvaluator::new(
                &config.threshold,
                &config.mode,
                family,
                config.mesh.search_span_rows,
            ),
            matcher: BlockMatcher::new(MatchParams::new(&config.mesh, &config.threshold)),
            solver: RotationSolver::new(options.width, options.height),
            config,
            textures: vec![TextureMetrics::default(); mesh.len()],
            matches: vec![MatchResult::default(); mesh.len()],
            latest: RotationSolution {
                estimate: FrameDifferenceEstimate::default(),
                residuals: vec![0.0; mesh.len()],
            },
            mesh,
            scratch,
            current: FrameDifferenceEstimate::default(),
            averager: DriftAverager::new(),
            applier,
            last_error: None,
        })
    }

    /// Image width fixed at construction.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height fixed at construction.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Camera family selected at construction.
    pub fn family(&self) -> CameraFamily {
        self.family
    }

    /// Active configuration.
    pub fn config(&self) -> CalibrationConfig {
        self.config
    }

    fn rebuild(&mut self) {
        let cfg = &self.config;
        self.mesh = Mesh::generate(&cfg.mesh, self.width);
        self.evaluator =
            TextureEvaluator::new(&cfg.threshold, &cfg.mode, self.family, cfg.mesh.search_span_rows);
        self.matcher = BlockMatcher::new(MatchParams::new(&cfg.mesh, &cfg.threshold));
        self.scratch = MatchScratch::new(
            cfg.mesh.tile_width,
            cfg.mesh.tile_height,
            cfg.mesh.search_span_rows,
        );
        let n = self.mesh.len();
        self.textures = vec![TextureMetrics::default(); n];
        self.matches = vec![MatchResult::default(); n];
        self.latest = RotationSolution {
            estimate: FrameDifferenceEstimate::default(),
            residuals: vec![0.0; n],
        };
        self.averager.reset();
    }

    /// Replaces the mesh geometry and regenerates the mesh.
    pub fn set_mesh_parameter(&mut self, mesh: MeshParameter) {
        self.config.mesh = mesh;
        self.rebuild();
    }

    /// Replaces the texture and matching thresholds.
    pub fn set_mesh_threshold(&mut self, threshold: MeshThreshold) {
        self.config.threshold = threshold;
        self.rebuild();
    }

    /// Replaces the operation mode.
    pub fn set_operation_mode(&mut self, mode: OperationMode) {
        self.config.mode = mode;
        self.rebuild();
    }

    /// Replaces the gating and averaging window.
    pub fn set_averaging_parameter(&mut self, averaging: AveragingParameter) {
        self.config.averaging = averaging;
        self.averager.reset();
    }

    /// Replaces the correction criteria.
    pub fn set_criteria(&mut self, criteria: Criteria) {
        self.config.criteria = criteria;
        self.averager.reset();
    }

    /// Runs one full pass over a frame pair of the configured size.
    pub fn run_pass(
        &mut self,
        reference: ImageView<'_, u8>,
        comparison: ImageView<'_, u8>,
    ) -> PassReport {
        let _span = trace_span!("calibration_pass", tiles = self.mesh.len()).entered();

        self.textures = {
            let _span = trace_span!("texture").entered();
            self.evaluator.evaluate_mesh(reference, &self.mesh)
        };
        self.matches = self.match_all(reference, comparison);
        self.latest = self.solver.solve(&self.mesh, &self.matches);

        let estimate = self.latest.estimate;
        self.current = estimate;

        let gated = estimate.passes_gate(&self.config.averaging);
        if gated {
            self.averager.push(
                estimate.vertical_difference,
                estimate.rotation,
                self.config.averaging.average_count,
            );
        }

        let average = self.averager.latest();
        let mut correction = None;
        if average.meets(&self.config.criteria) {
            let result = self.applier.apply(&average, &self.config.criteria);
            self.averager.reset();
            if let Err(err) = &result {
                let reason = err.to_string();
                trace_warn!("correction_failed", error = reason.as_str());
                self.last_error = Some(err.clone());
            }
            correction = Some(result);
        }

        trace_event!(
            "pass_complete",
            gated = gated,
            frames = average.frame_count,
            corrected = correction.is_some()
        );
        PassReport {
            estimate,
            gated,
            correction,
        }
    }

    #[cfg(feature = "rayon")]
    fn match_all(
        &mut self,
        reference: ImageView<'_, u8>,
        comparison: ImageView<'_, u8>,
    ) -> Vec<MatchResult> {
        if self.parallel {
            return self
                .matcher
                .match_mesh_par(reference, comparison, &self.mesh, &self.textures);
        }
        self.matcher.match_mesh(
            reference,
            comparison,
            &self.mesh,
            &self.textures,
            &mut self.scratch,
        )
    }

    #[cfg(not(feature = "rayon"))]
    fn match_all(
        &mut self,
        reference: ImageView<'_, u8>,
        comparison: ImageView<'_, u8>,
    ) -> Vec<MatchResult> {
        let _ = self.parallel;
        self.matcher.match_mesh(
            reference,
            comparison,
            &self.mesh,
            &self.textures,
            &mut self.scratch,
        )
    }

    /// The generated mesh.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Tiles of the generated mesh.
    pub fn mesh_tiles(&self) -> &[MeshTile] {
        self.mesh.tiles()
    }

    /// Texture metrics from the latest pass.
    pub fn texture_metrics(&self) -> &[TextureMetrics] {
        &self.textures
    }

    /// Match results from the latest pass.
    pub fn match_results(&self) -> &[MatchResult] {
        &self.matches
    }

    /// Residuals and ungated estimate of the latest pass.
    pub fn mesh_difference(&self) -> MeshDifference {
        MeshDifference {
            residuals: self.latest.residuals.clone(),
            estimate: self.latest.estimate,
        }
    }

    /// Display copy of the latest estimate.
    pub fn current_difference(&self) -> FrameDifferenceEstimate {
        self.current
    }

    /// Clears the display copy and resets the averaging queues.
    pub fn clear_current_difference(&mut self) {
        self.current = FrameDifferenceEstimate::default();
        self.averager.reset();
    }

    /// Time-averaged drift over the configured window.
    pub fn average_difference(&self) -> AverageDifference {
        self.averager.latest()
    }

    /// The averaging queues.
    pub fn averager(&self) -> &DriftAverager {
        &self.averager
    }

    /// Correction cached at the last register read.
    pub fn current_correction(&self) -> CorrectionState {
        self.applier.state()
    }

    /// Re-reads the correction registers.
    pub fn refresh_correction(&mut self) -> SelfCalResult<CorrectionState> {
        self.applier.refresh().inspect_err(|err| {
            self.last_error = Some(err.clone());
        })
    }

    /// Persists the cached correction to the base registers and EEPROM.
    pub fn save_latest_correction(&mut self) -> SelfCalResult<()> {
        self.applier.save_latest().inspect_err(|err| {
            self.last_error = Some(err.clone());
        })
    }

    /// The most recent register error, if any.
    pub fn last_error(&self) -> Option<&SelfCalError> {
        self.last_error.as_ref()
    }
}
