//! Background calibration engine.
//!
//! One worker thread per engine runs at most one pass at a time. The
//! producer hands frames over with [`SelfCalibrationEngine::parallelize`],
//! which never blocks and drops the pair when the engine is disabled or a
//! pass is already in flight. `suspend` blocks until the in-flight pass (if
//! any) has finished, which is how setters keep configuration changes from
//! racing with matching.

use crate::camera::CameraFamily;
use crate::config::{
    AveragingParameter, CalibrationConfig, Criteria, EngineOptions, MeshParameter, MeshThreshold,
    OperationMode,
};
use crate::correction::{CorrectionState, RegisterIo};
use crate::image::FramePair;
use crate::mesh::MeshTile;
use crate::pipeline::{Calibrator, MeshDifference};
use crate::queue::AverageDifference;
use crate::search::MatchResult;
use crate::solve::FrameDifferenceEstimate;
use crate::texture::TextureMetrics;
use crate::trace::{trace_debug, trace_event};
use crate::util::{SelfCalError, SelfCalResult};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Snapshot of the worker's flags and counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStatus {
    /// Posted frames will be processed.
    pub enabled: bool,
    /// A pass is in flight.
    pub processing: bool,
    /// Passes completed since initialization.
    pub passes_completed: u64,
    /// Frame pairs dropped by backpressure.
    pub frames_dropped: u64,
    /// Corrections written successfully.
    pub corrections_applied: u64,
}

#[derive(Debug, Default)]
struct Control {
    enabled: bool,
    processing: bool,
    pending: bool,
    terminate: bool,
    passes: u64,
    dropped: u64,
    corrections: u64,
}

struct Shared {
    control: Mutex<Control>,
    work: Condvar,
    idle: Condvar,
    frames: Mutex<FramePair>,
    calibrator: Mutex<Calibrator>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        lock(&self.control)
    }

    fn calibrator(&self) -> MutexGuard<'_, Calibrator> {
        lock(&self.calibrator)
    }
}

/// Self-calibration engine owning a background worker thread.
pub struct SelfCalibrationEngine {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    family: CameraFamily,
    width: usize,
    height: usize,
}

impl SelfCalibrationEngine {
    /// Allocates frame buffers and mesh state, selects the camera family and
    /// spawns the worker parked on its wait signal. The engine starts disabled.
    pub fn initialize(
        options: EngineOptions,
        config: CalibrationConfig,
        io: impl RegisterIo + 'static,
    ) -> SelfCalResult<Self> {
        let calibrator = Calibrator::new(&options, config, io)?;
        let frames = FramePair::new(options.width, options.height)?;
        let family = calibrator.family();
        let shared = Arc::new(Shared {
            control: Mutex::new(Control::default()),
            work: Condvar::new(),
            idle: Condvar::new(),
            frames: Mutex::new(frames),
            calibrator: Mutex::new(calibrator),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("selfcal-worker".to_string())
            .spawn(move || worker_loop(&worker_shared))
            .map_err(|err| SelfCalError::WorkerSpawn {
                reason: err.to_string(),
            })?;

        trace_event!(
            "engine_initialized",
            width = options.width,
            height = options.height,
            vm_family = family == CameraFamily::Vm
        );
        Ok(Self {
            shared,
            worker: Some(worker),
            family,
            width: options.width,
            height: options.height,
        })
    }

    /// Camera family selected at initialization.
    pub fn family(&self) -> CameraFamily {
        self.family
    }

    /// Image size fixed at initialization.
    pub fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Enables processing of posted frames.
    pub fn start(&self) {
        self.resume(true);
    }

    /// Disables processing without waiting for an in-flight pass.
    pub fn request_stop(&self) {
        self.resume(false);
    }

    /// Disables processing and waits for any in-flight pass to finish.
    pub fn stop(&self) {
        self.suspend();
    }

    /// Disables processing, waits until no pass is active and returns the
    /// previous enabled flag for a later [`resume`](Self::resume).
    pub fn suspend(&self) -> bool {
        let mut ctl = self.shared.control();
        let was_enabled = ctl.enabled;
        ctl.enabled = false;
        while ctl.processing {
            ctl = self
                .shared
                .idle
                .wait(ctl)
                .unwrap_or_else(PoisonError::into_inner);
        }
        was_enabled
    }

    /// Sets the enabled flag. Never blocks on the worker.
    pub fn resume(&self, enabled: bool) {
        self.shared.control().enabled = enabled;
    }

    /// Hands a frame pair to the worker.
    ///
    /// Returns true if a pass was scheduled. When the engine is disabled, a
    /// pass is in flight, or a buffer is shorter than the configured image,
    /// the pair is dropped and false is returned.
    pub fn parallelize(&self, reference: &[u8], comparison: &[u8]) -> bool {
        {
            let mut ctl = self.shared.control();
            if !ctl.enabled || ctl.processing || ctl.terminate {
                ctl.dropped += 1;
                trace_debug!("frame_dropped", dropped = ctl.dropped);
                return false;
            }
            ctl.processing = true;
        }

        let loaded = lock(&self.shared.frames).load(reference, comparison);

        let mut ctl = self.shared.control();
        if !loaded {
            ctl.processing = false;
            ctl.dropped += 1;
            self.shared.idle.notify_all();
            return false;
        }
        ctl.pending = true;
        self.shared.work.notify_one();
        true
    }

    /// Worker flags and counters.
    pub fn status(&self) -> EngineStatus {
        let ctl = self.shared.control();
        EngineStatus {
            enabled: ctl.enabled,
            processing: ctl.processing,
            passes_completed: ctl.passes,
            frames_dropped: ctl.dropped,
            corrections_applied: ctl.corrections,
        }
    }

    /// Runs `f` on the calibrator with the worker suspended, then restores
    /// the previous enabled state.
    fn with_suspended<R>(&self, f: impl FnOnce(&mut Calibrator) -> R) -> R {
        let was_enabled = self.suspend();
        let result = f(&mut self.shared.calibrator());
        self.resume(was_enabled);
        result
    }

    /// Active configuration.
    pub fn config(&self) -> CalibrationConfig {
        self.shared.calibrator().config()
    }

    /// Replaces the mesh geometry; regenerates the mesh and resets the queues.
    pub fn set_mesh_parameter(&self, mesh: MeshParameter) {
        self.with_suspended(|cal| cal.set_mesh_parameter(mesh));
    }

    /// Replaces the texture and matching thresholds; resets the queues.
    pub fn set_mesh_threshold(&self, threshold: MeshThreshold) {
        self.with_suspended(|cal| cal.set_mesh_threshold(threshold));
    }

    /// Replaces the operation mode; resets the queues.
    pub fn set_operation_mode(&self, mode: OperationMode) {
        self.with_suspended(|cal| cal.set_operation_mode(mode));
    }

    /// Replaces the gating and averaging window; resets the queues.
    pub fn set_averaging_parameter(&self, averaging: AveragingParameter) {
        self.with_suspended(|cal| cal.set_averaging_parameter(averaging));
    }

    /// Replaces the correction criteria; resets the queues.
    pub fn set_criteria(&self, criteria: Criteria) {
        self.with_suspended(|cal| cal.set_criteria(criteria));
    }

    /// Mesh tiles and search window origins.
    pub fn mesh_tiles(&self) -> Vec<MeshTile> {
        self.with_suspended(|cal| cal.mesh_tiles().to_vec())
    }

    /// True if mesh generation stopped at the tile capacity.
    pub fn mesh_truncated(&self) -> bool {
        self.shared.calibrator().mesh().truncated()
    }

    /// Texture metrics and classification from the latest pass.
    pub fn texture_metrics(&self) -> Vec<TextureMetrics> {
        self.with_suspended(|cal| cal.texture_metrics().to_vec())
    }

    /// Match flags, ratios and sub-pixel positions from the latest pass.
    pub fn match_results(&self) -> Vec<MatchResult> {
        self.with_suspended(|cal| cal.match_results().to_vec())
    }

    /// Per-tile residuals and the ungated estimate of the latest pass.
    pub fn mesh_difference(&self) -> MeshDifference {
        self.with_suspended(|cal| cal.mesh_difference())
    }

    /// Display copy of the latest estimate.
    pub fn current_difference(&self) -> FrameDifferenceEstimate {
        self.shared.calibrator().current_difference()
    }

    /// Clears the display estimate and resets the averaging queues.
    pub fn clear_current_mesh_difference(&self) {
        self.with_suspended(|cal| cal.clear_current_difference());
    }

    /// Gated time average of the drift.
    pub fn average_difference(&self) -> AverageDifference {
        self.shared.calibrator().average_difference()
    }

    /// Correction cached at the last register read.
    pub fn current_correction(&self) -> CorrectionState {
        self.shared.calibrator().current_correction()
    }

    /// Re-reads the correction registers from the camera.
    pub fn refresh_correction(&self) -> SelfCalResult<CorrectionState> {
        self.with_suspended(|cal| cal.refresh_correction())
    }

    /// Persists the cached correction to the base registers and EEPROM.
    pub fn save_latest_correction(&self) -> SelfCalResult<()> {
        self.with_suspended(|cal| cal.save_latest_correction())
    }

    /// The most recent register error raised by a pass or query.
    pub fn last_error(&self) -> Option<SelfCalError> {
        self.shared.calibrator().last_error().cloned()
    }

    /// Stops the worker, joins it and releases buffers.
    pub fn finalize(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        {
            let mut ctl = self.shared.control();
            ctl.enabled = false;
            ctl.terminate = true;
        }
        self.shared.work.notify_all();
        // A worker that panicked has nothing left to clean up.
        let joined = worker.join().is_ok();
        trace_event!("engine_finalized", joined = joined);
    }
}

impl Drop for SelfCalibrationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        {
            let mut ctl = shared.control();
            while !ctl.pending && !ctl.terminate {
                ctl = shared.work.wait(ctl).unwrap_or_else(PoisonError::into_inner);
            }
            if ctl.terminate {
                ctl.processing = false;
                shared.idle.notify_all();
                return;
            }
            ctl.pending = false;
        }

        let report = {
            let frames = lock(&shared.frames);
            let mut calibrator = shared.calibrator();
            calibrator.run_pass(frames.reference.view(), frames.comparison.view())
        };

        let mut ctl = shared.control();
        ctl.processing = false;
        ctl.passes += 1;
        if report.corrected() {
            ctl.corrections += 1;
        }
        shared.idle.notify_all();
    }
}
