//! SelfCal keeps a stereo camera pair epipolar-aligned while it runs.
//!
//! Each calibration pass lays a mesh of tiles over the reference frame, keeps
//! the textured ones, block-matches them against the comparison frame with
//! sub-pixel refinement and fits a vertical offset plus a small rotation.
//! Gated per-frame estimates are averaged over a sliding window, and once the
//! drift is stable and large enough the correction is written to the camera's
//! rectification registers through a caller-supplied [`RegisterIo`].
//!
//! [`SelfCalibrationEngine`] runs passes on a background worker with
//! drop-on-busy backpressure; [`Calibrator`] is the same state machine
//! driven synchronously. Tile matching can run in parallel via the `rayon`
//! feature and the SAD kernel can use SIMD via the `simd` feature.

pub mod camera;
pub mod config;
pub mod correction;
pub mod engine;
pub mod image;
pub mod kernel;
pub mod mesh;
pub mod pipeline;
pub mod queue;
mod refine;
pub mod search;
pub mod solve;
pub mod texture;
mod trace;
pub mod util;

pub use camera::{CameraFamily, LogicalRegister};
pub use config::{
    AveragingParameter, CalibrationConfig, Criteria, EngineOptions, MeshParameter, MeshThreshold,
    OperationMode,
};
pub use correction::{
    CorrectionOutcome, CorrectionState, MemoryRegisterBank, RegisterCallbacks, RegisterIo,
    RegisterWrite,
};
pub use engine::{EngineStatus, SelfCalibrationEngine};
pub use image::{FramePair, ImageView, OwnedImage};
pub use mesh::{Mesh, MeshTile};
pub use pipeline::{Calibrator, MeshDifference, PassReport};
pub use queue::AverageDifference;
pub use search::MatchResult;
pub use solve::FrameDifferenceEstimate;
pub use texture::TextureMetrics;
pub use util::{SelfCalError, SelfCalResult};
