//! Calibration configuration groups and engine options.
//!
//! The five parameter groups are plain `Copy` structs. `Default` carries the
//! XC-family values; [`CalibrationConfig::for_family`] returns the VM-family
//! values where they differ.

use crate::camera::CameraFamily;
use std::time::Duration;

/// Mesh geometry: tile size, expansion center, quadrant counts and clip region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshParameter {
    /// Tile width in pixels.
    pub tile_width: usize,
    /// Tile height in pixels.
    pub tile_height: usize,
    /// Expansion center x.
    pub center_x: i32,
    /// Expansion center y.
    pub center_y: i32,
    /// Tiles to the right of the center per row.
    pub tiles_right: usize,
    /// Tiles to the left of the center per row.
    pub tiles_left: usize,
    /// Tile rows above the center.
    pub tiles_up: usize,
    /// Tile rows below the center.
    pub tiles_down: usize,
    /// Clip region top edge.
    pub region_top: i32,
    /// Clip region bottom edge.
    pub region_bottom: i32,
    /// Clip region left edge.
    pub region_left: i32,
    /// Clip region right edge.
    pub region_right: i32,
    /// Vertical search span in rows (the window covers `2 * span` rows around the tile row).
    pub search_span_rows: usize,
    /// Horizontal search span in columns (toward increasing x).
    pub search_span_cols: usize,
}

impl Default for MeshParameter {
    fn default() -> Self {
        Self {
            tile_width: 25,
            tile_height: 25,
            center_x: 480,
            center_y: 360,
            tiles_right: 20,
            tiles_left: 20,
            tiles_up: 20,
            tiles_down: 20,
            region_top: 16,
            region_bottom: 703,
            region_left: 16,
            region_right: 1024,
            search_span_rows: 10,
            search_span_cols: 180,
        }
    }
}

/// Texture and matching thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshThreshold {
    /// Minimum average tile brightness.
    pub min_brightness: i32,
    /// Maximum average tile brightness before gradation relaxation.
    pub max_brightness: i32,
    /// Minimum normalized contrast before gradation relaxation.
    pub min_contrast: i32,
    /// Minimum cross and diagonal edge ratio, in percent.
    pub min_edge_ratio: f64,
    /// Largest accepted vertical displacement in rows.
    pub max_displacement_height: i32,
    /// Largest accepted horizontal displacement in columns.
    pub max_displacement_width: i32,
    /// Match ratio a tile must exceed to count as matched, in percent.
    pub min_match_ratio: f64,
}

impl Default for MeshThreshold {
    fn default() -> Self {
        Self {
            min_brightness: 40,
            max_brightness: 160,
            min_contrast: 1000,
            min_edge_ratio: 30.0,
            max_displacement_height: 5,
            max_displacement_width: 160,
            min_match_ratio: 97.0,
        }
    }
}

/// Operation mode switches.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OperationMode {
    /// Relax texture thresholds for camera-side tone mapping.
    pub gradation_correction: bool,
    /// Contrast factor applied in gradation mode.
    pub gradation_contrast_factor: f64,
    /// Brightness ceiling factor applied in gradation mode.
    pub gradation_brightness_factor: f64,
}

impl Default for OperationMode {
    fn default() -> Self {
        Self {
            gradation_correction: false,
            gradation_contrast_factor: 0.5,
            gradation_brightness_factor: 1.25,
        }
    }
}

impl OperationMode {
    /// Returns `(contrast_factor, brightness_factor)` for the active mode.
    pub fn correction_factors(&self) -> (f64, f64) {
        if self.gradation_correction {
            (
                self.gradation_contrast_factor,
                self.gradation_brightness_factor,
            )
        } else {
            (1.0, 1.0)
        }
    }
}

/// Per-frame gating and averaging window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AveragingParameter {
    /// Minimum matched tiles for a frame to enter the averaging queues.
    pub min_match_number: usize,
    /// Maximum per-frame residual standard deviation, in pixels.
    pub max_diff_deviation: f64,
    /// Number of most recent frames averaged.
    pub average_count: usize,
}

impl Default for AveragingParameter {
    fn default() -> Self {
        Self {
            min_match_number: 10,
            max_diff_deviation: 1.0,
            average_count: 50,
        }
    }
}

/// Decision thresholds for applying a correction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Criteria {
    /// Frames that must have been written before a correction can fire.
    pub frame_count: usize,
    /// Averaged vertical difference magnitude that triggers a correction, in pixels.
    pub difference: f64,
    /// Averaged rotation magnitude that triggers a correction, in radians.
    pub rotation: f64,
    /// Averaged standard deviation must stay below this, in pixels.
    pub deviation: f64,
    /// Apply rotational corrections as well as vertical ones.
    pub rotation_correction: bool,
    /// Persist each correction to the base registers and EEPROM.
    pub auto_save: bool,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            frame_count: 100,
            difference: 0.1,
            rotation: 0.001,
            deviation: 0.25,
            rotation_correction: false,
            auto_save: true,
        }
    }
}

/// All five parameter groups.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalibrationConfig {
    pub mesh: MeshParameter,
    pub threshold: MeshThreshold,
    pub mode: OperationMode,
    pub averaging: AveragingParameter,
    pub criteria: Criteria,
}

impl CalibrationConfig {
    /// Returns the factory defaults for a camera family.
    pub fn for_family(family: CameraFamily) -> Self {
        match family {
            CameraFamily::Xc => Self::default(),
            CameraFamily::Vm => Self {
                mesh: MeshParameter {
                    tile_width: 20,
                    tile_height: 20,
                    center_x: 376,
                    center_y: 240,
                    region_bottom: 460,
                    region_right: 640,
                    search_span_cols: 100,
                    ..MeshParameter::default()
                },
                threshold: MeshThreshold {
                    min_brightness: 20,
                    max_brightness: 200,
                    min_edge_ratio: 50.0,
                    max_displacement_width: 90,
                    min_match_ratio: 96.0,
                    ..MeshThreshold::default()
                },
                averaging: AveragingParameter {
                    max_diff_deviation: 0.5,
                    average_count: 20,
                    ..AveragingParameter::default()
                },
                ..Self::default()
            },
        }
    }
}

/// Options fixed when the engine is initialized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineOptions {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Forces a camera family instead of detecting it from the width.
    pub family: Option<CameraFamily>,
    /// Pause after every register access.
    pub register_settle: Duration,
    /// Pause between EEPROM status polls.
    pub eeprom_poll_interval: Duration,
    /// EEPROM status polls before giving up.
    pub eeprom_max_polls: u32,
    /// Match tiles in parallel (effective with the `rayon` feature).
    pub parallel: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            family: None,
            register_settle: Duration::from_millis(20),
            eeprom_poll_interval: Duration::from_millis(1),
            eeprom_max_polls: 5000,
            parallel: false,
        }
    }
}

impl EngineOptions {
    /// Options for the given image size with default timing.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Returns the forced family, or the one detected from the width.
    pub fn camera_family(&self) -> CameraFamily {
        self.family
            .unwrap_or_else(|| CameraFamily::from_image_width(self.width))
    }

    /// Disables register and EEPROM pacing; useful against in-memory banks.
    pub fn without_delays(mut self) -> Self {
        self.register_settle = Duration::ZERO;
        self.eeprom_poll_interval = Duration::ZERO;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{CalibrationConfig, EngineOptions, OperationMode};
    use crate::camera::CameraFamily;

    #[test]
    fn vm_defaults_override_only_family_specific_fields() {
        let vm = CalibrationConfig::for_family(CameraFamily::Vm);
        assert_eq!(vm.mesh.tile_width, 20);
        assert_eq!(vm.mesh.search_span_cols, 100);
        assert_eq!(vm.mesh.region_left, 16);
        assert_eq!(vm.threshold.min_contrast, 1000);
        assert_eq!(vm.averaging.average_count, 20);
        assert_eq!(vm.criteria, CalibrationConfig::default().criteria);
    }

    #[test]
    fn family_is_detected_unless_forced() {
        assert_eq!(EngineOptions::new(752, 480).camera_family(), CameraFamily::Vm);
        let mut opts = EngineOptions::new(752, 480);
        opts.family = Some(CameraFamily::Xc);
        assert_eq!(opts.camera_family(), CameraFamily::Xc);
    }

    #[test]
    fn gradation_mode_relaxes_factors() {
        let mut mode = OperationMode::default();
        assert_eq!(mode.correction_factors(), (1.0, 1.0));
        mode.gradation_correction = true;
        assert_eq!(mode.correction_factors(), (0.5, 1.25));
    }
}
