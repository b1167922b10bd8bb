//! Rotation-compensated vertical difference solver.
//!
//! Rotating the comparison image by `theta` about the image center maps a
//! matched tile's top edge to
//! `y' = (x - cx) sin(theta) + (y - cy) cos(theta) + cy`, and the tile's
//! residual is `y'` minus the reference tile row. The solver evaluates
//! `theta = 0`, then walks in `ROTATION_STEP` increments in the positive
//! direction while the residual variance strictly decreases. The negative
//! direction is tried only if the very first positive step fails. This is a
//! local search and can settle in a local minimum of a multimodal curve.

use crate::config::AveragingParameter;
use crate::mesh::Mesh;
use crate::search::MatchResult;
use crate::trace::{trace_event, trace_span};
use crate::util::math::mean_variance;

/// Rotation search step in radians.
pub const ROTATION_STEP: f64 = 0.0001;
/// Maximum steps in each direction (0.01 rad).
pub const ROTATION_STEPS: i32 = 100;

/// One frame's drift estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameDifferenceEstimate {
    /// Number of matched tiles that fed the estimate.
    pub matched_tiles: usize,
    /// Mean residual at the best rotation, in pixels.
    pub vertical_difference: f64,
    /// Best rotation, in radians.
    pub rotation: f64,
    /// Residual standard deviation at the best rotation, in pixels.
    pub std_dev: f64,
}

impl FrameDifferenceEstimate {
    /// True if the estimate is reliable enough to enter the averaging queues.
    pub fn passes_gate(&self, averaging: &AveragingParameter) -> bool {
        self.matched_tiles >= averaging.min_match_number
            && self.std_dev <= averaging.max_diff_deviation
    }
}

/// Estimate plus per-tile residuals at the chosen rotation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RotationSolution {
    pub estimate: FrameDifferenceEstimate,
    /// Residual per mesh tile; zero for unmatched tiles.
    pub residuals: Vec<f64>,
}

/// Solver bound to the image rotation center.
#[derive(Clone, Copy, Debug)]
pub struct RotationSolver {
    cx: f64,
    cy: f64,
}

impl RotationSolver {
    /// Uses the integer image center `(width / 2, height / 2)`.
    pub fn new(image_width: usize, image_height: usize) -> Self {
        Self {
            cx: (image_width / 2) as f64,
            cy: (image_height / 2) as f64,
        }
    }

    fn residual(&self, theta: f64, x: f64, y: f64, reference_y: f64) -> f64 {
        (x - self.cx) * theta.sin() + (y - self.cy) * theta.cos() + self.cy - reference_y
    }

    fn residuals_at(&self, theta: f64, points: &[(f64, f64, f64)]) -> Vec<f64> {
        points
            .iter()
            .map(|&(x, y, ry)| self.residual(theta, x, y, ry))
            .collect()
    }

    /// Solves for the rotation that best aligns the matched tiles.
    pub fn solve(&self, mesh: &Mesh, matches: &[MatchResult]) -> RotationSolution {
        let _span = trace_span!("rotation_solve").entered();

        let mut points = Vec::new();
        let mut indices = Vec::new();
        for (tile, m) in mesh.tiles().iter().zip(matches) {
            if m.matched {
                points.push((m.left, m.top, tile.y as f64));
                indices.push(tile.index);
            }
        }

        let evaluate = |theta: f64| mean_variance(&self.residuals_at(theta, &points));
        let (mut best_mean, mut best_var) = evaluate(0.0);
        let mut best_theta = 0.0;

        if points.len() > 1 {
            let mut first_step_improved = false;
            for step in 1..=ROTATION_STEPS {
                let theta = step as f64 * ROTATION_STEP;
                let (mean, var) = evaluate(theta);
                if var < best_var {
                    best_mean = mean;
                    best_var = var;
                    best_theta = theta;
                    first_step_improved = true;
                } else {
                    break;
                }
            }
            if !first_step_improved {
                for step in 1..=ROTATION_STEPS {
                    let theta = -(step as f64) * ROTATION_STEP;
                    let (mean, var) = evaluate(theta);
                    if var < best_var {
                        best_mean = mean;
                        best_var = var;
                        best_theta = theta;
                    } else {
                        break;
                    }
                }
            }
        }

        let mut residuals = vec![0.0; mesh.len()];
        for (&idx, r) in indices
            .iter()
            .zip(self.residuals_at(best_theta, &points))
        {
            if let Some(slot) = residuals.get_mut(idx) {
                *slot = r;
            }
        }

        let estimate = FrameDifferenceEstimate {
            matched_tiles: points.len(),
            vertical_difference: best_mean,
            rotation: best_theta,
            std_dev: best_var.sqrt(),
        };
        trace_event!(
            "frame_estimate",
            matched = estimate.matched_tiles,
            difference = estimate.vertical_difference,
            rotation = estimate.rotation,
            std_dev = estimate.std_dev
        );
        RotationSolution {
            estimate,
            residuals,
        }
    }
}
