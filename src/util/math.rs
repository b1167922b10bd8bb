//! Numeric helpers shared by the solver, queues and correction paths.

/// Mean and population variance of a sample set.
///
/// Returns `(0.0, 0.0)` for an empty set. The variance is computed in two
/// passes and clamped to be non-negative.
pub(crate) fn mean_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.max(0.0))
}

/// Rounds to the nearest integer register unit, halves away from zero.
pub(crate) fn round_to_units(value: f64) -> i32 {
    let rounded = value.round();
    if rounded >= i32::MAX as f64 {
        i32::MAX
    } else if rounded <= i32::MIN as f64 {
        i32::MIN
    } else {
        rounded as i32
    }
}

/// Absolute difference of two 8-bit samples.
#[inline]
pub(crate) fn abs_diff_u8(a: u8, b: u8) -> u32 {
    (a as i32 - b as i32).unsigned_abs()
}

#[cfg(test)]
mod tests {
    use super::{abs_diff_u8, mean_variance, round_to_units};

    #[test]
    fn mean_variance_of_constant_is_zero() {
        let (mean, var) = mean_variance(&[0.3, 0.3, 0.3, 0.3]);
        assert!((mean - 0.3).abs() < 1e-12);
        assert!(var.abs() < 1e-20);
    }

    #[test]
    fn mean_variance_matches_population_formula() {
        let (mean, var) = mean_variance(&[1.0, 2.0, 3.0, 4.0]);
        assert!((mean - 2.5).abs() < 1e-12);
        assert!((var - 1.25).abs() < 1e-12);
    }

    #[test]
    fn mean_variance_empty_is_zero() {
        assert_eq!(mean_variance(&[]), (0.0, 0.0));
    }

    #[test]
    fn round_to_units_is_symmetric() {
        assert_eq!(round_to_units(4.8), 5);
        assert_eq!(round_to_units(-4.8), -5);
        assert_eq!(round_to_units(4.4), 4);
        assert_eq!(round_to_units(-0.4), 0);
    }

    #[test]
    fn abs_diff_u8_is_symmetric() {
        assert_eq!(abs_diff_u8(10, 250), 240);
        assert_eq!(abs_diff_u8(250, 10), 240);
    }
}
