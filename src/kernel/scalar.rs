//! Scalar SAD kernel.

use crate::kernel::SadKernel;
use crate::util::math::abs_diff_u8;

/// Portable scalar SAD kernel.
pub struct ScalarSad;

impl SadKernel for ScalarSad {
    #[inline]
    fn row_sad(a: &[u8], b: &[u8]) -> u32 {
        a.iter().zip(b).map(|(&x, &y)| abs_diff_u8(x, y)).sum()
    }
}
