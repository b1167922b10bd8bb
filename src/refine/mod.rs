//! Sub-pixel refinement helpers.

pub(crate) mod bilinear;
