//! Image views and owned frame buffers.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. `OwnedImage` is the
//! contiguous buffer the engine copies each posted frame into.

use crate::util::{SelfCalError, SelfCalResult};

#[cfg(feature = "image-io")]
pub mod io;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> SelfCalResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> SelfCalResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(SelfCalError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns true if the `width x height` block at signed `(x, y)` lies inside the image.
    pub fn contains_block(&self, x: isize, y: isize, width: usize, height: usize) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        let (x, y) = (x as usize, y as usize);
        x.checked_add(width).is_some_and(|end| end <= self.width)
            && y.checked_add(height).is_some_and(|end| end <= self.height)
    }
}

impl ImageView<'_, u8> {
    /// Returns the pixel at signed `(x, y)`, clamping coordinates to the image.
    #[inline]
    pub fn clamped(&self, x: isize, y: isize) -> u8 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.stride + cx]
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> SelfCalResult<usize> {
    if width == 0 || height == 0 {
        return Err(SelfCalError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(SelfCalError::InvalidInput("stride must be >= width"));
    }
    let needed = (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(SelfCalError::InvalidDimensions { width, height })?;
    Ok(needed)
}

/// Owned contiguous grayscale image buffer.
#[derive(Clone, Debug)]
pub struct OwnedImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl OwnedImage {
    /// Creates an owned image from a contiguous buffer of exactly `width * height` bytes.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> SelfCalResult<Self> {
        let needed = checked_area(width, height)?;
        if data.len() != needed {
            return Err(SelfCalError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Allocates a zero-filled image.
    pub fn zeros(width: usize, height: usize) -> SelfCalResult<Self> {
        let needed = checked_area(width, height)?;
        Ok(Self {
            data: vec![0u8; needed],
            width,
            height,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the contiguous pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, u8> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Overwrites the image with the leading `width * height` bytes of `src`.
    ///
    /// Returns false and leaves the buffer untouched if `src` is too short.
    pub fn copy_from(&mut self, src: &[u8]) -> bool {
        let len = self.data.len();
        match src.get(..len) {
            Some(head) => {
                self.data.copy_from_slice(head);
                true
            }
            None => false,
        }
    }
}

fn checked_area(width: usize, height: usize) -> SelfCalResult<usize> {
    if width == 0 || height == 0 {
        return Err(SelfCalError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(SelfCalError::InvalidDimensions { width, height })
}

/// Reference/comparison frame pair owned by the calibration worker.
#[derive(Clone, Debug)]
pub struct FramePair {
    pub reference: OwnedImage,
    pub comparison: OwnedImage,
}

impl FramePair {
    /// Allocates both frames at the given size.
    pub fn new(width: usize, height: usize) -> SelfCalResult<Self> {
        Ok(Self {
            reference: OwnedImage::zeros(width, height)?,
            comparison: OwnedImage::zeros(width, height)?,
        })
    }

    /// Wraps two already-filled images of equal size.
    pub fn from_images(reference: OwnedImage, comparison: OwnedImage) -> SelfCalResult<Self> {
        if reference.width() != comparison.width() || reference.height() != comparison.height() {
            return Err(SelfCalError::InvalidInput(
                "reference and comparison frames differ in size",
            ));
        }
        Ok(Self {
            reference,
            comparison,
        })
    }

    /// Copies both source buffers in; returns false if either is too short.
    pub fn load(&mut self, reference: &[u8], comparison: &[u8]) -> bool {
        let needed = self.reference.data().len();
        if reference.len() < needed || comparison.len() < needed {
            return false;
        }
        self.reference.copy_from(reference) && self.comparison.copy_from(comparison)
    }
}
