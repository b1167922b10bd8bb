//! Convenience helpers for loading images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::{ImageView, OwnedImage};
use crate::util::{SelfCalError, SelfCalResult};
use std::path::Path;

/// Creates a borrowed view from a grayscale image buffer.
pub fn view_from_gray_image(img: &image::GrayImage) -> SelfCalResult<ImageView<'_, u8>> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    ImageView::from_slice(img.as_raw(), width, height)
}

/// Creates an owned image from a grayscale image buffer.
pub fn owned_from_gray_image(img: &image::GrayImage) -> SelfCalResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    OwnedImage::new(img.as_raw().clone(), width, height)
}

/// Loads an image from disk and converts it to a grayscale owned image.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> SelfCalResult<OwnedImage> {
    let img = image::open(path).map_err(|err| SelfCalError::ImageIo {
        reason: err.to_string(),
    })?;
    owned_from_gray_image(&img.to_luma8())
}

#[cfg(test)]
mod tests {
    use super::{load_gray_image, owned_from_gray_image, view_from_gray_image};
    use crate::util::SelfCalError;

    #[test]
    fn gray_buffers_keep_their_layout() {
        let img = image::GrayImage::from_fn(5, 3, |x, y| image::Luma([(y * 10 + x) as u8]));
        let view = view_from_gray_image(&img).unwrap();
        assert_eq!((view.width(), view.height()), (5, 3));
        assert_eq!(view.get(4, 2), Some(&24));

        let owned = owned_from_gray_image(&img).unwrap();
        assert_eq!(owned.data(), img.as_raw().as_slice());
    }

    #[test]
    fn missing_file_is_an_image_error() {
        let err = load_gray_image("does/not/exist.png").unwrap_err();
        assert!(matches!(err, SelfCalError::ImageIo { .. }));
    }
}
