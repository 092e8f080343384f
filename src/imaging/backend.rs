//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the raster capability the engine calls into:
//! open, size, resize, crop, strip, and save. Geometry and format choice are
//! decided before the backend sees anything, so a backend only ever executes
//! concrete pixel operations.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use [`tests::MockBackend`], which records every call.

use super::params::SaveOptions;
use crate::format::OutputFormat;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("cannot encode {format}: {message}")]
    Encode { format: String, message: String },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Width and height of an image, both non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// # Panics
    ///
    /// Panics when either side is zero. Geometry clamps every computed side to
    /// at least 1, so reaching this is a bug.
    pub fn new(width: u32, height: u32) -> Self {
        assert!(
            width > 0 && height > 0,
            "dimensions must be positive, got {width}x{height}"
        );
        Self { width, height }
    }

    pub fn ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Top-left corner of a crop box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// Trait for image processing backends.
///
/// The decoded image is an associated type so the engine never names a
/// concrete pixel buffer. Implementations must be `Sync`: the engine shares one
/// backend across its worker pool.
pub trait ImageBackend: Sync {
    type Image: Send;

    /// Short name shown by `thumbnailer formats`.
    fn name(&self) -> &'static str;

    /// Whether this backend can encode `format`.
    fn can_encode(&self, format: OutputFormat) -> bool;

    /// Decode the file at `path`.
    fn open(&self, path: &Path) -> Result<Self::Image, BackendError>;

    fn size(&self, image: &Self::Image) -> Dimensions;

    /// Scale to exactly `size`, ignoring aspect ratio.
    fn resize(&self, image: Self::Image, size: Dimensions) -> Self::Image;

    /// Cut a `size` box whose top-left corner is `origin`.
    fn crop(
        &self,
        image: Self::Image,
        origin: Point,
        size: Dimensions,
    ) -> Result<Self::Image, BackendError>;

    /// Drop embedded metadata (ICC profile, EXIF) so it is not re-encoded.
    fn strip(&self, image: &mut Self::Image);

    /// Encode `image` as `format` and write it to `path`.
    fn save(
        &self,
        image: &Self::Image,
        path: &Path,
        format: OutputFormat,
        options: &SaveOptions,
    ) -> Result<(), BackendError>;
}
