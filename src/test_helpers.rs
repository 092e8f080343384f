//! Shared test utilities for the thumbnailer test suite.
//!
//! Provides synthetic image writers and a throwaway site layout (web root +
//! temp root) with a config pointing at it.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = TestSite::new(&["photos/a.jpg"]);
//! let engine = ThumbnailEngine::new(MockBackend::new(), site.config.clone()).unwrap();
//! create_test_png(&site.www().join("real.png"), 64, 48);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::ResizerConfig;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
}

/// Write a `width`×`height` gradient JPEG to `path`.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    gradient(width, height)
        .save_with_format(path, image::ImageFormat::Jpeg)
        .unwrap();
}

/// Write a `width`×`height` gradient PNG to `path`.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    gradient(width, height)
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

// =========================================================================
// Site layout
// =========================================================================

/// A temp directory holding `www/` and `temp/`, plus a config for them.
///
/// Files listed at construction are created under `www/` with placeholder
/// bytes: enough for path resolution and the mock backend, which never
/// decodes anything.
pub struct TestSite {
    pub tmp: TempDir,
    pub config: ResizerConfig,
}

impl TestSite {
    pub fn new(files: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        let www = tmp.path().join("www");
        fs::create_dir_all(&www).unwrap();

        for file in files {
            let path = www.join(file);
            ensure_parent(&path);
            fs::write(&path, b"placeholder").unwrap();
        }

        let mut config = ResizerConfig::default();
        config.paths.www_dir = www;
        config.paths.temp_dir = tmp.path().join("temp");
        config.processing.max_processes = Some(2);

        Self { tmp, config }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn www(&self) -> PathBuf {
        self.config.paths.www_dir.clone()
    }
}
