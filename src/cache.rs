//! On-disk derivative cache.
//!
//! Every derivative lives at a path computed purely from the request:
//!
//! ```text
//! <temp_dir>/<cache>/<source path relative to www>/<canonical directive>.<ext>
//!
//! temp/resizer/photos/beach.jpg/c250xc150.webp
//! temp/resizer/photos/beach.jpg/x.jpg          ← "auto", "x" and no directive
//! ```
//!
//! The cache is **not** content-addressed: editing a source in place does not
//! invalidate its derivatives. The directive segment is the canonical
//! rendering of the parsed [`ResizeParams`], so spellings that parse to the
//! same value (`auto` and `x`, `0100x` and `x`) share one entry.
//!
//! ## Validity
//!
//! An entry is valid when it is a regular file with nonzero size. A zero-byte
//! file is treated as a torn write from an older process and regenerated.
//!
//! ## Writes
//!
//! [`write_atomic`] encodes into a uniquely named temp file in the destination
//! directory and renames it into place. Readers either see no file or the
//! complete file; two racing writers for the same key both succeed and the
//! last rename wins. A failed write leaves nothing behind.

use crate::format::OutputFormat;
use crate::imaging::ResizeParams;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Prefix of in-flight temp files. Never a valid directive, so never a cache hit.
const TEMP_PREFIX: &str = ".tmp-";

/// Cache location of one derivative.
///
/// `relative` must already be sanitized (plain components only); the engine
/// guarantees this before calling.
pub fn cache_path(
    cache_root: &Path,
    relative: &Path,
    params: &ResizeParams,
    format: OutputFormat,
) -> PathBuf {
    cache_root
        .join(relative)
        .join(format!("{params}.{}", format.extension()))
}

/// A cache entry is usable when it exists as a regular, non-empty file.
pub fn is_valid_entry(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Write `dest` atomically.
///
/// `write` receives a temp path in `dest`'s directory and must create the
/// file there. An error from `write`, or an empty result, discards the temp
/// file and leaves `dest` untouched.
pub fn write_atomic<E>(dest: &Path, write: impl FnOnce(&Path) -> Result<(), E>) -> Result<(), E>
where
    E: From<io::Error>,
{
    let dir = dest.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", dest.display()),
        )
    })?;
    let suffix = dest
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(&suffix)
        .tempfile_in(dir)?;

    write(tmp.path())?;

    if std::fs::metadata(tmp.path())?.len() == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("encoder produced an empty file for {}", dest.display()),
        )
        .into());
    }

    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// HTTP validator for a served derivative: `<source mtime>-<sha256(cache path)>`.
///
/// Changes when the source is touched or the derivative's identity changes.
pub fn etag(source: &Path, cache_path: &Path) -> io::Result<String> {
    let modified = std::fs::metadata(source)?.modified()?;
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let digest = Sha256::digest(cache_path.to_string_lossy().as_bytes());
    Ok(format!("{secs}-{digest:x}"))
}

/// Summary of cache performance for a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    pub failures: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn fail(&mut self) {
        self.failures += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses + self.failures
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} generated ({} total)",
                self.hits,
                self.misses,
                self.total()
            )?;
        } else {
            write!(f, "{} generated", self.misses)?;
        }
        if self.failures > 0 {
            write!(f, ", {} failed", self.failures)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn params(directive: &str) -> ResizeParams {
        directive.parse().unwrap()
    }

    // =========================================================================
    // cache_path
    // =========================================================================

    #[test]
    fn cache_path_layout() {
        let path = cache_path(
            Path::new("temp/resizer"),
            Path::new("fixtures/test.png"),
            &params("c200xc200"),
            OutputFormat::Png,
        );
        assert_eq!(
            path,
            PathBuf::from("temp/resizer/fixtures/test.png/c200xc200.png")
        );
    }

    #[test]
    fn equivalent_directives_share_a_path() {
        let root = Path::new("cache");
        let rel = Path::new("a.jpg");
        let auto = cache_path(root, rel, &params("auto"), OutputFormat::Jpeg);
        let x = cache_path(root, rel, &params("x"), OutputFormat::Jpeg);
        let zeros = cache_path(root, rel, &params("0x0"), OutputFormat::Jpeg);
        assert_eq!(auto, x);
        assert_eq!(auto, zeros);
        assert!(auto.ends_with("a.jpg/x.jpg"));
    }

    #[test]
    fn format_is_part_of_the_key() {
        let root = Path::new("cache");
        let rel = Path::new("a.jpg");
        let p = params("100x");
        assert_ne!(
            cache_path(root, rel, &p, OutputFormat::Jpeg),
            cache_path(root, rel, &p, OutputFormat::Webp)
        );
    }

    // =========================================================================
    // is_valid_entry
    // =========================================================================

    #[test]
    fn valid_entry_requires_nonempty_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("x.jpg");

        assert!(!is_valid_entry(&file));

        fs::write(&file, b"").unwrap();
        assert!(!is_valid_entry(&file));

        fs::write(&file, b"data").unwrap();
        assert!(is_valid_entry(&file));

        assert!(!is_valid_entry(tmp.path()));
    }

    // =========================================================================
    // write_atomic
    // =========================================================================

    #[test]
    fn write_atomic_renames_into_place() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("x.jpg");

        write_atomic::<io::Error>(&dest, |p| {
            assert_eq!(p.parent(), Some(tmp.path()));
            assert!(p.file_name().unwrap().to_string_lossy().starts_with(TEMP_PREFIX));
            fs::write(p, b"encoded")
        })
        .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"encoded");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("x.jpg");
        fs::write(&dest, b"").unwrap();

        write_atomic::<io::Error>(&dest, |p| fs::write(p, b"fresh")).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"fresh");
    }

    #[test]
    fn write_atomic_failure_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("x.jpg");

        let result = write_atomic::<io::Error>(&dest, |p| {
            fs::write(p, b"partial")?;
            Err(io::Error::other("encoder crashed"))
        });

        assert!(result.is_err());
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn write_atomic_rejects_empty_output() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("x.jpg");

        let err = write_atomic::<io::Error>(&dest, |_| Ok(())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    // =========================================================================
    // etag
    // =========================================================================

    #[test]
    fn etag_is_mtime_dash_path_hash() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.jpg");
        fs::write(&source, b"img").unwrap();

        let tag = etag(&source, Path::new("temp/resizer/a.jpg/x.jpg")).unwrap();
        let (mtime, hash) = tag.split_once('-').unwrap();
        assert!(mtime.parse::<u64>().unwrap() > 0);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn etag_varies_with_cache_path() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.jpg");
        fs::write(&source, b"img").unwrap();

        let a = etag(&source, Path::new("a.jpg/100x.jpg")).unwrap();
        let b = etag(&source, Path::new("a.jpg/200x.jpg")).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, etag(&source, Path::new("a.jpg/100x.jpg")).unwrap());
    }

    #[test]
    fn etag_missing_source_is_error() {
        assert!(etag(Path::new("/nonexistent/a.jpg"), Path::new("x.jpg")).is_err());
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_with_hits() {
        let s = CacheStats {
            hits: 5,
            misses: 2,
            failures: 0,
        };
        assert_eq!(format!("{}", s), "5 cached, 2 generated (7 total)");
    }

    #[test]
    fn cache_stats_display_no_hits() {
        let mut s = CacheStats::default();
        s.miss();
        s.miss();
        s.miss();
        assert_eq!(format!("{}", s), "3 generated");
    }

    #[test]
    fn cache_stats_display_with_failures() {
        let mut s = CacheStats::default();
        s.hit();
        s.miss();
        s.fail();
        assert_eq!(format!("{}", s), "1 cached, 1 generated (3 total), 1 failed");
    }
}
