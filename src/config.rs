//! Thumbnailer configuration module.
//!
//! Handles loading, validating, and merging `thumbnailer.toml`. The file is
//! sparse: stock defaults are the base layer and the user file overrides just
//! the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! library = "image"         # Raster backend
//!
//! [paths]
//! www_dir = "www"           # Web root; sources resolve under it
//! temp_dir = "temp"         # Temp root
//! cache = "resizer"         # Cache sub-path under temp_dir
//!
//! [output]
//! interlace = true          # Progressive JPEG
//! strip = true              # Drop the ICC colour profile from derivatives
//!
//! [quality]
//! jpeg = 70                 # 0-100
//! webp = 70                 # 0-100
//! avif = 70                 # 0-100
//! png_compression = 9       # 0-9
//!
//! [upgrade]
//! jpg_to_webp = true
//! png_to_webp = true
//! jpg_to_avif = true
//! png_to_avif = true
//!
//! [server]                  # Omit to probe the backend
//! webp = true
//! avif = true
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Relative paths resolve against the working directory. Unknown keys are
//! rejected to catch typos early.

use crate::format::{OutputFormat, ServerSupport};
use crate::imaging::{Quality, SaveOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Raster backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    /// Pure Rust backend on the `image` crate.
    #[default]
    Image,
}

/// Thumbnailer configuration loaded from `thumbnailer.toml`.
///
/// Built once at startup and passed by value into the engine; nothing reads
/// it from global state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizerConfig {
    pub library: Library,
    pub paths: PathsConfig,
    pub output: OutputConfig,
    pub quality: QualityConfig,
    pub upgrade: UpgradeConfig,
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
}

impl ResizerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("quality.jpeg", self.quality.jpeg),
            ("quality.webp", self.quality.webp),
            ("quality.avif", self.quality.avif),
        ] {
            if value > 100 {
                return Err(ConfigError::Validation(format!("{key} must be 0-100")));
            }
        }
        if self.quality.png_compression > 9 {
            return Err(ConfigError::Validation(
                "quality.png_compression must be 0-9".into(),
            ));
        }
        for (key, path) in [
            ("paths.www_dir", &self.paths.www_dir),
            ("paths.temp_dir", &self.paths.temp_dir),
            ("paths.cache", &self.paths.cache),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if !self
            .paths
            .cache
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ConfigError::Validation(
                "paths.cache must be a relative path without `..`".into(),
            ));
        }
        Ok(())
    }

    /// Directory holding every cached derivative.
    pub fn cache_root(&self) -> PathBuf {
        self.paths.temp_dir.join(&self.paths.cache)
    }

    /// Encoder settings for one request.
    ///
    /// A per-request quality replaces the configured quality of every lossy
    /// format and is remapped onto the PNG compression scale.
    pub fn save_options(&self, format: OutputFormat, requested: Option<Quality>) -> SaveOptions {
        let configured = match format {
            OutputFormat::Webp => self.quality.webp,
            OutputFormat::Avif => self.quality.avif,
            _ => self.quality.jpeg,
        };
        SaveOptions {
            quality: requested.unwrap_or_else(|| Quality::new(configured)),
            png_compression: requested
                .map(Quality::to_png_compression)
                .unwrap_or(self.quality.png_compression as u8),
            interlace: self.output.interlace,
        }
    }

    /// Server capabilities: explicit `[server]` values win, the rest come from `probe`.
    pub fn server_support(&self, probe: impl Fn(OutputFormat) -> bool) -> ServerSupport {
        ServerSupport {
            webp: self
                .server
                .webp
                .unwrap_or_else(|| probe(OutputFormat::Webp)),
            avif: self
                .server
                .avif
                .unwrap_or_else(|| probe(OutputFormat::Avif)),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Web root. Every request path resolves under it.
    pub www_dir: PathBuf,
    /// Temp root.
    pub temp_dir: PathBuf,
    /// Cache sub-path under `temp_dir`. Must be relative.
    pub cache: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            www_dir: "www".into(),
            temp_dir: "temp".into(),
            cache: "resizer".into(),
        }
    }
}

/// Encoder post-processing toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Progressive JPEG. Other formats are never interlaced.
    pub interlace: bool,
    /// Drop the embedded colour profile. EXIF and other metadata never
    /// survive decoding, so this is the only thing the toggle controls.
    pub strip: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            interlace: true,
            strip: true,
        }
    }
}

/// Per-format encode quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    pub jpeg: u32,
    pub webp: u32,
    pub avif: u32,
    /// zlib level, 0-9.
    pub png_compression: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            jpeg: 70,
            webp: 70,
            avif: 70,
            png_compression: 9,
        }
    }
}

/// Which source formats may be served as a modern format instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpgradeConfig {
    pub jpg_to_webp: bool,
    pub png_to_webp: bool,
    pub jpg_to_avif: bool,
    pub png_to_avif: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            jpg_to_webp: true,
            png_to_webp: true,
            jpg_to_avif: true,
            png_to_avif: true,
        }
    }
}

/// Capability overrides. `None` means "ask the backend".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub webp: Option<bool>,
    pub avif: Option<bool>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, at least 1
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ResizerConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                let merged = match table.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                table.insert(key, merged);
            }
            toml::Value::Table(table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ResizerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ResizerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<ResizerConfig, ConfigError> {
    let overlay = load_raw_config(path)?;
    if overlay.is_none() {
        tracing::debug!(path = %path.display(), "no config file, using stock defaults");
    }
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `thumbnailer.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Thumbnailer Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Raster backend. Only "image" (pure Rust) is available.
library = "image"

# ---------------------------------------------------------------------------
# Paths (relative paths resolve against the working directory)
# ---------------------------------------------------------------------------
[paths]
# Web root. Every requested image path is resolved under this directory;
# requests that try to leave it are rejected.
www_dir = "www"

# Temp root.
temp_dir = "temp"

# Cache directory under temp_dir. Derivatives are stored as
#   <temp_dir>/<cache>/<image path>/<directive>.<ext>
cache = "resizer"

# ---------------------------------------------------------------------------
# Output post-processing
# ---------------------------------------------------------------------------
[output]
# Progressive JPEG. Other formats are never interlaced.
interlace = true

# Drop the ICC colour profile from derivatives. Other metadata (EXIF, XMP) is
# never carried over, so this only controls the colour profile.
strip = true

# ---------------------------------------------------------------------------
# Encode quality. A "-q<N>" directive suffix overrides these per request.
# ---------------------------------------------------------------------------
[quality]
jpeg = 70             # 0-100
webp = 70             # 0-100
avif = 70             # 0-100
png_compression = 9   # 0-9

# ---------------------------------------------------------------------------
# Format upgrades: serve AVIF/WEBP instead of JPEG/PNG when the client's
# Accept header and the server both allow it. AVIF is preferred.
# ---------------------------------------------------------------------------
[upgrade]
jpg_to_webp = true
png_to_webp = true
jpg_to_avif = true
png_to_avif = true

# ---------------------------------------------------------------------------
# Server capabilities. Omitted keys are probed from the backend.
# ---------------------------------------------------------------------------
[server]
# webp = true
# avif = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image workers. Omit for auto (= number of CPU cores).
# Values larger than the core count are clamped down.
# max_processes = 4
"##
}
