//! Thumbnail generation engine.
//!
//! Ties the pipeline together for one request:
//!
//! ```text
//! path + directive + format + Accept
//!   → resolve source under www (reject traversal)
//!   → parse directive
//!   → select output format
//!   → cache path; valid entry? return it
//!   → decode → geometry → resize → crop → strip → encode (atomic write)
//! ```
//!
//! ## Concurrency
//!
//! The engine is `Sync` and meant to be shared by reference across request
//! threads. Decode/encode work runs on an engine-owned
//! [rayon](https://docs.rs/rayon) pool sized by `processing.max_processes`, so
//! at most that many images are in memory at once no matter how many callers
//! there are. [`process`](ThumbnailEngine::process) blocks until its job is done.
//!
//! Two concurrent misses for the same derivative may both encode. Each writes
//! its own temp file and renames it into place, so nobody ever reads a torn
//! file.

use crate::cache::{self, CacheStats};
use crate::config::{ConfigError, ResizerConfig, effective_threads};
use crate::format::{
    ClientSupport, FormatSelector, OutputFormat, ServerSupport, UnsupportedFormatError,
};
use crate::imaging::{
    BackendError, ImageBackend, IncompatibleParamsError, ParamsSyntaxError, ResizeParams,
    calculate_new_size, crop_point, crop_size, parse_directive,
};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

/// Directive used when the caller gives none.
const PASS_THROUGH: &str = "x";

#[derive(Error, Debug)]
pub enum ResizeError {
    #[error(transparent)]
    Syntax(#[from] ParamsSyntaxError),
    #[error(transparent)]
    Incompatible(#[from] IncompatibleParamsError),
    /// Path traversal or symlink escape. Deliberately carries no path.
    #[error("access to the requested image is not allowed")]
    Security,
    #[error("image not found or not readable: {0}")]
    ImageNotFoundOrReadable(String),
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),
    #[error("image processing failed: {0}")]
    Encode(#[source] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ResizeError {
    /// HTTP status an outer layer should answer with.
    pub fn status_hint(&self) -> u16 {
        match self {
            Self::Syntax(_) | Self::Incompatible(_) | Self::UnsupportedFormat(_) => 400,
            Self::Security => 403,
            Self::ImageNotFoundOrReadable(_) => 404,
            Self::Encode(_) | Self::Io(_) | Self::Config(_) => 500,
        }
    }
}

/// One thumbnail request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbnailRequest<'a> {
    /// Source path relative to the web root.
    pub path: &'a str,
    /// Raw directive; `None` and `"auto"` mean no resize.
    pub directive: Option<&'a str>,
    /// Forced output format, skipping negotiation.
    pub format: Option<&'a str>,
    pub client: ClientSupport,
}

impl<'a> ThumbnailRequest<'a> {
    pub fn new(path: &'a str) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    pub fn directive(mut self, directive: &'a str) -> Self {
        self.directive = Some(directive);
        self
    }

    pub fn format(mut self, format: &'a str) -> Self {
        self.format = Some(format);
        self
    }

    /// Derive client capabilities from an `Accept` header.
    pub fn accept(mut self, accept: &str) -> Self {
        self.client = ClientSupport::from_accept(accept);
        self
    }
}

/// A derivative ready to serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub cache_hit: bool,
}

/// Progress report for [`ThumbnailEngine::process_batch`].
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Done {
        index: usize,
        source: String,
        directive: String,
        thumbnail: Thumbnail,
    },
    Failed {
        index: usize,
        source: String,
        directive: String,
        error: String,
    },
}

/// Tally batch results into cache statistics.
pub fn batch_stats(results: &[Result<Thumbnail, ResizeError>]) -> CacheStats {
    let mut stats = CacheStats::default();
    for result in results {
        match result {
            Ok(t) if t.cache_hit => stats.hit(),
            Ok(_) => stats.miss(),
            Err(_) => stats.fail(),
        }
    }
    stats
}

/// `None` and `auto` both mean the pass-through directive.
fn normalize_directive(raw: Option<&str>) -> &str {
    match raw {
        None | Some("auto") => PASS_THROUGH,
        Some(raw) => raw,
    }
}

/// A `..` segment anywhere, with either separator.
fn has_parent_segment(requested: &str) -> bool {
    requested.split(['/', '\\']).any(|segment| segment == "..")
}

/// Keep only plain name components: drops leading `/`, `.` and prefixes.
fn sanitize(requested: &str) -> PathBuf {
    Path::new(requested)
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .collect()
}

struct ResolvedSource {
    absolute: PathBuf,
    relative: PathBuf,
}

/// Generates and caches derivatives. See the [module docs](self).
pub struct ThumbnailEngine<B: ImageBackend> {
    backend: B,
    config: ResizerConfig,
    www_root: PathBuf,
    cache_root: PathBuf,
    selector: FormatSelector,
    pool: rayon::ThreadPool,
}

impl<B: ImageBackend> ThumbnailEngine<B> {
    /// Validate `config`, prepare the cache root and probe `backend` for
    /// WEBP/AVIF support.
    pub fn new(backend: B, config: ResizerConfig) -> Result<Self, ResizeError> {
        config.validate()?;

        let www_dir = &config.paths.www_dir;
        if !www_dir.is_dir() {
            return Err(ConfigError::Validation(format!(
                "paths.www_dir {} is not a directory",
                www_dir.display()
            ))
            .into());
        }
        let www_root = www_dir.canonicalize()?;

        let cache_root = config.cache_root();
        std::fs::create_dir_all(&cache_root)?;

        let server = config.server_support(|format| backend.can_encode(format));
        let selector = FormatSelector::new(server, config.upgrade);

        let threads = effective_threads(&config.processing);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("thumbnailer-{i}"))
            .build()
            .map_err(io::Error::other)?;

        tracing::debug!(
            backend = backend.name(),
            www = %www_root.display(),
            cache = %cache_root.display(),
            threads,
            ?server,
            "engine ready"
        );

        Ok(Self {
            backend,
            config,
            www_root,
            cache_root,
            selector,
            pool,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn www_root(&self) -> &Path {
        &self.www_root
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn server_support(&self) -> ServerSupport {
        self.selector.server()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Absolute path of a source image, validated the same way `process` does.
    ///
    /// Useful for the `Last-Modified` / ETag input of an HTTP layer.
    pub fn source_image_path(&self, relative: &str) -> Result<PathBuf, ResizeError> {
        self.resolve_source_path(relative)
    }

    /// Resolve `relative` under the web root.
    ///
    /// - any `..` segment → [`ResizeError::Security`], whether or not the target exists
    /// - not an openable regular file → [`ResizeError::ImageNotFoundOrReadable`]
    /// - resolves outside the web root (symlink) → [`ResizeError::Security`]
    pub fn resolve_source_path(&self, relative: &str) -> Result<PathBuf, ResizeError> {
        self.resolve(relative).map(|source| source.absolute)
    }

    fn resolve(&self, requested: &str) -> Result<ResolvedSource, ResizeError> {
        if has_parent_segment(requested) {
            tracing::warn!(path = requested, "rejected path traversal attempt");
            return Err(ResizeError::Security);
        }

        let relative = sanitize(requested);
        let not_found = || ResizeError::ImageNotFoundOrReadable(relative.display().to_string());
        if relative.as_os_str().is_empty() {
            return Err(not_found());
        }

        let candidate = self.www_root.join(&relative);
        if !candidate.is_file() || File::open(&candidate).is_err() {
            return Err(not_found());
        }

        let absolute = candidate.canonicalize().map_err(|_| not_found())?;
        if !absolute.starts_with(&self.www_root) {
            tracing::warn!(path = requested, "rejected path escaping the web root");
            return Err(ResizeError::Security);
        }

        Ok(ResolvedSource { absolute, relative })
    }

    /// Return the derivative for `request`, generating it on a cache miss.
    pub fn process(&self, request: &ThumbnailRequest<'_>) -> Result<Thumbnail, ResizeError> {
        let directive = normalize_directive(request.directive);
        let source = self.resolve(request.path)?;
        let params = parse_directive(Some(directive))?;
        let format = self
            .selector
            .select(&source.absolute, request.format, request.client)?;

        let path = cache::cache_path(&self.cache_root, &source.relative, &params, format);
        if cache::is_valid_entry(&path) {
            tracing::debug!(cache = %path.display(), "cache hit");
            return Ok(Thumbnail {
                path,
                format,
                cache_hit: true,
            });
        }

        tracing::debug!(cache = %path.display(), "cache miss");
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        self.pool
            .install(|| self.generate(&source, &path, &params, format))?;
        tracing::info!(
            source = %source.relative.display(),
            directive = %params,
            %format,
            "generated derivative"
        );

        Ok(Thumbnail {
            path,
            format,
            cache_hit: false,
        })
    }

    /// Process many requests in parallel on the engine's pool.
    ///
    /// Results come back in request order. When `events` is given, one
    /// [`BatchEvent`] is sent per request as it completes.
    pub fn process_batch(
        &self,
        requests: &[ThumbnailRequest<'_>],
        events: Option<Sender<BatchEvent>>,
    ) -> Vec<Result<Thumbnail, ResizeError>> {
        self.pool.install(|| {
            requests
                .par_iter()
                .enumerate()
                .map(|(index, request)| {
                    let result = self.process(request);
                    if let Some(tx) = &events {
                        let source = request.path.to_string();
                        let directive = normalize_directive(request.directive).to_string();
                        let event = match &result {
                            Ok(thumbnail) => BatchEvent::Done {
                                index,
                                source,
                                directive,
                                thumbnail: thumbnail.clone(),
                            },
                            Err(e) => BatchEvent::Failed {
                                index,
                                source,
                                directive,
                                error: e.to_string(),
                            },
                        };
                        tx.send(event).ok();
                    }
                    result
                })
                .collect()
        })
    }

    fn generate(
        &self,
        source: &ResolvedSource,
        dest: &Path,
        params: &ResizeParams,
        format: OutputFormat,
    ) -> Result<(), ResizeError> {
        let image = self.backend.open(&source.absolute).map_err(|e| {
            tracing::debug!(source = %source.absolute.display(), error = %e, "decode failed");
            ResizeError::ImageNotFoundOrReadable(source.relative.display().to_string())
        })?;

        let original = self.backend.size(&image);
        let size = calculate_new_size(original, params)?;
        tracing::debug!(%original, %size, directive = %params, "geometry");

        let mut image = if size == original {
            image
        } else {
            self.backend.resize(image, size)
        };

        if params.is_crop() && params.has_both_dimensions() {
            let crop = crop_size(size, params);
            if crop != size {
                let origin = crop_point(size, params);
                image = self
                    .backend
                    .crop(image, origin, crop)
                    .map_err(ResizeError::Encode)?;
            }
        }

        if self.config.output.strip {
            self.backend.strip(&mut image);
        }

        let options = self.config.save_options(format, params.quality);
        cache::write_atomic(dest, |tmp| {
            self.backend
                .save(&image, tmp, format, &options)
                .map_err(ResizeError::Encode)
        })
    }
}
