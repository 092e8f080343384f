use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thumbnailer::config::{self, Library, ResizerConfig};
use thumbnailer::engine::{ResizeError, ThumbnailEngine, ThumbnailRequest, batch_stats};
use thumbnailer::imaging::{ImageBackend, RustBackend, supported_input_extensions};
use thumbnailer::{cache, output};
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that pick an output format.
#[derive(clap::Args, Clone)]
struct FormatArgs {
    /// Force the output format (jpg, png, gif, webp, avif), skipping negotiation
    #[arg(long)]
    format: Option<String>,

    /// Client Accept header used for WEBP/AVIF negotiation
    #[arg(long)]
    accept: Option<String>,
}

impl FormatArgs {
    fn apply<'a>(&'a self, mut request: ThumbnailRequest<'a>) -> ThumbnailRequest<'a> {
        if let Some(format) = &self.format {
            request = request.format(format);
        }
        if let Some(accept) = &self.accept {
            request = request.accept(accept);
        }
        request
    }
}

#[derive(Parser)]
#[command(name = "thumbnailer")]
#[command(about = "On-demand image thumbnailer with an on-disk cache")]
#[command(long_about = "\
On-demand image thumbnailer with an on-disk cache

Sources live under the web root; derivatives are cached under the temp root,
one file per (source, directive, output format):

  www/photos/beach.jpg
  temp/resizer/photos/beach.jpg/c250xc150.webp

Directive grammar:

  [ifresize-][l|c|r]WIDTHx[t|c|b]HEIGHT[!][-hmN][-vmN][-qN]   or   auto

  300x200       fit inside 300x200, keep aspect ratio
  c300xc200     cover 300x200, then crop from the center
  300x200!      exactly 300x200, aspect ratio ignored
  ifresize-800x never upscale
  -q85          per-request quality (0-100)

Run 'thumbnailer gen-config' to generate a documented thumbnailer.toml.")]
#[command(version)]
struct Cli {
    /// Config file; stock defaults apply when it does not exist
    #[arg(long, default_value = "thumbnailer.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate (or fetch from cache) one derivative and print its path
    Process {
        /// Source path relative to the web root
        path: String,
        /// Resize directive; defaults to `auto`
        directive: Option<String>,
        #[command(flatten)]
        format: FormatArgs,
        /// Print a JSON report (path, format, mime, cache hit, ETag)
        #[arg(long)]
        json: bool,
    },
    /// Populate the cache for every image under the web root
    Warm {
        /// Directives to generate for each image
        #[arg(required = true)]
        directives: Vec<String>,
        /// Only walk this subdirectory of the web root
        #[arg(long)]
        under: Option<PathBuf>,
        #[command(flatten)]
        format: FormatArgs,
    },
    /// Print the absolute source path a request resolves to
    Resolve {
        /// Source path relative to the web root
        path: String,
    },
    /// Show the backend, output formats and server capabilities
    Formats,
    /// Validate config and directories without processing anything
    Check,
    /// Print a stock thumbnailer.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Process {
            path,
            directive,
            format,
            json,
        } => {
            let engine = open_engine(&cli.config)?;
            let mut request = format.apply(ThumbnailRequest::new(&path));
            if let Some(directive) = &directive {
                request = request.directive(directive);
            }
            let thumbnail = engine.process(&request)?;
            if json {
                let source = engine.source_image_path(&path)?;
                let etag = cache::etag(&source, &thumbnail.path)?;
                let report = output::ThumbnailReport::new(&thumbnail, etag);
                println!("{}", output::format_report(&report)?);
            } else {
                output::print_thumbnail(&thumbnail);
            }
        }
        Command::Warm {
            directives,
            under,
            format,
        } => {
            let engine = open_engine(&cli.config)?;
            let format = &format;
            let root = match &under {
                Some(dir) => engine.www_root().join(dir),
                None => engine.www_root().to_path_buf(),
            };
            let sources = find_sources(&root, engine.www_root())?;
            let requests: Vec<ThumbnailRequest<'_>> = sources
                .iter()
                .flat_map(|source| {
                    directives.iter().map(move |directive| {
                        format.apply(ThumbnailRequest::new(source).directive(directive))
                    })
                })
                .collect();

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let results = engine.process_batch(&requests, Some(tx));
            printer.join().unwrap();

            let stats = batch_stats(&results);
            println!("Cache: {}", stats);
            if stats.failures > 0 {
                return Err(
                    format!("{} of {} requests failed", stats.failures, stats.total()).into(),
                );
            }
        }
        Command::Resolve { path } => {
            let engine = open_engine(&cli.config)?;
            println!("{}", engine.resolve_source_path(&path)?.display());
        }
        Command::Formats => {
            let engine = open_engine(&cli.config)?;
            output::print_formats(
                engine.backend().name(),
                engine.server_support(),
                supported_input_extensions(),
            );
        }
        Command::Check => {
            let engine = open_engine(&cli.config)?;
            output::print_check(&output::CheckSummary {
                config_path: &cli.config,
                config_found: cli.config.is_file(),
                www_root: engine.www_root(),
                cache_root: engine.cache_root(),
                workers: engine.worker_count(),
            });
            println!("==> Configuration is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load config and start the engine on the raster backend named by `library`.
fn open_engine(
    config_path: &Path,
) -> Result<ThumbnailEngine<RustBackend>, Box<dyn std::error::Error>> {
    let config = config::load_config(config_path)?;
    Ok(build_engine(config)?)
}

fn build_engine(config: ResizerConfig) -> Result<ThumbnailEngine<RustBackend>, ResizeError> {
    match config.library {
        Library::Image => ThumbnailEngine::new(RustBackend::new(), config),
    }
}

/// Decodable images under `root`, as `/`-separated paths relative to `www_root`.
fn find_sources(root: &Path, www_root: &Path) -> Result<Vec<String>, walkdir::Error> {
    let extensions = supported_input_extensions();
    let mut sources = Vec::new();
    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let decodable = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext.to_ascii_lowercase().as_str()));
        if !decodable {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(www_root) {
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            sources.push(parts.join("/"));
        }
    }
    Ok(sources)
}
