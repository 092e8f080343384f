//! # Thumbnailer
//!
//! On-demand image derivatives with an on-disk cache. A request names a
//! source image under the web root plus a compact resize directive; the
//! engine answers with the path of a cached derivative, generating it first
//! when needed.
//!
//! # Request Flow
//!
//! ```text
//! "photos/beach.jpg" + "c250xc150" + Accept
//!   → path check      (under www, no `..`, no symlink escape)
//!   → directive       centered 250x150 crop
//!   → format          jpg source + AVIF-capable client → avif
//!   → cache           temp/resizer/photos/beach.jpg/c250xc150.avif
//!   → hit? return it : decode → resize → crop → strip → encode → rename
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Directive grammar, geometry, and the `ImageBackend` trait with its pure-Rust implementation |
//! | [`format`] | Output format negotiation from source extension, forced format, server and client support |
//! | [`cache`] | Cache paths, entry validity, atomic writes, ETag validators |
//! | [`engine`] | `ThumbnailEngine`: path security, cache lookup, generation on a bounded worker pool |
//! | [`config`] | `thumbnailer.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Directive Is the Contract
//!
//! The directive grammar (`[ifresize-][l|c|r]Wx[t|c|b]H[!][-hmN][-vmN][-qN]`)
//! is what URLs and templates embed, so it is parsed by hand with byte
//! positions in every error. Parsed params render back to one canonical
//! string, which is also the cache file stem: `auto`, `x` and no directive
//! all land on `x.<ext>`.
//!
//! ## Cache Entries Are Immutable
//!
//! A non-empty cache file is never rewritten or deleted. Writes go to a temp
//! file in the destination directory and are renamed into place, so a reader
//! sees either nothing or a complete image. Clearing the cache is an
//! operator's `rm -r`.
//!
//! ## Bounded Decoding
//!
//! Decoded images are large. All decode and encode work runs on a rayon pool
//! owned by the engine and sized by `processing.max_processes`, so memory
//! stays bounded no matter how many request threads share one engine.
//!
//! ## Pure-Rust Imaging
//!
//! [`imaging::RustBackend`] uses the `image` crate for every codec, AVIF
//! encoding included. No ImageMagick, no system libraries. The backend sits
//! behind a trait so tests drive the engine with a recording mock.

pub mod cache;
pub mod config;
pub mod engine;
pub mod format;
pub mod imaging;
pub mod output;

#[cfg(test)]
pub(crate) mod test_helpers;
