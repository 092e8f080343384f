//! Output format negotiation.
//!
//! Picks the encoding of a derivative from three inputs:
//!
//! - the source file's extension (or an explicitly forced format),
//! - what this server can encode ([`ServerSupport`]),
//! - what the client accepts ([`ClientSupport`], from its `Accept` header).
//!
//! JPEG and PNG sources are *upgraded* to AVIF or WEBP when both sides support
//! it and the matching `[upgrade]` toggle is on. AVIF wins over WEBP. Every
//! other source format passes through unchanged.
//!
//! ```text
//! photo.jpg + Accept: image/avif,image/webp  →  avif
//! photo.jpg + Accept: image/webp             →  webp
//! photo.jpg + Accept: */*                    →  jpg
//! logo.png  + forced "jpeg"                  →  jpg
//! anim.gif                                   →  gif
//! scan.tiff                                  →  UnsupportedFormatError
//! ```

use crate::config::UpgradeConfig;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("output format `{format}` is not supported")]
pub struct UnsupportedFormatError {
    pub format: String,
}

/// An encoding a derivative can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Avif,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Gif,
        OutputFormat::Webp,
        OutputFormat::Avif,
    ];

    /// File extension used for cache entries. JPEG is always `jpg`.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// Case-insensitive lookup; `jpg`, `jpeg` and `jfif` are all JPEG.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jfif" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Formats every server can encode regardless of capability probing.
    fn always_supported(self) -> bool {
        matches!(self, Self::Jpeg | Self::Png | Self::Gif)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = UnsupportedFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| UnsupportedFormatError {
            format: s.to_string(),
        })
    }
}

/// Modern formats this server can encode. Resolved once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerSupport {
    pub webp: bool,
    pub avif: bool,
}

impl ServerSupport {
    pub fn supports(self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::Webp => self.webp,
            OutputFormat::Avif => self.avif,
            other => other.always_supported(),
        }
    }

    /// The full supported set, in [`OutputFormat::ALL`] order.
    pub fn formats(self) -> Vec<OutputFormat> {
        OutputFormat::ALL
            .into_iter()
            .filter(|f| self.supports(*f))
            .collect()
    }
}

/// Modern formats one client accepts. Derived per request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientSupport {
    pub webp: bool,
    pub avif: bool,
}

impl ClientSupport {
    /// Substring match on the raw `Accept` header value.
    pub fn from_accept(accept: &str) -> Self {
        Self {
            webp: accept.contains(OutputFormat::Webp.mime_type()),
            avif: accept.contains(OutputFormat::Avif.mime_type()),
        }
    }
}

/// Chooses the output format of each request.
#[derive(Debug, Clone, Copy)]
pub struct FormatSelector {
    server: ServerSupport,
    upgrades: UpgradeConfig,
}

impl FormatSelector {
    pub fn new(server: ServerSupport, upgrades: UpgradeConfig) -> Self {
        Self { server, upgrades }
    }

    pub fn server(&self) -> ServerSupport {
        self.server
    }

    /// Pick the output format for `source`.
    ///
    /// A `forced` format skips negotiation entirely but must still be one the
    /// server can encode.
    pub fn select(
        &self,
        source: &Path,
        forced: Option<&str>,
        client: ClientSupport,
    ) -> Result<OutputFormat, UnsupportedFormatError> {
        let format = match forced {
            Some(name) => name.parse()?,
            None => {
                let ext = source
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default();
                let format = OutputFormat::from_extension(ext).ok_or_else(|| {
                    UnsupportedFormatError {
                        format: ext.to_string(),
                    }
                })?;
                self.upgrade(format, client)
            }
        };

        if self.server.supports(format) {
            Ok(format)
        } else {
            Err(UnsupportedFormatError {
                format: format.extension().to_string(),
            })
        }
    }

    fn upgrade(&self, format: OutputFormat, client: ClientSupport) -> OutputFormat {
        let (to_avif, to_webp) = match format {
            OutputFormat::Jpeg => (self.upgrades.jpg_to_avif, self.upgrades.jpg_to_webp),
            OutputFormat::Png => (self.upgrades.png_to_avif, self.upgrades.png_to_webp),
            other => return other,
        };

        if to_avif && self.server.avif && client.avif {
            OutputFormat::Avif
        } else if to_webp && self.server.webp && client.webp {
            OutputFormat::Webp
        } else {
            format
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_SERVER: ServerSupport = ServerSupport {
        webp: true,
        avif: true,
    };
    const BOTH: ClientSupport = ClientSupport {
        webp: true,
        avif: true,
    };
    const WEBP_ONLY: ClientSupport = ClientSupport {
        webp: true,
        avif: false,
    };
    const NEITHER: ClientSupport = ClientSupport {
        webp: false,
        avif: false,
    };

    fn selector(server: ServerSupport) -> FormatSelector {
        FormatSelector::new(server, UpgradeConfig::default())
    }

    fn select(sel: &FormatSelector, path: &str, client: ClientSupport) -> OutputFormat {
        sel.select(Path::new(path), None, client).unwrap()
    }

    // =========================================================================
    // OutputFormat
    // =========================================================================

    #[test]
    fn jpeg_aliases_normalize_to_jpg() {
        for alias in ["jpg", "jpeg", "jfif", "JPG", "Jpeg"] {
            assert_eq!(alias.parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        }
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
    }

    #[test]
    fn unknown_format_is_unsupported() {
        let err = "bmp".parse::<OutputFormat>().unwrap_err();
        assert_eq!(err.format, "bmp");
    }

    #[test]
    fn mime_types() {
        assert_eq!(OutputFormat::Jpeg.mime_type(), "image/jpeg");
        assert_eq!(OutputFormat::Avif.mime_type(), "image/avif");
        assert_eq!(OutputFormat::Webp.to_string(), "webp");
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    #[test]
    fn accept_header_sets_both_flags() {
        assert_eq!(ClientSupport::from_accept("image/avif,image/webp"), BOTH);
    }

    #[test]
    fn accept_header_browser_style() {
        let client = ClientSupport::from_accept(
            "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
        );
        assert!(client.avif && client.webp);

        let legacy = ClientSupport::from_accept("image/png,image/*;q=0.8,*/*;q=0.5");
        assert_eq!(legacy, NEITHER);
    }

    #[test]
    fn server_supported_set() {
        assert_eq!(
            ServerSupport::default().formats(),
            vec![OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::Gif]
        );
        assert_eq!(FULL_SERVER.formats().len(), 5);
    }

    // =========================================================================
    // Selection
    // =========================================================================

    #[test]
    fn jpeg_upgrade_cascade() {
        let sel = selector(FULL_SERVER);
        assert_eq!(select(&sel, "a.jpg", BOTH), OutputFormat::Avif);
        assert_eq!(select(&sel, "a.jpeg", WEBP_ONLY), OutputFormat::Webp);
        assert_eq!(select(&sel, "a.JPG", NEITHER), OutputFormat::Jpeg);
    }

    #[test]
    fn png_upgrade_cascade() {
        let sel = selector(FULL_SERVER);
        assert_eq!(select(&sel, "a.png", BOTH), OutputFormat::Avif);
        assert_eq!(select(&sel, "a.png", WEBP_ONLY), OutputFormat::Webp);
        assert_eq!(select(&sel, "a.png", NEITHER), OutputFormat::Png);
    }

    #[test]
    fn server_without_modern_formats_never_upgrades() {
        let sel = selector(ServerSupport::default());
        assert_eq!(select(&sel, "a.jpg", BOTH), OutputFormat::Jpeg);
        assert_eq!(select(&sel, "a.png", BOTH), OutputFormat::Png);
    }

    #[test]
    fn avif_upgrade_toggle_falls_back_to_webp() {
        let upgrades = UpgradeConfig {
            jpg_to_avif: false,
            ..UpgradeConfig::default()
        };
        let sel = FormatSelector::new(FULL_SERVER, upgrades);
        assert_eq!(select(&sel, "a.jpg", BOTH), OutputFormat::Webp);
        assert_eq!(select(&sel, "a.png", BOTH), OutputFormat::Avif);
    }

    #[test]
    fn all_toggles_off_keeps_source_format() {
        let upgrades = UpgradeConfig {
            jpg_to_webp: false,
            png_to_webp: false,
            jpg_to_avif: false,
            png_to_avif: false,
        };
        let sel = FormatSelector::new(FULL_SERVER, upgrades);
        assert_eq!(select(&sel, "a.jpg", BOTH), OutputFormat::Jpeg);
        assert_eq!(select(&sel, "a.png", BOTH), OutputFormat::Png);
    }

    #[test]
    fn other_formats_pass_through() {
        let sel = selector(FULL_SERVER);
        assert_eq!(select(&sel, "anim.gif", BOTH), OutputFormat::Gif);
        assert_eq!(select(&sel, "photo.webp", BOTH), OutputFormat::Webp);
    }

    #[test]
    fn passthrough_webp_needs_server_support() {
        let sel = selector(ServerSupport::default());
        let err = sel
            .select(Path::new("photo.webp"), None, BOTH)
            .unwrap_err();
        assert_eq!(err.format, "webp");
    }

    #[test]
    fn unknown_source_extension_is_unsupported() {
        let sel = selector(FULL_SERVER);
        assert!(sel.select(Path::new("scan.tiff"), None, BOTH).is_err());
        assert!(sel.select(Path::new("README"), None, BOTH).is_err());
    }

    #[test]
    fn forced_format_skips_negotiation() {
        let sel = selector(FULL_SERVER);
        let format = sel
            .select(Path::new("a.png"), Some("jpeg"), BOTH)
            .unwrap();
        assert_eq!(format, OutputFormat::Jpeg);
    }

    #[test]
    fn forced_webp_without_server_support_is_unsupported() {
        let sel = selector(ServerSupport {
            webp: false,
            avif: true,
        });
        let err = sel
            .select(Path::new("a.jpg"), Some("webp"), BOTH)
            .unwrap_err();
        assert_eq!(err.format, "webp");
    }

    #[test]
    fn forced_unknown_format_is_unsupported() {
        let sel = selector(FULL_SERVER);
        let err = sel
            .select(Path::new("a.jpg"), Some("bmp"), BOTH)
            .unwrap_err();
        assert_eq!(err.format, "bmp");
    }
}
