//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They sit between
//! the directive parser (which produces [`ResizeParams`]), the geometry
//! calculations (which consume them), and the [`backend`](super::backend)
//! (which receives [`SaveOptions`] when encoding).
//!
//! ## Types
//!
//! - [`ResizeParams`]: One parsed directive: requested box, anchors, flags, quality override.
//! - [`HorizontalAnchor`] / [`VerticalAnchor`]: Crop alignment codes (`l/c/r`, `t/c/b`).
//! - [`Quality`]: Lossy encoding quality (0–100). Clamped on construction.
//! - [`SaveOptions`]: Everything the encoder needs besides pixels and format.

use std::fmt;

/// Quality setting for lossy image encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.min(100) as u8)
    }

    /// Returns `None` for values outside 0–100 instead of clamping.
    pub fn checked(value: u32) -> Option<Self> {
        (value <= 100).then_some(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Remap onto the PNG compression scale (0–9).
    pub fn to_png_compression(self) -> u8 {
        (f64::from(self.0) * 9.0 / 100.0).round() as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(70)
    }
}

/// Horizontal crop anchor (`l`, `c`, `r`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HorizontalAnchor {
    Left,
    Center,
    Right,
}

impl HorizontalAnchor {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'l' => Some(Self::Left),
            b'c' => Some(Self::Center),
            b'r' => Some(Self::Right),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::Left => 'l',
            Self::Center => 'c',
            Self::Right => 'r',
        }
    }
}

/// Vertical crop anchor (`t`, `c`, `b`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerticalAnchor {
    Top,
    Center,
    Bottom,
}

impl VerticalAnchor {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b't' => Some(Self::Top),
            b'c' => Some(Self::Center),
            b'b' => Some(Self::Bottom),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::Top => 't',
            Self::Center => 'c',
            Self::Bottom => 'b',
        }
    }
}

/// One parsed resize directive.
///
/// Produced by [`parse_directive`](super::directive::parse_directive) and never
/// mutated afterwards. `Default` is the pass-through directive `x` (also what
/// `auto` parses to).
///
/// The [`Display`](fmt::Display) impl renders the canonical directive string,
/// which is what the cache uses as the file stem: `auto` renders as `x`,
/// leading-zero dimensions disappear, out-of-range qualities are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResizeParams {
    /// Only resize when the requested box is smaller than the source.
    pub if_resize: bool,
    pub horizontal: Option<HorizontalAnchor>,
    pub vertical: Option<VerticalAnchor>,
    /// `!` suffix: output exactly the requested box, ignoring aspect ratio.
    pub force_dimensions: bool,
    /// Reserved. Parsed and rendered, never used by geometry.
    pub horizontal_margin: Option<i32>,
    /// Reserved. Parsed and rendered, never used by geometry.
    pub vertical_margin: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Per-request override of the configured encode quality.
    pub quality: Option<Quality>,
}

impl ResizeParams {
    /// Crop mode requires both anchors.
    pub fn is_crop(&self) -> bool {
        self.horizontal.is_some() && self.vertical.is_some()
    }

    pub fn has_both_dimensions(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }

    pub fn has_no_dimensions(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

impl fmt::Display for ResizeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.if_resize {
            f.write_str("ifresize-")?;
        }
        if let Some(anchor) = self.horizontal {
            write!(f, "{}", anchor.code())?;
        }
        if let Some(width) = self.width {
            write!(f, "{width}")?;
        }
        f.write_str("x")?;
        if let Some(anchor) = self.vertical {
            write!(f, "{}", anchor.code())?;
        }
        if let Some(height) = self.height {
            write!(f, "{height}")?;
        }
        if self.force_dimensions {
            f.write_str("!")?;
        }
        if let Some(margin) = self.horizontal_margin {
            write!(f, "-hm{margin}")?;
        }
        if let Some(margin) = self.vertical_margin {
            write!(f, "-vm{margin}")?;
        }
        if let Some(quality) = self.quality {
            write!(f, "-q{}", quality.value())?;
        }
        Ok(())
    }
}

/// Encoder settings for one save.
///
/// `quality` applies to the lossy formats (JPEG, WEBP, AVIF);
/// `png_compression` is the 0–9 zlib level for PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub quality: Quality,
    pub png_compression: u8,
    /// Progressive scan. Only JPEG honours it; PNG, GIF, WEBP and AVIF are
    /// always written non-interlaced.
    pub interlace: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            png_compression: 9,
            interlace: true,
        }
    }
}
