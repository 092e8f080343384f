//! Resize directive parser.
//!
//! A directive is the compact, URL-facing string appended to an image request.
//! It is the one external format existing links depend on, so the grammar is
//! matched exactly and anchored at both ends:
//!
//! ```text
//! auto
//! | [ "ifresize-" ]
//!   [ l | c | r ] [ width ]
//!   "x"
//!   [ t | c | b ] [ height ]
//!   [ "!" ]
//!   [ "-hm" [+-]digits ]
//!   [ "-vm" [+-]digits ]
//!   [ "-q" digits ]
//! ```
//!
//! | Directive | Meaning |
//! |---|---|
//! | `x`, `auto` | no resize, re-encode only |
//! | `100x` / `x100` | fit width / height, keep aspect ratio |
//! | `200x200` | fit inside the box |
//! | `650x350!` | exactly 650×350, aspect ratio ignored |
//! | `c250xc150` | cover 250×150, then crop centered |
//! | `ifresize-1200x800` | like `1200x800`, but never upscale |
//! | `100x200-q90` | quality override |
//!
//! A width or height of `0`, or one written with a leading zero, counts as
//! absent. A quality outside 0–100 is dropped rather than rejected.

use super::params::{HorizontalAnchor, Quality, ResizeParams, VerticalAnchor};
use std::str::FromStr;
use thiserror::Error;

const AUTO: &str = "auto";
const IF_RESIZE_PREFIX: &str = "ifresize-";
const HORIZONTAL_MARGIN_PREFIX: &str = "-hm";
const VERTICAL_MARGIN_PREFIX: &str = "-vm";
const QUALITY_PREFIX: &str = "-q";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsSyntaxError {
    #[error("no resize directive given")]
    Missing,
    #[error("resize directive is empty")]
    Empty,
    #[error("invalid resize directive `{input}`: expected {expected} at byte {position}")]
    Unexpected {
        input: String,
        position: usize,
        expected: &'static str,
    },
    #[error("invalid resize directive `{input}`: number at byte {position} is out of range")]
    OutOfRange { input: String, position: usize },
}

/// Parse an optional raw directive.
///
/// `None` is an error here; callers that treat a missing directive as `auto`
/// normalize before calling.
pub fn parse_directive(raw: Option<&str>) -> Result<ResizeParams, ParamsSyntaxError> {
    raw.ok_or(ParamsSyntaxError::Missing)?.parse()
}

impl FromStr for ResizeParams {
    type Err = ParamsSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParamsSyntaxError::Empty);
        }
        if s == AUTO {
            return Ok(Self::default());
        }
        Parser::new(s).parse()
    }
}

/// Single-pass cursor over the directive bytes.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<ResizeParams, ParamsSyntaxError> {
        let if_resize = self.eat_str(IF_RESIZE_PREFIX);

        let horizontal = self.peek().and_then(HorizontalAnchor::from_code);
        if horizontal.is_some() {
            self.pos += 1;
        }
        let width = self.dimension()?;

        if !self.eat(b'x') {
            return Err(self.unexpected("`x` between width and height"));
        }

        let vertical = self.peek().and_then(VerticalAnchor::from_code);
        if vertical.is_some() {
            self.pos += 1;
        }
        let height = self.dimension()?;

        let force_dimensions = self.eat(b'!');

        let horizontal_margin = if self.eat_str(HORIZONTAL_MARGIN_PREFIX) {
            Some(self.signed()?)
        } else {
            None
        };
        let vertical_margin = if self.eat_str(VERTICAL_MARGIN_PREFIX) {
            Some(self.signed()?)
        } else {
            None
        };
        let quality = if self.eat_str(QUALITY_PREFIX) {
            self.quality()?
        } else {
            None
        };

        if self.pos != self.input.len() {
            return Err(self.unexpected("`!`, `-hm`, `-vm`, `-q` or end of directive"));
        }

        Ok(ResizeParams {
            if_resize,
            horizontal,
            vertical,
            force_dimensions,
            horizontal_margin,
            vertical_margin,
            width,
            height,
            quality,
        })
    }

    fn rest(&self) -> &'a [u8] {
        &self.input.as_bytes()[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.rest().first().copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token.as_bytes()) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Consume a run of ASCII digits, possibly empty.
    fn digits(&mut self) -> &'a str {
        let len = self.rest().iter().take_while(|b| b.is_ascii_digit()).count();
        let start = self.pos;
        self.pos += len;
        &self.input[start..self.pos]
    }

    /// Width or height: absent when empty, zero, or written with a leading zero.
    fn dimension(&mut self) -> Result<Option<u32>, ParamsSyntaxError> {
        let start = self.pos;
        let digits = self.digits();
        if digits.is_empty() || digits.starts_with('0') {
            return Ok(None);
        }
        digits
            .parse::<u32>()
            .map(Some)
            .map_err(|_| self.out_of_range(start))
    }

    fn signed(&mut self) -> Result<i32, ParamsSyntaxError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                true
            }
            Some(b'+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        let digits = self.digits();
        if digits.is_empty() {
            return Err(self.unexpected("digits after margin"));
        }
        let magnitude = digits
            .parse::<i64>()
            .map_err(|_| self.out_of_range(start))?;
        let value = if negative { -magnitude } else { magnitude };
        i32::try_from(value).map_err(|_| self.out_of_range(start))
    }

    fn quality(&mut self) -> Result<Option<Quality>, ParamsSyntaxError> {
        let digits = self.digits();
        if digits.is_empty() {
            return Err(self.unexpected("digits after `-q`"));
        }
        Ok(digits.parse::<u32>().ok().and_then(Quality::checked))
    }

    fn unexpected(&self, expected: &'static str) -> ParamsSyntaxError {
        ParamsSyntaxError::Unexpected {
            input: self.input.to_string(),
            position: self.pos,
            expected,
        }
    }

    fn out_of_range(&self, position: usize) -> ParamsSyntaxError {
        ParamsSyntaxError::OutOfRange {
            input: self.input.to_string(),
            position,
        }
    }
}
