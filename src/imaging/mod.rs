//! Resize directives and image operations, pure Rust.
//!
//! | Concern | Where |
//! |---|---|
//! | **Directive grammar** | [`parse_directive`] → [`ResizeParams`] |
//! | **Geometry** | [`calculate_new_size`], [`crop_point`], [`crop_size`] |
//! | **Decode / encode** | [`ImageBackend`] trait + [`RustBackend`] (`image` crate) |
//!
//! The module is split into:
//! - **Directive**: text → [`ResizeParams`], with positioned syntax errors
//! - **Parameters**: data structures describing one resize and one save
//! - **Calculations**: pure dimension math (unit testable)
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
pub mod directive;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend, Point};
pub use calculations::{IncompatibleParamsError, calculate_new_size, crop_point, crop_size};
pub use directive::{ParamsSyntaxError, parse_directive};
pub use params::{HorizontalAnchor, Quality, ResizeParams, SaveOptions, VerticalAnchor};
pub use rust_backend::{RustBackend, supported_input_extensions};
