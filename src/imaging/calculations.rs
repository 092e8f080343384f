//! Pure geometry for resize directives.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! [`calculate_new_size`] answers "what size should the resized image be",
//! [`crop_point`] answers "where does the crop box start inside it". The engine
//! resizes to the first, then crops the requested box at the second.

use super::backend::{Dimensions, Point};
use super::params::{HorizontalAnchor, ResizeParams, VerticalAnchor};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`ifresize` cannot be combined with crop anchors")]
pub struct IncompatibleParamsError;

/// Compute output dimensions for `params` applied to an image of `source` size.
///
/// - No width and no height: `source` unchanged.
/// - `!` with both sides: exactly the requested box.
/// - Otherwise scale to fit the requested box, keeping aspect ratio.
/// - Crop mode: scale up again until the result covers the whole crop box.
/// - `ifresize`: when the request is larger than the source, `source`.
///
/// # Examples
/// ```
/// # use thumbnailer::imaging::{calculate_new_size, Dimensions, ResizeParams};
/// let source = Dimensions::new(1600, 900);
/// let params: ResizeParams = "100x".parse().unwrap();
/// assert_eq!(calculate_new_size(source, &params).unwrap(), Dimensions::new(100, 56));
/// ```
pub fn calculate_new_size(
    source: Dimensions,
    params: &ResizeParams,
) -> Result<Dimensions, IncompatibleParamsError> {
    if params.if_resize && params.is_crop() {
        return Err(IncompatibleParamsError);
    }

    if params.has_no_dimensions() {
        return Ok(source);
    }

    if params.force_dimensions
        && let (Some(width), Some(height)) = (params.width, params.height)
    {
        return Ok(Dimensions::new(width, height));
    }

    let source_ratio = source.ratio();
    let desired_ratio = match (params.width, params.height) {
        (Some(width), Some(height)) => f64::from(width) / f64::from(height),
        _ => source_ratio,
    };

    let scale = match (params.width, params.height) {
        (Some(width), _) if desired_ratio <= source_ratio => {
            f64::from(width) / f64::from(source.width)
        }
        (_, Some(height)) => f64::from(height) / f64::from(source.height),
        // Width only, but the ratio test failed: impossible, desired == source.
        _ => 1.0,
    };

    let mut width = scaled(source.width, scale);
    let mut height = scaled(source.height, scale);

    if params.is_crop()
        && let (Some(req_width), Some(req_height)) = (params.width, params.height)
    {
        if width == req_width {
            width = positive_round(f64::from(width) * f64::from(req_height) / f64::from(height));
            height = req_height;
        } else {
            height = positive_round(f64::from(height) * f64::from(req_width) / f64::from(width));
            width = req_width;
        }
    }

    if params.if_resize && exceeds_source(source, params) {
        return Ok(source);
    }

    Ok(Dimensions::new(width, height))
}

/// Top-left corner of the requested crop box inside an image of `output` size.
///
/// Absent anchors and absent requested sides behave like `left` / `top`.
/// Offsets never go negative, even if rounding left `output` a pixel short.
pub fn crop_point(output: Dimensions, params: &ResizeParams) -> Point {
    let x = match (params.horizontal, params.width) {
        (Some(HorizontalAnchor::Center), Some(width)) => output.width.saturating_sub(width) / 2,
        (Some(HorizontalAnchor::Right), Some(width)) => output.width.saturating_sub(width),
        _ => 0,
    };
    let y = match (params.vertical, params.height) {
        (Some(VerticalAnchor::Center), Some(height)) => output.height.saturating_sub(height) / 2,
        (Some(VerticalAnchor::Bottom), Some(height)) => output.height.saturating_sub(height),
        _ => 0,
    };
    Point { x, y }
}

/// Size of the box actually cut out of an image of `output` size.
///
/// Normally the requested box; clamped to `output` so a one-pixel rounding
/// shortfall never makes the crop fall outside the image.
pub fn crop_size(output: Dimensions, params: &ResizeParams) -> Dimensions {
    Dimensions::new(
        params.width.unwrap_or(output.width).min(output.width),
        params.height.unwrap_or(output.height).min(output.height),
    )
}

fn exceeds_source(source: Dimensions, params: &ResizeParams) -> bool {
    match (params.width, params.height) {
        (Some(width), Some(height)) => width > source.width && height > source.height,
        (Some(width), None) => width > source.width,
        (None, Some(height)) => height > source.height,
        (None, None) => false,
    }
}

fn scaled(side: u32, scale: f64) -> u32 {
    positive_round(f64::from(side) * scale)
}

/// Round half away from zero, never below 1.
fn positive_round(value: f64) -> u32 {
    value.round().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: Dimensions = Dimensions {
        width: 1600,
        height: 900,
    };

    fn size(directive: &str) -> Dimensions {
        let params: ResizeParams = directive.parse().unwrap();
        calculate_new_size(SOURCE, &params).unwrap()
    }

    fn point(directive: &str) -> Point {
        let params: ResizeParams = directive.parse().unwrap();
        let output = calculate_new_size(SOURCE, &params).unwrap();
        crop_point(output, &params)
    }

    // =========================================================================
    // calculate_new_size tests
    // =========================================================================

    #[test]
    fn empty_directive_keeps_source() {
        assert_eq!(size("x"), SOURCE);
        assert_eq!(size("auto"), SOURCE);
    }

    #[test]
    fn width_only() {
        // 900 * 100/1600 = 56.25
        assert_eq!(size("100x"), Dimensions::new(100, 56));
    }

    #[test]
    fn height_only() {
        // 1600 * 100/900 = 177.8
        assert_eq!(size("x100"), Dimensions::new(178, 100));
    }

    #[test]
    fn fit_inside_box() {
        // 1:1 box is narrower than 16:9, width binds: 900 * 200/1600 = 112.5
        assert_eq!(size("200x200"), Dimensions::new(200, 113));
    }

    #[test]
    fn fit_inside_wide_box_is_height_bound() {
        assert_eq!(size("1000x100"), Dimensions::new(178, 100));
    }

    #[test]
    fn crop_covers_requested_box() {
        for directive in ["c250xc150", "l250xt150", "r250xb150"] {
            assert_eq!(size(directive), Dimensions::new(266, 150), "{directive}");
        }
    }

    #[test]
    fn crop_with_taller_box_scales_by_height() {
        // 800x450 after the fit, then up until 900 tall
        assert_eq!(size("c800xc900"), Dimensions::new(1600, 900));
    }

    #[test]
    fn force_dimensions_ignores_ratio() {
        assert_eq!(size("650x350!"), Dimensions::new(650, 350));
    }

    #[test]
    fn force_with_one_side_keeps_ratio() {
        assert_eq!(size("100x!"), Dimensions::new(100, 56));
    }

    #[test]
    fn ifresize_never_upscales() {
        assert_eq!(size("ifresize-2500x2500"), SOURCE);
        assert_eq!(size("ifresize-2000x"), SOURCE);
        assert_eq!(size("ifresize-x1000"), SOURCE);
    }

    #[test]
    fn ifresize_scales_down_normally() {
        assert_eq!(size("ifresize-1200x800"), Dimensions::new(1200, 675));
    }

    #[test]
    fn ifresize_with_one_side_larger_still_fits() {
        // Height exceeds, width does not: not "larger than source".
        assert_eq!(size("ifresize-800x1000"), Dimensions::new(800, 450));
    }

    #[test]
    fn plain_resize_upscales() {
        assert_eq!(size("3200x"), Dimensions::new(3200, 1800));
    }

    #[test]
    fn ifresize_with_crop_is_rejected() {
        for directive in ["ifresize-c2500xc1500", "ifresize-cxc", "ifresize-l10xb10!"] {
            let params: ResizeParams = directive.parse().unwrap();
            assert_eq!(
                calculate_new_size(SOURCE, &params),
                Err(IncompatibleParamsError),
                "{directive}"
            );
        }
    }

    #[test]
    fn tiny_scale_never_reaches_zero() {
        let params: ResizeParams = "1x".parse().unwrap();
        let out = calculate_new_size(Dimensions::new(1000, 1), &params).unwrap();
        assert_eq!(out, Dimensions::new(1, 1));
    }

    #[test]
    fn outputs_are_always_positive() {
        let sources = [(1, 1), (1, 5000), (5000, 1), (1600, 900), (333, 777)];
        let directives = [
            "1x", "x1", "1x1", "c1xc1", "r3xb7", "7x3!", "ifresize-1x1", "99999x", "x99999",
        ];
        for (w, h) in sources {
            for directive in directives {
                let params: ResizeParams = directive.parse().unwrap();
                let out = calculate_new_size(Dimensions::new(w, h), &params).unwrap();
                assert!(out.width > 0 && out.height > 0, "{directive} on {w}x{h}");
            }
        }
    }

    // =========================================================================
    // crop_point tests
    // =========================================================================

    #[test]
    fn exact_fit_has_no_offset() {
        assert_eq!(point("c1600xc900"), Point { x: 0, y: 0 });
    }

    #[test]
    fn same_ratio_crop_has_no_offset() {
        assert_eq!(point("c800xc450"), Point { x: 0, y: 0 });
    }

    #[test]
    fn horizontal_anchors() {
        assert_eq!(point("c800xc900"), Point { x: 400, y: 0 });
        assert_eq!(point("r800xc900"), Point { x: 800, y: 0 });
        assert_eq!(point("l800xc900"), Point { x: 0, y: 0 });
    }

    #[test]
    fn vertical_anchors() {
        assert_eq!(point("c1600xc450"), Point { x: 0, y: 225 });
        assert_eq!(point("c1600xb450"), Point { x: 0, y: 450 });
        assert_eq!(point("c1600xt450"), Point { x: 0, y: 0 });
    }

    #[test]
    fn centered_small_crop() {
        // 266x150 computed, 250x150 requested
        assert_eq!(point("c250xc150"), Point { x: 8, y: 0 });
        assert_eq!(point("r250xb150"), Point { x: 16, y: 0 });
    }

    #[test]
    fn crop_point_saturates() {
        let params: ResizeParams = "r300xb300".parse().unwrap();
        let origin = crop_point(Dimensions::new(299, 299), &params);
        assert_eq!(origin, Point { x: 0, y: 0 });
    }

    #[test]
    fn crop_size_is_clamped_to_output() {
        let params: ResizeParams = "c300xc300".parse().unwrap();
        assert_eq!(
            crop_size(Dimensions::new(299, 400), &params),
            Dimensions::new(299, 300)
        );
        assert_eq!(
            crop_size(Dimensions::new(500, 500), &params),
            Dimensions::new(300, 300)
        );
    }

    #[test]
    fn crop_box_stays_inside_output() {
        let sources = [(1600, 900), (900, 1600), (1000, 1000), (333, 777)];
        let directives = ["c250xc150", "l10xb500", "r640xt480", "c333xc333", "c1xc1"];
        for (w, h) in sources {
            for directive in directives {
                let params: ResizeParams = directive.parse().unwrap();
                let out = calculate_new_size(Dimensions::new(w, h), &params).unwrap();
                let origin = crop_point(out, &params);
                let crop = crop_size(out, &params);
                assert!(origin.x + crop.width <= out.width, "{directive} on {w}x{h}");
                assert!(origin.y + crop.height <= out.height, "{directive} on {w}x{h}");
            }
        }
    }
}
