//! Pure Rust image processing backend on top of the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, TIFF, WebP) | `ImageReader` + `DynamicImage::from_decoder` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Crop | `DynamicImage::crop_imm` |
//! | Encode → JPEG | `jpeg_encoder::Encoder`, progressive when interlacing |
//! | Encode → PNG | `PngEncoder::new_with_quality`, zlib level 0 (stored) to 9 |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy) |
//! | Encode → AVIF | `AvifEncoder::new_with_speed_quality` (rav1e, speed 6) |
//! | Encode → GIF | `DynamicImage::write_to` |
//!
//! The ICC profile read at decode time is carried alongside the pixels and
//! re-embedded on save unless [`strip`](ImageBackend::strip) dropped it. Lossy
//! WebP output never carries one. No other metadata survives decoding.

use super::backend::{BackendError, Dimensions, ImageBackend, Point};
use super::params::SaveOptions;
use crate::format::OutputFormat;
use image::codecs::avif::AvifEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, ImageReader};
use jpeg_encoder::{ColorType as JpegColor, Encoder as JpegWriter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::LazyLock;

/// AVIF encode speed (1 slowest, 10 fastest).
const AVIF_SPEED: u8 = 6;

/// Extensions whose decoders are compiled in.
///
/// AVIF is not listed: the `"avif"` feature only enables the encoder.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("jfif", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("gif", ImageFormat::Gif),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// A decoded image plus the colour profile it was stored with.
pub struct DecodedImage {
    pub pixels: DynamicImage,
    pub icc_profile: Option<Vec<u8>>,
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn image_format(format: OutputFormat) -> ImageFormat {
    match format {
        OutputFormat::Jpeg => ImageFormat::Jpeg,
        OutputFormat::Png => ImageFormat::Png,
        OutputFormat::Gif => ImageFormat::Gif,
        OutputFormat::Webp => ImageFormat::WebP,
        OutputFormat::Avif => ImageFormat::Avif,
    }
}

/// Map the 0–9 zlib scale onto the encoder: 0 stores, 1-9 are zlib levels.
fn png_compression(level: u8) -> CompressionType {
    match level {
        0 => CompressionType::Uncompressed,
        level => CompressionType::Level(level.min(9)),
    }
}

/// Narrow to 8-bit channels, dropping alpha when the encoder cannot store it.
fn eight_bit(pixels: &DynamicImage, keep_alpha: bool) -> DynamicImage {
    match pixels.color() {
        ColorType::L8 | ColorType::Rgb8 => pixels.clone(),
        ColorType::La8 | ColorType::Rgba8 if keep_alpha => pixels.clone(),
        color if keep_alpha && color.has_alpha() => DynamicImage::ImageRgba8(pixels.to_rgba8()),
        _ => DynamicImage::ImageRgb8(pixels.to_rgb8()),
    }
}

/// 8-bit RGB or RGBA, the only layouts libwebp takes.
fn rgb_or_rgba(pixels: &DynamicImage) -> DynamicImage {
    match pixels {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => pixels.clone(),
        _ if pixels.color().has_alpha() => DynamicImage::ImageRgba8(pixels.to_rgba8()),
        _ => DynamicImage::ImageRgb8(pixels.to_rgb8()),
    }
}

fn encode_error(format: OutputFormat, err: impl std::fmt::Display) -> BackendError {
    BackendError::Encode {
        format: format.extension().to_string(),
        message: err.to_string(),
    }
}

/// Embed `icc` if the encoder supports it. Unsupported is not an error.
fn with_icc<E: ImageEncoder>(mut encoder: E, icc: Option<&Vec<u8>>) -> E {
    if let Some(profile) = icc {
        let _ = encoder.set_icc_profile(profile.clone());
    }
    encoder
}

impl ImageBackend for RustBackend {
    type Image = DecodedImage;

    fn name(&self) -> &'static str {
        "image"
    }

    fn can_encode(&self, format: OutputFormat) -> bool {
        image_format(format).writing_enabled()
    }

    fn open(&self, path: &Path) -> Result<DecodedImage, BackendError> {
        let decode_error = |e: image::ImageError| BackendError::Decode {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let mut decoder = reader.into_decoder().map_err(decode_error)?;
        let icc_profile = decoder.icc_profile().ok().flatten();
        let pixels = DynamicImage::from_decoder(decoder).map_err(decode_error)?;

        Ok(DecodedImage {
            pixels,
            icc_profile,
        })
    }

    fn size(&self, image: &DecodedImage) -> Dimensions {
        Dimensions::new(image.pixels.width(), image.pixels.height())
    }

    fn resize(&self, image: DecodedImage, size: Dimensions) -> DecodedImage {
        let pixels = image
            .pixels
            .resize_exact(size.width, size.height, FilterType::Lanczos3);
        DecodedImage { pixels, ..image }
    }

    fn crop(
        &self,
        image: DecodedImage,
        origin: Point,
        size: Dimensions,
    ) -> Result<DecodedImage, BackendError> {
        let (width, height) = (image.pixels.width(), image.pixels.height());
        if origin.x.saturating_add(size.width) > width
            || origin.y.saturating_add(size.height) > height
        {
            return Err(BackendError::ProcessingFailed(format!(
                "crop {size} at ({}, {}) exceeds {width}x{height}",
                origin.x, origin.y
            )));
        }
        let pixels = image
            .pixels
            .crop_imm(origin.x, origin.y, size.width, size.height);
        Ok(DecodedImage { pixels, ..image })
    }

    /// Drops the colour profile, the only metadata this backend keeps.
    fn strip(&self, image: &mut DecodedImage) {
        image.icc_profile = None;
    }

    fn save(
        &self,
        image: &DecodedImage,
        path: &Path,
        format: OutputFormat,
        options: &SaveOptions,
    ) -> Result<(), BackendError> {
        let mut writer = BufWriter::new(File::create(path)?);
        let icc = image.icc_profile.as_ref();

        match format {
            OutputFormat::Jpeg => {
                let pixels = eight_bit(&image.pixels, false);
                let color = match pixels.color() {
                    ColorType::L8 => JpegColor::Luma,
                    _ => JpegColor::Rgb,
                };
                let width = u16::try_from(pixels.width())
                    .map_err(|_| encode_error(format, "width exceeds 65535"))?;
                let height = u16::try_from(pixels.height())
                    .map_err(|_| encode_error(format, "height exceeds 65535"))?;

                let mut encoder =
                    JpegWriter::new(&mut writer, options.quality.value().clamp(1, 100));
                encoder.set_progressive(options.interlace);
                if let Some(profile) = icc {
                    encoder
                        .add_icc_profile(profile)
                        .map_err(|e| encode_error(format, e))?;
                }
                encoder
                    .encode(pixels.as_bytes(), width, height, color)
                    .map_err(|e| encode_error(format, e))?;
            }
            OutputFormat::Png => {
                let encoder = with_icc(
                    PngEncoder::new_with_quality(
                        &mut writer,
                        png_compression(options.png_compression),
                        PngFilter::Adaptive,
                    ),
                    icc,
                );
                image
                    .pixels
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_error(format, e))?;
            }
            OutputFormat::Webp => {
                let pixels = rgb_or_rgba(&image.pixels);
                let encoded = webp::Encoder::from_image(&pixels)
                    .map_err(|e| encode_error(format, e))?
                    .encode(f32::from(options.quality.value()));
                writer.write_all(&encoded)?;
            }
            OutputFormat::Avif => {
                let encoder = with_icc(
                    AvifEncoder::new_with_speed_quality(
                        &mut writer,
                        AVIF_SPEED,
                        options.quality.value(),
                    ),
                    icc,
                );
                eight_bit(&image.pixels, true)
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_error(format, e))?;
            }
            OutputFormat::Gif => {
                DynamicImage::ImageRgba8(image.pixels.to_rgba8())
                    .write_to(&mut writer, ImageFormat::Gif)
                    .map_err(|e| encode_error(format, e))?;
            }
        }

        writer.flush()?;
        Ok(())
    }
}
