//! Raster image encoding through the `image` crate, plus the `cwebp` tool
//! for lossy WebP (which `image` cannot write).
//!
//! Every strategy here decodes the source, applies the shared pixel
//! policies, then encodes:
//!
//! * downscale so the long edge fits `max_dimension` ([`fitted_dimensions`])
//! * flatten onto white when the target has no alpha ([`flatten_onto_white`])
//! * for PNG, drop an all-opaque alpha channel and keep the smallest of
//!   several filter choices when `optimize` is set

use crate::attempt::{OutputCheck, Strategy};
use crate::backends::write_file;
use crate::config::{ImageOptions, PngCompression, ProcessLimits};
use crate::error::StrategyError;
use crate::process::{require_program, run_tool, ToolCommand};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// Image extensions the decoder accepts.
pub const IMAGE_INPUTS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "bmp", "tif", "tiff",
];

/// Decode any image the `image` crate understands, sniffing the content
/// rather than trusting the extension.
pub fn load_image(path: &Path) -> Result<DynamicImage, StrategyError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| StrategyError::backend(format!("cannot decode '{}': {e}", path.display())))
}

/// Dimensions after fitting the long edge to `max_dimension`.
///
/// The short edge is scaled proportionally and rounded down, never below 1.
/// `max_dimension == 0` disables the limit.
pub fn fitted_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if max_dimension == 0 || width.max(height) <= max_dimension {
        return (width, height);
    }
    let scale = |short: u32, long: u32| -> u32 {
        let scaled = u64::from(short) * u64::from(max_dimension) / u64::from(long);
        (scaled as u32).max(1)
    };
    if width >= height {
        (max_dimension, scale(height, width))
    } else {
        (scale(width, height), max_dimension)
    }
}

/// Downscale `img` if it exceeds `max_dimension`.
pub fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let (nw, nh) = fitted_dimensions(w, h, max_dimension);
    if (nw, nh) == (w, h) {
        return img;
    }
    info!("Downscaling {}x{} → {}x{}", w, h, nw, nh);
    img.resize_exact(nw, nh, FilterType::Lanczos3)
}

/// Composite `img` onto an opaque white background.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let a = u32::from(px[3]);
        let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

/// Replace an alpha channel that is fully opaque everywhere.
fn drop_unused_alpha(img: DynamicImage) -> DynamicImage {
    match &img {
        DynamicImage::ImageRgba8(buf) if buf.pixels().all(|p| p[3] == u8::MAX) => {
            debug!("Dropping opaque alpha channel");
            DynamicImage::ImageRgb8(img.to_rgb8())
        }
        DynamicImage::ImageLumaA8(buf) if buf.pixels().all(|p| p[1] == u8::MAX) => {
            debug!("Dropping opaque alpha channel");
            DynamicImage::ImageLuma8(img.to_luma8())
        }
        _ => img,
    }
}

// ── Targets ──────────────────────────────────────────────────────────────

/// Raster formats the `image` crate writes for us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterTarget {
    Jpeg,
    Png,
    WebpLossless,
    Bmp,
    Gif,
    Tiff,
}

impl RasterTarget {
    /// Target for an output extension. WebP is always lossless here.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpg" | "jpeg" => Some(RasterTarget::Jpeg),
            "png" => Some(RasterTarget::Png),
            "webp" => Some(RasterTarget::WebpLossless),
            "bmp" => Some(RasterTarget::Bmp),
            "gif" => Some(RasterTarget::Gif),
            "tif" | "tiff" => Some(RasterTarget::Tiff),
            _ => None,
        }
    }
}

fn png_compression_type(c: PngCompression) -> CompressionType {
    match c {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    }
}

/// Encode `img` as `target` into memory, applying every pixel policy.
pub fn encode(
    img: DynamicImage,
    target: RasterTarget,
    options: &ImageOptions,
) -> Result<Vec<u8>, StrategyError> {
    let img = fit_within(img, options.max_dimension);
    match target {
        RasterTarget::Jpeg => encode_jpeg(&img, options.quality),
        RasterTarget::Png => encode_png(img, options),
        RasterTarget::WebpLossless => {
            let mut buf = Vec::new();
            let (w, h) = (img.width(), img.height());
            if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                WebPEncoder::new_lossless(&mut buf)
                    .write_image(rgba.as_raw(), w, h, image::ExtendedColorType::Rgba8)
                    .map_err(StrategyError::backend)?;
            } else {
                let rgb = img.to_rgb8();
                WebPEncoder::new_lossless(&mut buf)
                    .write_image(rgb.as_raw(), w, h, image::ExtendedColorType::Rgb8)
                    .map_err(StrategyError::backend)?;
            }
            Ok(buf)
        }
        RasterTarget::Bmp | RasterTarget::Tiff => {
            let img = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            let format = if target == RasterTarget::Bmp {
                ImageFormat::Bmp
            } else {
                ImageFormat::Tiff
            };
            write_with_format(&img, format)
        }
        RasterTarget::Gif => {
            write_with_format(&DynamicImage::ImageRgba8(img.to_rgba8()), ImageFormat::Gif)
        }
    }
}

fn write_with_format(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, StrategyError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format)
        .map_err(StrategyError::backend)?;
    Ok(buf.into_inner())
}

/// JPEG at `quality`, flattened onto white.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, StrategyError> {
    let rgb = flatten_onto_white(img);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(StrategyError::backend)?;
    debug!("Encoded JPEG q{} → {} bytes", quality, buf.len());
    Ok(buf)
}

fn encode_png(img: DynamicImage, options: &ImageOptions) -> Result<Vec<u8>, StrategyError> {
    let compression = png_compression_type(options.png_compression());

    // PNG has no float samples.
    let img = match img {
        DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb16(img.to_rgb16()),
        DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba16(img.to_rgba16()),
        other => other,
    };
    let img = if options.optimize {
        drop_unused_alpha(img)
    } else {
        img
    };

    let filters: &[PngFilter] = if options.optimize {
        &[
            PngFilter::Adaptive,
            PngFilter::Paeth,
            PngFilter::Sub,
            PngFilter::NoFilter,
        ]
    } else {
        &[PngFilter::Adaptive]
    };

    let mut best: Option<Vec<u8>> = None;
    for &filter in filters {
        let mut buf = Vec::new();
        PngEncoder::new_with_quality(&mut buf, compression, filter)
            .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
            .map_err(StrategyError::backend)?;
        if best.as_ref().is_none_or(|b| buf.len() < b.len()) {
            best = Some(buf);
        }
    }

    let buf = best.ok_or_else(|| StrategyError::backend("no PNG filter produced output"))?;
    debug!(
        "Encoded PNG ({}) → {} bytes",
        options.png_compression(),
        buf.len()
    );
    Ok(buf)
}

// ── Strategies ───────────────────────────────────────────────────────────

/// Decode and re-encode with the `image` crate.
pub struct ImageStrategy {
    target: RasterTarget,
    options: ImageOptions,
}

impl ImageStrategy {
    pub fn new(target: RasterTarget, options: ImageOptions) -> Self {
        Self { target, options }
    }
}

#[async_trait]
impl Strategy for ImageStrategy {
    fn name(&self) -> &str {
        "image-rs"
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let source = source.to_path_buf();
        let staging = staging.to_path_buf();
        let target = self.target;
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            let img = load_image(&source)?;
            debug!(
                "Decoded {}: {}x{} {:?}",
                source.display(),
                img.width(),
                img.height(),
                img.color()
            );
            let bytes = encode(img, target, &options)?;
            write_file(&staging, &bytes)
        })
        .await
        .map_err(|e| StrategyError::backend(format!("encode task panicked: {e}")))?
    }

    fn output_check(&self) -> OutputCheck {
        OutputCheck::Image
    }
}

/// Formats `cwebp` reads directly; anything else goes through a PNG first.
const CWEBP_INPUTS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "webp"];

/// WebP via Google's `cwebp` encoder.
pub struct CwebpStrategy {
    options: ImageOptions,
    limits: ProcessLimits,
}

impl CwebpStrategy {
    pub fn new(options: ImageOptions, limits: ProcessLimits) -> Self {
        Self { options, limits }
    }
}

#[async_trait]
impl Strategy for CwebpStrategy {
    fn name(&self) -> &str {
        "cwebp"
    }

    fn check_available(&self) -> Result<(), StrategyError> {
        require_program("cwebp", &["cwebp"]).map(|_| ())
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let program = require_program("cwebp", &["cwebp"])?;

        let scratch = tempfile::tempdir()?;
        let readable = crate::attempt::extension_of(source)
            .map(|e| CWEBP_INPUTS.contains(&e.as_str()))
            .unwrap_or(false);
        let input = if readable {
            source.to_path_buf()
        } else {
            let png = scratch.path().join("input.png");
            let src = source.to_path_buf();
            let dst = png.clone();
            tokio::task::spawn_blocking(move || {
                let img = load_image(&src)?;
                img.save_with_format(&dst, ImageFormat::Png)
                    .map_err(StrategyError::backend)
            })
            .await
            .map_err(|e| StrategyError::backend(format!("transcode task panicked: {e}")))??;
            png
        };

        let mut cmd = ToolCommand::new("cwebp", program).arg("-quiet");
        if self.options.lossless {
            cmd = cmd.arg("-lossless");
        } else {
            cmd = cmd.arg("-q").arg(self.options.quality.to_string());
        }

        let (w, h) = image::image_dimensions(&input).map_err(StrategyError::backend)?;
        let (nw, nh) = fitted_dimensions(w, h, self.options.max_dimension);
        if (nw, nh) != (w, h) {
            cmd = cmd.arg("-resize").arg(nw.to_string()).arg(nh.to_string());
        }

        cmd = cmd.arg(&input).arg("-o").arg(staging);
        run_tool(&cmd, self.limits).await?;

        if let Err(e) = scratch.close() {
            warn!("Failed to remove cwebp scratch directory: {}", e);
        }
        Ok(())
    }

    fn output_check(&self) -> OutputCheck {
        OutputCheck::Image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x + y) % 256) as u8, 255])
        }))
    }

    #[test]
    fn fitting_keeps_aspect_and_floors() {
        assert_eq!(fitted_dimensions(8000, 6000, 4096), (4096, 3072));
        assert_eq!(fitted_dimensions(6000, 8000, 4096), (3072, 4096));
        assert_eq!(fitted_dimensions(1000, 3, 100), (100, 1));
        assert_eq!(fitted_dimensions(10_000, 1, 100), (100, 1));
        assert_eq!(fitted_dimensions(300, 200, 0), (300, 200));
        assert_eq!(fitted_dimensions(300, 200, 300), (300, 200));
    }

    #[test]
    fn fitting_property_over_shapes() {
        for (w, h) in [(5000, 1), (1, 5000), (4097, 4097), (9999, 4321), (123, 45678)] {
            let (nw, nh) = fitted_dimensions(w, h, 4096);
            assert!(nw.max(nh) <= 4096);
            assert!(nw >= 1 && nh >= 1);
            // Flooring the short edge loses less than one pixel.
            let exact_short = if w >= h {
                h as f64 * nw as f64 / w as f64
            } else {
                w as f64 * nh as f64 / h as f64
            };
            let short = nw.min(nh) as f64;
            assert!(exact_short - short < 1.0 || short == 1.0, "{w}x{h} → {nw}x{nh}");
        }
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(img));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([10, 20, 30]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn half_alpha_blends_toward_white() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(img));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([127, 127, 127]));
    }

    #[test]
    fn jpeg_of_transparent_image_is_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0])));
        let bytes = encode_jpeg(&img, 95).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        let px = decoded.get_pixel(8, 8);
        assert!(px.0.iter().all(|&c| c >= 250), "expected white, got {px:?}");
    }

    #[test]
    fn optimized_png_drops_opaque_alpha() {
        let options = ImageOptions::default();
        let bytes = encode(gradient(32, 32), RasterTarget::Png, &options).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(!decoded.color().has_alpha());
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }

    #[test]
    fn png_best_quality_is_not_larger() {
        let high = ImageOptions::builder().quality(100).build().unwrap();
        let low = ImageOptions::builder().quality(10).build().unwrap();
        let a = encode(gradient(128, 128), RasterTarget::Png, &high).unwrap();
        let b = encode(gradient(128, 128), RasterTarget::Png, &low).unwrap();
        assert!(a.len() <= b.len(), "q100 {} > q10 {}", a.len(), b.len());
    }

    #[test]
    fn encode_downscales_to_limit() {
        let options = ImageOptions::builder().max_dimension(50).build().unwrap();
        let bytes = encode(gradient(200, 80), RasterTarget::Bmp, &options).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 20));
    }

    #[test]
    fn every_target_round_trips_through_decoder() {
        let options = ImageOptions::default();
        for target in [
            RasterTarget::Jpeg,
            RasterTarget::Png,
            RasterTarget::WebpLossless,
            RasterTarget::Bmp,
            RasterTarget::Gif,
            RasterTarget::Tiff,
        ] {
            let bytes = encode(gradient(8, 8), target, &options).unwrap();
            assert!(image::load_from_memory(&bytes).is_ok(), "{target:?}");
        }
    }

    #[test]
    fn target_from_extension() {
        assert_eq!(RasterTarget::from_extension("jpeg"), Some(RasterTarget::Jpeg));
        assert_eq!(RasterTarget::from_extension("tif"), Some(RasterTarget::Tiff));
        assert_eq!(RasterTarget::from_extension("eps"), None);
    }

    #[tokio::test]
    async fn strategy_writes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.png");
        gradient(20, 10).save(&src).unwrap();
        let staging = dir.path().join("out.jpg");

        let s = ImageStrategy::new(RasterTarget::Jpeg, ImageOptions::default());
        s.attempt(&src, &staging).await.unwrap();
        let out = load_image(&staging).unwrap();
        assert_eq!((out.width(), out.height()), (20, 10));
    }
}
