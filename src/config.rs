//! Configuration types for every converter.
//!
//! Each format pair gets one flat options struct. Numeric knobs are clamped
//! at the point they enter the struct (builder setter or constructor) and
//! logged when the caller's value was out of range; they are never rejected.
//! Only values that cannot be given a meaning (a zero page number, an
//! absurd pixel limit) fail in `build()` with
//! [`ConvertError::InvalidConfig`].

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Default encoder quality for lossy formats.
pub const DEFAULT_QUALITY: u8 = 85;

/// Default long-edge limit in pixels. `0` disables downscaling.
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Upper bound for the long-edge limit (JPEG and PDF both top out near here).
pub const MAX_DIMENSION_LIMIT: u32 = 65_500;

/// Default time budget for one external process, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default PDF rasterisation density.
pub const DEFAULT_DPI: u32 = 150;

/// Clamp a caller-supplied quality into `[min, 100]`.
///
/// `min` is 1 for most encoders and 0 where the backend accepts 0
/// (`cwebp -q 0`). Out-of-range values are clamped, not rejected.
pub fn clamp_quality(value: i64, min: u8) -> u8 {
    let clamped = value.clamp(i64::from(min), 100);
    if clamped != value {
        warn!("Quality {} out of range, clamped to {}", value, clamped);
    }
    clamped as u8
}

/// Map a 0–100 quality onto a 0–9 compression level by integer division.
///
/// Buckets are linear: `quality * 9 / 100`, so 100 → 9, 50 → 4, 1 → 0.
pub fn quality_to_compression_level(quality: u8) -> u8 {
    (u16::from(quality.min(100)) * 9 / 100) as u8
}

// ── Process limits ───────────────────────────────────────────────────────

/// Bounds applied to every external process a strategy spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLimits {
    /// Wall-clock limit per process. Default: 120 s. Minimum: 1 s.
    pub timeout_secs: u64,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProcessLimits {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs: timeout_secs.max(1),
        }
    }
}

// ── Image options ────────────────────────────────────────────────────────

/// PNG zlib effort, as understood by the `image` crate's PNG encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

impl PngCompression {
    /// Collapse a 0–9 level onto the three encoder settings.
    pub fn from_level(level: u8) -> Self {
        match level {
            0..=3 => PngCompression::Fast,
            4..=6 => PngCompression::Default,
            _ => PngCompression::Best,
        }
    }

    /// Parse a `--compression` value: `fast`, `default`, `best`, or a digit
    /// 0–9. Anything else is reinterpreted as [`PngCompression::Default`].
    pub fn parse_lenient(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "fast" | "fastest" | "speed" => PngCompression::Fast,
            "default" | "balanced" => PngCompression::Default,
            "best" | "max" | "smallest" => PngCompression::Best,
            other => match other.parse::<u8>() {
                Ok(level) if level <= 9 => PngCompression::from_level(level),
                _ => {
                    warn!(
                        "Unknown compression '{}', falling back to 'default'",
                        other
                    );
                    PngCompression::Default
                }
            },
        }
    }
}

impl fmt::Display for PngCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PngCompression::Fast => "fast",
            PngCompression::Default => "default",
            PngCompression::Best => "best",
        };
        f.write_str(name)
    }
}

/// Options for raster image conversion.
///
/// Built via [`ImageOptions::builder()`] or [`ImageOptions::default()`].
///
/// # Example
/// ```rust
/// use convkit::ImageOptions;
///
/// let options = ImageOptions::builder()
///     .quality(140) // clamped to 100
///     .max_dimension(1024)
///     .build()
///     .unwrap();
/// assert_eq!(options.quality, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOptions {
    /// Encoder quality, 1–100. Default: 85.
    ///
    /// For JPEG and lossy WebP this is the encoder quality. For PNG it
    /// selects a compression level through [`quality_to_compression_level`].
    pub quality: u8,

    /// Prefer lossless encoding where the target supports both. Default: false.
    pub lossless: bool,

    /// Long-edge limit in pixels; larger images are downscaled preserving
    /// aspect ratio. `0` disables the limit. Default: 4096.
    pub max_dimension: u32,

    /// Spend extra effort to shrink the output (PNG filter search, dropping
    /// an unused alpha channel). Default: true.
    pub optimize: bool,

    /// Explicit PNG compression, overriding the quality-derived level.
    pub compression: Option<PngCompression>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            lossless: false,
            max_dimension: DEFAULT_MAX_DIMENSION,
            optimize: true,
            compression: None,
        }
    }
}

impl ImageOptions {
    pub fn builder() -> ImageOptionsBuilder {
        ImageOptionsBuilder {
            options: Self::default(),
        }
    }

    /// The PNG compression actually used: the explicit choice, otherwise
    /// the bucketed quality.
    pub fn png_compression(&self) -> PngCompression {
        self.compression.unwrap_or_else(|| {
            PngCompression::from_level(quality_to_compression_level(self.quality))
        })
    }
}

/// Builder for [`ImageOptions`].
#[derive(Debug)]
pub struct ImageOptionsBuilder {
    options: ImageOptions,
}

impl ImageOptionsBuilder {
    pub fn quality(mut self, quality: i64) -> Self {
        self.options.quality = clamp_quality(quality, 1);
        self
    }

    pub fn lossless(mut self, v: bool) -> Self {
        self.options.lossless = v;
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.options.max_dimension = px;
        self
    }

    pub fn optimize(mut self, v: bool) -> Self {
        self.options.optimize = v;
        self
    }

    pub fn compression(mut self, compression: PngCompression) -> Self {
        self.options.compression = Some(compression);
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<ImageOptions, ConvertError> {
        if self.options.max_dimension > MAX_DIMENSION_LIMIT {
            return Err(ConvertError::InvalidConfig(format!(
                "max dimension must be 0–{}, got {}",
                MAX_DIMENSION_LIMIT, self.options.max_dimension
            )));
        }
        Ok(self.options)
    }
}

// ── PDF rasterisation options ────────────────────────────────────────────

/// Options for rendering one PDF page to an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterOptions {
    /// 1-based page number. Default: 1.
    pub page: usize,
    /// Render density, clamped to 72–600. Default: 150.
    pub dpi: u32,
    /// Encoding applied to the rendered page.
    pub image: ImageOptions,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            page: 1,
            dpi: DEFAULT_DPI,
            image: ImageOptions::default(),
        }
    }
}

impl RasterOptions {
    pub fn new(page: usize, dpi: u32, image: ImageOptions) -> Result<Self, ConvertError> {
        if page == 0 {
            return Err(ConvertError::InvalidConfig(
                "Pages are 1-indexed, minimum is 1 (got 0)".into(),
            ));
        }
        let clamped = dpi.clamp(72, 600);
        if clamped != dpi {
            warn!("DPI {} out of range, clamped to {}", dpi, clamped);
        }
        Ok(Self {
            page,
            dpi: clamped,
            image,
        })
    }
}

// ── Tabular options ──────────────────────────────────────────────────────

/// JSON layout for tabular output.
///
/// | Orient    | Shape                                      |
/// |-----------|--------------------------------------------|
/// | `records` | `[{col: v, ...}, ...]` (default)           |
/// | `columns` | `{col: {row: v, ...}, ...}`                |
/// | `index`   | `{row: {col: v, ...}, ...}`                |
/// | `split`   | `{"columns": [...], "index": [...], "data": [[...]]}` |
/// | `values`  | `[[v, ...], ...]`                          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orient {
    #[default]
    Records,
    Columns,
    Index,
    Split,
    Values,
}

/// How detected date columns are written to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    /// `2024-01-31T00:00:00.000`
    Iso,
    /// Milliseconds since the Unix epoch, as a JSON number.
    Epoch,
}

/// Options for CSV ⇄ JSON conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularOptions {
    pub orient: Orient,
    /// Spaces per indent level; `None` or `Some(0)` writes compact JSON.
    pub indent: Option<usize>,
    /// Reformat date columns; `None` leaves them as the source text.
    pub date_format: Option<DateFormat>,
    /// Field delimiter. Default: `,`.
    pub delimiter: u8,
    /// Write a header row when producing CSV. Default: true.
    pub include_headers: bool,
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self {
            orient: Orient::default(),
            indent: None,
            date_format: None,
            delimiter: b',',
            include_headers: true,
        }
    }
}

impl TabularOptions {
    /// Interpret a delimiter argument. `\t` and `tab` mean a tab character.
    pub fn parse_delimiter(s: &str) -> Result<u8, ConvertError> {
        match s {
            "\\t" | "tab" | "\t" => Ok(b'\t'),
            _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
            _ => Err(ConvertError::InvalidConfig(format!(
                "delimiter must be a single ASCII character, got {s:?}"
            ))),
        }
    }
}

// ── Markdown options ─────────────────────────────────────────────────────

/// Options for Markdown → HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownOptions {
    /// Document `<title>`; defaults to the first heading, then the file stem.
    pub title: Option<String>,
    /// Inline local images as base64 `data:` URIs.
    pub embed_images: bool,
}
