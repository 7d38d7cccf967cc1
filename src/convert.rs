//! Conversion entry points: one function per format pair.
//!
//! Each function validates its input through the shared contract in
//! [`crate::attempt`], derives the target from the destination extension,
//! and declares the ordered strategy list for that target. Nothing here
//! talks to a backend directly.
//!
//! | Entry point          | Strategies, in order                        |
//! |----------------------|---------------------------------------------|
//! | [`convert_image`]    | image-rs / eps-writer / lopdf / cwebp       |
//! | [`pdf_to_image`]     | pdfium → ghostscript                        |
//! | [`convert_document`] | libreoffice → pandoc (when Pandoc can read the source) |
//! | [`csv_to_json`]      | csv                                         |
//! | [`json_to_csv`]      | csv                                         |
//! | [`markdown_to_html`] | pulldown-cmark → pandoc                     |

use crate::attempt::{extension_of, ConversionAttempt, InputRule, OutputCheck, StrategyList};
use crate::backends::eps::EpsStrategy;
use crate::backends::image::{CwebpStrategy, ImageStrategy, RasterTarget, IMAGE_INPUTS};
use crate::backends::markdown::{CmarkStrategy, MARKDOWN_INPUTS};
use crate::backends::office::{
    document_check, LibreOfficeStrategy, DOCUMENT_INPUTS, DOCUMENT_OUTPUTS,
};
use crate::backends::pandoc::{self, PandocStrategy};
use crate::backends::pdf::ImagePdfStrategy;
use crate::backends::raster::{GhostscriptStrategy, PdfiumStrategy, PAGE_OUTPUTS};
use crate::backends::tabular::{CsvToJsonStrategy, JsonToCsvStrategy, CSV_INPUTS, JSON_INPUTS};
use crate::config::{ImageOptions, MarkdownOptions, ProcessLimits, RasterOptions, TabularOptions};
use crate::error::ConvertError;
use crate::output::ConversionReport;
use crate::progress::Observer;
use std::path::Path;

/// Image output extensions.
pub const IMAGE_OUTPUTS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "eps", "pdf", "bmp", "gif", "tif", "tiff",
];

/// Settings shared by every converter.
#[derive(Clone, Default)]
pub struct ConvertContext {
    pub limits: ProcessLimits,
    pub observer: Option<Observer>,
}

impl ConvertContext {
    pub fn new(limits: ProcessLimits) -> Self {
        Self {
            limits,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// A conversion and its options, for callers that pick the converter at
/// runtime.
#[derive(Debug, Clone)]
pub enum ConversionRequest {
    Image(ImageOptions),
    PdfToImage(RasterOptions),
    Document,
    CsvToJson(TabularOptions),
    JsonToCsv(TabularOptions),
    Markdown(MarkdownOptions),
}

fn target_of(destination: &Path, accepted: &[&str]) -> Result<String, ConvertError> {
    extension_of(destination)
        .filter(|ext| accepted.contains(&ext.as_str()))
        .ok_or_else(|| ConvertError::UnsupportedOutput {
            path: destination.to_path_buf(),
            expected: accepted.join(", "),
        })
}

fn begin(
    source: &Path,
    destination: &Path,
    inputs: &'static [&'static str],
    ctx: &ConvertContext,
) -> ConversionAttempt {
    ConversionAttempt::new(source, destination)
        .accept(InputRule::extensions(inputs))
        .with_observer(ctx.observer.clone())
}

// ── Images ───────────────────────────────────────────────────────────────

/// Convert a raster image to another image format, EPS, or a one-page PDF.
///
/// The target format comes from the destination extension.
///
/// # Example
/// ```rust,no_run
/// use convkit::{convert_image, ConvertContext, ImageOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), convkit::ConvertError> {
/// let options = ImageOptions::builder().quality(80).max_dimension(2048).build()?;
/// let report = convert_image("photo.png", "photo.jpg", &options, &ConvertContext::default()).await?;
/// println!("{} → {} bytes", report.original_size, report.produced_size);
/// # Ok(())
/// # }
/// ```
pub async fn convert_image(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &ImageOptions,
    ctx: &ConvertContext,
) -> Result<ConversionReport, ConvertError> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    begin(source, destination, IMAGE_INPUTS, ctx)
        .run(|dest| image_strategies(dest, options, ctx.limits))
        .await
}

fn image_strategies(
    destination: &Path,
    options: &ImageOptions,
    limits: ProcessLimits,
) -> Result<StrategyList, ConvertError> {
    let target = target_of(destination, IMAGE_OUTPUTS)?;
    let strategies: StrategyList = match target.as_str() {
        "eps" => vec![Box::new(EpsStrategy::new(options.clone()))],
        "pdf" => vec![Box::new(ImagePdfStrategy::new(options.clone()))],
        "webp" if options.lossless => vec![
            Box::new(ImageStrategy::new(RasterTarget::WebpLossless, options.clone())),
            Box::new(CwebpStrategy::new(options.clone(), limits)),
        ],
        "webp" => vec![Box::new(CwebpStrategy::new(options.clone(), limits))],
        ext => {
            let raster = RasterTarget::from_extension(ext).ok_or_else(|| {
                ConvertError::UnsupportedOutput {
                    path: destination.to_path_buf(),
                    expected: IMAGE_OUTPUTS.join(", "),
                }
            })?;
            vec![Box::new(ImageStrategy::new(raster, options.clone()))]
        }
    };
    Ok(strategies)
}

// ── PDF pages ────────────────────────────────────────────────────────────

/// Render one page of a PDF to PNG, JPEG or WebP.
pub async fn pdf_to_image(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &RasterOptions,
    ctx: &ConvertContext,
) -> Result<ConversionReport, ConvertError> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    begin(source, destination, &["pdf"], ctx)
        .run(|dest| {
            target_of(dest, PAGE_OUTPUTS)?;
            let strategies: StrategyList = vec![
                Box::new(PdfiumStrategy::new(options.clone())),
                Box::new(GhostscriptStrategy::new(options.clone(), ctx.limits)),
            ];
            Ok(strategies)
        })
        .await
}

// ── Office documents ─────────────────────────────────────────────────────

/// Convert an office document; the target format comes from the
/// destination extension.
pub async fn convert_document(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    ctx: &ConvertContext,
) -> Result<ConversionReport, ConvertError> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    let source_ext = extension_of(source).unwrap_or_default();
    begin(source, destination, DOCUMENT_INPUTS, ctx)
        .run(|dest| {
            let target = target_of(dest, DOCUMENT_OUTPUTS)?;
            let mut strategies: StrategyList =
                vec![Box::new(LibreOfficeStrategy::new(target.clone(), ctx.limits))];
            if pandoc::can_convert(&source_ext, &target) {
                let check = document_check(&target);
                strategies.push(Box::new(
                    PandocStrategy::new(target, check, ctx.limits).standalone(true),
                ));
            }
            Ok(strategies)
        })
        .await
}

// ── Tabular data ─────────────────────────────────────────────────────────

/// Convert delimited text to JSON.
pub async fn csv_to_json(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &TabularOptions,
    ctx: &ConvertContext,
) -> Result<ConversionReport, ConvertError> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    begin(source, destination, CSV_INPUTS, ctx)
        .run(|dest| {
            target_of(dest, &["json"])?;
            let strategies: StrategyList =
                vec![Box::new(CsvToJsonStrategy::new(options.clone()))];
            Ok(strategies)
        })
        .await
}

/// Convert a JSON table to delimited text.
pub async fn json_to_csv(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &TabularOptions,
    ctx: &ConvertContext,
) -> Result<ConversionReport, ConvertError> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    begin(source, destination, JSON_INPUTS, ctx)
        .run(|dest| {
            target_of(dest, &["csv", "tsv", "txt"])?;
            let strategies: StrategyList =
                vec![Box::new(JsonToCsvStrategy::new(options.clone()))];
            Ok(strategies)
        })
        .await
}

// ── Markdown ─────────────────────────────────────────────────────────────

/// Render Markdown to a standalone HTML document.
pub async fn markdown_to_html(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &MarkdownOptions,
    ctx: &ConvertContext,
) -> Result<ConversionReport, ConvertError> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    begin(source, destination, MARKDOWN_INPUTS, ctx)
        .run(|dest| {
            target_of(dest, &["html", "htm"])?;

            let mut pandoc =
                PandocStrategy::new("html", OutputCheck::Html, ctx.limits).standalone(true);
            match &options.title {
                Some(title) => pandoc = pandoc.arg(format!("--metadata=title:{title}")),
                None => {
                    let stem = source
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "Document".into());
                    pandoc = pandoc.arg(format!("--metadata=pagetitle:{stem}"));
                }
            }
            if options.embed_images {
                pandoc = pandoc.arg("--embed-resources");
                if let Some(dir) = source.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let mut resource_path = std::ffi::OsString::from("--resource-path=");
                    resource_path.push(dir.as_os_str());
                    pandoc = pandoc.arg(resource_path);
                }
            }

            let strategies: StrategyList = vec![
                Box::new(CmarkStrategy::new(options.clone())),
                Box::new(pandoc),
            ];
            Ok(strategies)
        })
        .await
}

// ── Dispatch ─────────────────────────────────────────────────────────────

/// Run the converter named by `request`.
pub async fn convert(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    request: &ConversionRequest,
    ctx: &ConvertContext,
) -> Result<ConversionReport, ConvertError> {
    let (source, destination) = (source.as_ref(), destination.as_ref());
    match request {
        ConversionRequest::Image(o) => convert_image(source, destination, o, ctx).await,
        ConversionRequest::PdfToImage(o) => pdf_to_image(source, destination, o, ctx).await,
        ConversionRequest::Document => convert_document(source, destination, ctx).await,
        ConversionRequest::CsvToJson(o) => csv_to_json(source, destination, o, ctx).await,
        ConversionRequest::JsonToCsv(o) => json_to_csv(source, destination, o, ctx).await,
        ConversionRequest::Markdown(o) => markdown_to_html(source, destination, o, ctx).await,
    }
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    request: &ConversionRequest,
    ctx: &ConvertContext,
) -> Result<ConversionReport, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(source, destination, request, ctx))
}
