//! Image → single-page PDF via `lopdf`, and the structural check used to
//! verify any produced PDF.

use crate::attempt::{OutputCheck, Strategy};
use crate::backends::image::{encode_jpeg, fit_within, load_image};
use crate::config::ImageOptions;
use crate::error::StrategyError;
use async_trait::async_trait;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use tracing::debug;

/// Largest page edge a PDF viewer is required to handle, in points.
const MAX_PAGE_POINTS: f32 = 14_400.0;

/// Number of pages in the PDF at `path`.
pub fn count_pages(path: &Path) -> Result<usize, String> {
    Document::load(path)
        .map(|doc| doc.get_pages().len())
        .map_err(|e| e.to_string())
}

/// Page size in points for an image of `w`×`h` pixels (one pixel per point,
/// scaled down uniformly to the PDF page-size limit).
fn page_size(w: u32, h: u32) -> (f32, f32) {
    let (w, h) = (w as f32, h as f32);
    let long = w.max(h);
    if long <= MAX_PAGE_POINTS {
        (w, h)
    } else {
        let k = MAX_PAGE_POINTS / long;
        (w * k, h * k)
    }
}

/// Build a one-page PDF whose page is `img` as a JPEG (DCTDecode) XObject.
pub fn image_to_pdf(img: &DynamicImage, quality: u8) -> Result<Document, StrategyError> {
    let jpeg = encode_jpeg(img, quality)?;
    let (px_w, px_h) = (img.width(), img.height());
    let (pt_w, pt_h) = page_size(px_w, px_h);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(px_w),
            "Height" => i64::from(px_h),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        jpeg,
    );
    let image_id = doc.add_object(image_stream);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    pt_w.into(),
                    0_i64.into(),
                    0_i64.into(),
                    pt_h.into(),
                    0_i64.into(),
                    0_i64.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content.encode().map_err(StrategyError::backend)?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Im0" => image_id },
    });

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), pt_w.into(), pt_h.into()],
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1_i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    debug!("Built PDF page {}x{} pt from {}x{} px", pt_w, pt_h, px_w, px_h);
    Ok(doc)
}

/// Embed the source image as the only page of a new PDF.
pub struct ImagePdfStrategy {
    options: ImageOptions,
}

impl ImagePdfStrategy {
    pub fn new(options: ImageOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Strategy for ImagePdfStrategy {
    fn name(&self) -> &str {
        "lopdf"
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let source = source.to_path_buf();
        let staging = staging.to_path_buf();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            let img = fit_within(load_image(&source)?, options.max_dimension);
            let mut doc = image_to_pdf(&img, options.quality)?;
            doc.save(&staging)?;
            Ok::<(), StrategyError>(())
        })
        .await
        .map_err(|e| StrategyError::backend(format!("PDF task panicked: {e}")))?
    }

    fn output_check(&self) -> OutputCheck {
        OutputCheck::Pdf
    }
}
