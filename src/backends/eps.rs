//! Encapsulated PostScript output.
//!
//! Writes a level-2 EPS file holding one 8-bit RGB `colorimage`, hex
//! encoded. The bounding box is the pixel size, so one pixel maps to one
//! point. EPS has no transparency; alpha is flattened onto white.

use crate::attempt::{OutputCheck, Strategy};
use crate::backends::image::{fit_within, flatten_onto_white, load_image};
use crate::backends::write_file;
use crate::config::ImageOptions;
use crate::error::StrategyError;
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use std::fmt::Write as _;
use std::path::Path;

/// Hex bytes per line of image data (128 characters).
const BYTES_PER_LINE: usize = 64;

/// Render `img` as an EPS document.
pub fn write_eps(img: &DynamicImage) -> Vec<u8> {
    let rgb: RgbImage = flatten_onto_white(img);
    let (w, h) = (rgb.width(), rgb.height());

    let mut out = String::with_capacity(rgb.as_raw().len() * 2 + 512);
    out.push_str("%!PS-Adobe-3.0 EPSF-3.0\n");
    out.push_str("%%Creator: convkit\n");
    let _ = writeln!(out, "%%BoundingBox: 0 0 {w} {h}");
    out.push_str("%%LanguageLevel: 2\n");
    out.push_str("%%Pages: 1\n");
    out.push_str("%%EndComments\n");
    out.push_str("%%Page: 1 1\n");
    out.push_str("gsave\n");
    let _ = writeln!(out, "{w} {h} scale");
    let _ = writeln!(
        out,
        "{w} {h} 8 [{w} 0 0 -{h} 0 {h}] currentfile /ASCIIHexDecode filter false 3 colorimage"
    );
    for line in rgb.as_raw().chunks(BYTES_PER_LINE) {
        for byte in line {
            let _ = write!(out, "{byte:02x}");
        }
        out.push('\n');
    }
    out.push_str(">\n");
    out.push_str("grestore\n");
    out.push_str("showpage\n");
    out.push_str("%%EOF\n");
    out.into_bytes()
}

/// Built-in EPS writer over decoded pixels.
pub struct EpsStrategy {
    options: ImageOptions,
}

impl EpsStrategy {
    pub fn new(options: ImageOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Strategy for EpsStrategy {
    fn name(&self) -> &str {
        "eps-writer"
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let source = source.to_path_buf();
        let staging = staging.to_path_buf();
        let max_dimension = self.options.max_dimension;

        tokio::task::spawn_blocking(move || {
            let img = fit_within(load_image(&source)?, max_dimension);
            write_file(&staging, &write_eps(&img))
        })
        .await
        .map_err(|e| StrategyError::backend(format!("EPS task panicked: {e}")))?
    }

    fn output_check(&self) -> OutputCheck {
        OutputCheck::Eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn pixel_data(eps: &str) -> String {
        let start = eps.find("colorimage\n").unwrap() + "colorimage\n".len();
        let end = eps[start..].find('>').unwrap() + start;
        eps[start..end].replace('\n', "")
    }

    #[test]
    fn header_and_bounding_box() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255])));
        let eps = String::from_utf8(write_eps(&img)).unwrap();
        assert!(eps.starts_with("%!PS-Adobe-3.0 EPSF-3.0"));
        assert!(eps.contains("%%BoundingBox: 0 0 3 2"));
        assert!(eps.trim_end().ends_with("%%EOF"));
        assert_eq!(pixel_data(&eps), "010203".repeat(6));
    }

    #[test]
    fn transparent_pixel_is_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let eps = String::from_utf8(write_eps(&DynamicImage::ImageRgba8(img))).unwrap();
        assert_eq!(pixel_data(&eps), "ffffffff0000");
    }

    #[test]
    fn long_rows_are_wrapped() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 1));
        let eps = String::from_utf8(write_eps(&img)).unwrap();
        let start = eps.find("colorimage\n").unwrap() + "colorimage\n".len();
        let first_line = eps[start..].lines().next().unwrap();
        assert_eq!(first_line.len(), BYTES_PER_LINE * 2);
    }
}
