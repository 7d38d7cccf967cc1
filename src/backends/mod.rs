//! Conversion backends: one [`Strategy`](crate::attempt::Strategy)
//! implementation per library or external tool.
//!
//! ```text
//! image     image-rs encoders, cwebp
//! eps       EPS writer over decoded pixels
//! pdf       image → PDF (lopdf), PDF structural check
//! raster    PDF page → image (pdfium, Ghostscript)
//! office    LibreOffice headless
//! pandoc    Pandoc
//! markdown  pulldown-cmark
//! tabular   CSV ⇄ JSON
//! ```

pub mod eps;
pub mod image;
pub mod markdown;
pub mod office;
pub mod pandoc;
pub mod pdf;
pub mod raster;
pub mod tabular;

use crate::error::StrategyError;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write `bytes` to `path` and flush.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StrategyError> {
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    out.write_all(bytes)?;
    out.flush()?;
    Ok(())
}
