//! # convkit
//!
//! Convert images, PDF pages, office documents, tables and Markdown between
//! formats by driving well-known libraries and command-line tools.
//!
//! ## Why this crate?
//!
//! Format converters tend to fail in the same few ways: the tool is not
//! installed, it hangs, it exits 0 without writing anything, or it writes a
//! truncated file that only breaks the *next* program to read it. Every
//! converter here runs through one contract that handles all of those:
//!
//! ```text
//! input
//!  │
//!  ├─ 1. Validate  exists, non-empty, accepted extension
//!  ├─ 2. Plan      ordered strategies for the destination extension
//!  ├─ 3. Attempt   strategy writes a staging file (processes time-bounded)
//!  ├─ 4. Verify    non-empty + structural re-read (decode / load / parse)
//!  ├─ 5. Fallback  on any failure, the next strategy runs
//!  └─ 6. Persist   staging file renamed over the destination
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use convkit::{csv_to_json, ConvertContext, Orient, TabularOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = TabularOptions {
//!         orient: Orient::Records,
//!         indent: Some(2),
//!         ..TabularOptions::default()
//!     };
//!     let report = csv_to_json("sales.csv", "sales.json", &options, &ConvertContext::default()).await?;
//!     eprintln!("{} via {}", report.destination.display(), report.strategy);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `convkit` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! convkit = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Converter      | Library backend   | Tool fallback                 |
//! |----------------|-------------------|-------------------------------|
//! | image          | `image`, `lopdf`  | `cwebp` (lossy WebP)          |
//! | pdf-to-image   | pdfium            | Ghostscript (`gs`)            |
//! | document       | none              | LibreOffice, then Pandoc      |
//! | csv / json     | `csv`, `serde_json` | none                        |
//! | markdown       | `pulldown-cmark`  | Pandoc                        |
//!
//! A missing tool is a soft failure: the next strategy runs, and the final
//! error lists what each strategy reported.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod attempt;
pub mod backends;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod process;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use attempt::{run_with_fallback, ConversionAttempt, InputRule, OutputCheck, Strategy};
pub use config::{
    DateFormat, ImageOptions, ImageOptionsBuilder, MarkdownOptions, Orient, PngCompression,
    ProcessLimits, RasterOptions, TabularOptions,
};
pub use convert::{
    convert, convert_document, convert_image, convert_sync, csv_to_json, json_to_csv,
    markdown_to_html, pdf_to_image, ConversionRequest, ConvertContext,
};
pub use error::{ConvertError, StrategyError, StrategyFailure};
pub use output::{AttemptRecord, AttemptStatus, ConversionReport, Outcome};
pub use progress::{AttemptObserver, AttemptPhase, NoopObserver, Observer};
