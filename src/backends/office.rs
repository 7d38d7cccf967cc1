//! Office document conversion through headless LibreOffice.
//!
//! `soffice --convert-to` writes `<stem>.<ext>` into an output directory of
//! its choosing; the strategy points that at a scratch directory, then copies
//! the single result into the staging path. Each run gets its own user
//! profile (`-env:UserInstallation`) so a desktop LibreOffice that is already
//! open does not swallow the request.

use crate::attempt::{extension_of, OutputCheck, Strategy};
use crate::config::ProcessLimits;
use crate::error::StrategyError;
use crate::process::{require_program, run_tool, ToolCommand};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Output extensions the document converter writes.
pub const DOCUMENT_OUTPUTS: &[&str] = &[
    "pdf", "docx", "odt", "html", "csv", "xlsx", "ods", "txt", "rtf", "pptx",
];

/// Input extensions LibreOffice is asked to open.
pub const DOCUMENT_INPUTS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "txt", "html", "htm", "xls", "xlsx", "ods", "csv", "ppt",
    "pptx", "odp", "md", "markdown", "rst", "epub", "tex", "org",
];

const SOFFICE_CANDIDATES: &[&str] = &["soffice", "libreoffice"];

/// `--convert-to` argument for an output extension.
fn convert_to_arg(ext: &str) -> String {
    match ext {
        "txt" => "txt:Text".to_string(),
        "html" => "html".to_string(),
        other => other.to_string(),
    }
}

/// Structural check for a document target.
pub fn document_check(ext: &str) -> OutputCheck {
    match ext {
        "pdf" => OutputCheck::Pdf,
        "html" => OutputCheck::Html,
        _ => OutputCheck::SizeOnly,
    }
}

/// `file://` URL for an absolute path, as LibreOffice expects for
/// `UserInstallation`.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    let s = s.replace(' ', "%20");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

/// Locate what LibreOffice wrote: `<stem>.<ext>`, else the only file with
/// that extension.
fn find_converted(outdir: &Path, stem: &str, ext: &str) -> Option<PathBuf> {
    let expected = outdir.join(format!("{stem}.{ext}"));
    if expected.is_file() {
        return Some(expected);
    }
    let mut matches: Vec<PathBuf> = std::fs::read_dir(outdir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && extension_of(p).as_deref() == Some(ext))
        .collect();
    if matches.len() == 1 {
        matches.pop()
    } else {
        None
    }
}

/// Headless LibreOffice conversion.
pub struct LibreOfficeStrategy {
    target: String,
    limits: ProcessLimits,
}

impl LibreOfficeStrategy {
    pub fn new(target: impl Into<String>, limits: ProcessLimits) -> Self {
        Self {
            target: target.into(),
            limits,
        }
    }

    fn command(&self, program: PathBuf, source: &Path, profile: &Path, outdir: &Path) -> ToolCommand {
        ToolCommand::new("soffice", program)
            .args(["--headless", "--norestore", "--nologo", "--nolockcheck"])
            .arg(format!("-env:UserInstallation={}", file_url(profile)))
            .arg("--convert-to")
            .arg(convert_to_arg(&self.target))
            .arg("--outdir")
            .arg(outdir)
            .arg(source)
    }
}

#[async_trait]
impl Strategy for LibreOfficeStrategy {
    fn name(&self) -> &str {
        "libreoffice"
    }

    fn check_available(&self) -> Result<(), StrategyError> {
        require_program("libreoffice", SOFFICE_CANDIDATES).map(|_| ())
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let program = require_program("libreoffice", SOFFICE_CANDIDATES)?;
        let source = std::fs::canonicalize(source)?;
        let scratch = tempfile::Builder::new().prefix("convkit-lo-").tempdir()?;
        let profile = scratch.path().join("profile");
        let outdir = scratch.path().join("out");
        std::fs::create_dir_all(&outdir)?;

        let cmd = self.command(program, &source, &profile, &outdir);
        let result = async {
            run_tool(&cmd, self.limits).await?;

            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let produced = find_converted(&outdir, &stem, &self.target).ok_or_else(|| {
                StrategyError::OutputNotProduced {
                    path: outdir.join(format!("{stem}.{}", self.target)),
                }
            })?;
            debug!("LibreOffice wrote {}", produced.display());
            std::fs::copy(&produced, staging)?;
            Ok::<(), StrategyError>(())
        }
        .await;

        if let Err(e) = scratch.close() {
            warn!("Failed to remove LibreOffice scratch directory: {}", e);
        }
        result
    }

    fn output_check(&self) -> OutputCheck {
        document_check(&self.target)
    }
}
