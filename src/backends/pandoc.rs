//! Pandoc as a fallback for documents and Markdown.

use crate::attempt::{extension_of, OutputCheck, Strategy};
use crate::config::ProcessLimits;
use crate::error::StrategyError;
use crate::process::{require_program, run_tool, ToolCommand};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;

/// Source extensions Pandoc has a reader for.
pub const PANDOC_READABLE: &[&str] = &[
    "md", "markdown", "docx", "odt", "html", "htm", "rst", "txt", "epub", "tex", "org",
];

/// Target extensions Pandoc writes, with the writer name when it cannot be
/// inferred from the extension.
const PANDOC_WRITABLE: &[(&str, Option<&str>)] = &[
    ("pdf", None),
    ("docx", None),
    ("odt", None),
    ("html", Some("html5")),
    ("txt", Some("plain")),
    ("rtf", Some("rtf")),
    ("pptx", None),
    ("epub", None),
];

/// Reader name for extensions Pandoc does not map on its own.
fn reader_for(ext: &str) -> Option<&'static str> {
    match ext {
        "txt" => Some("markdown"),
        "htm" => Some("html"),
        _ => None,
    }
}

/// Whether Pandoc can convert `source_ext` into `target_ext`.
pub fn can_convert(source_ext: &str, target_ext: &str) -> bool {
    PANDOC_READABLE.contains(&source_ext) && PANDOC_WRITABLE.iter().any(|(e, _)| *e == target_ext)
}

/// One Pandoc invocation.
pub struct PandocStrategy {
    target: String,
    standalone: bool,
    extra_args: Vec<OsString>,
    check: OutputCheck,
    limits: ProcessLimits,
}

impl PandocStrategy {
    pub fn new(target: impl Into<String>, check: OutputCheck, limits: ProcessLimits) -> Self {
        Self {
            target: target.into(),
            standalone: false,
            extra_args: Vec::new(),
            check,
            limits,
        }
    }

    /// Emit a complete document (`-s`) rather than a fragment.
    pub fn standalone(mut self, v: bool) -> Self {
        self.standalone = v;
        self
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    fn command(&self, program: std::path::PathBuf, source: &Path, staging: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new("pandoc", program);
        if let Some(reader) = extension_of(source).as_deref().and_then(reader_for) {
            cmd = cmd.arg("-f").arg(reader);
        }
        if let Some(writer) = PANDOC_WRITABLE
            .iter()
            .find(|(e, _)| *e == self.target)
            .and_then(|(_, w)| *w)
        {
            cmd = cmd.arg("-t").arg(writer);
        }
        if self.standalone {
            cmd = cmd.arg("-s");
        }
        cmd.args(&self.extra_args)
            .arg(source)
            .arg("-o")
            .arg(staging)
    }
}

#[async_trait]
impl Strategy for PandocStrategy {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn check_available(&self) -> Result<(), StrategyError> {
        require_program("pandoc", &["pandoc"]).map(|_| ())
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let program = require_program("pandoc", &["pandoc"])?;
        run_tool(&self.command(program, source, staging), self.limits).await?;
        Ok(())
    }

    fn output_check(&self) -> OutputCheck {
        self.check
    }
}
