//! Error types for the convkit library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`]: **fatal**, the conversion cannot produce output
//!   (missing or empty input, unsupported format, every strategy exhausted).
//!   Returned as `Err(ConvertError)` from the top-level `convert_*` functions
//!   and mapped to exit code 1 by the binary.
//!
//! * [`StrategyError`]: **soft**, one backend failed (tool absent, non-zero
//!   exit, timeout, bad output) but the next declared strategy may still
//!   succeed. Stored in [`crate::output::AttemptRecord`] and aggregated into
//!   [`ConvertError::AllStrategiesFailed`] when nothing is left to try.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the convkit library.
///
/// Per-strategy failures use [`StrategyError`] and only surface here
/// through [`ConvertError::AllStrategiesFailed`].
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Input file exists but has zero bytes.
    #[error("Input file is empty (0 bytes): '{path}'")]
    InputEmpty { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input extension is not one this converter reads.
    #[error("Unsupported input '{path}': expected one of [{expected}]")]
    UnsupportedInput { path: PathBuf, expected: String },

    /// The output extension does not name a format this converter writes.
    #[error("Unsupported output '{path}': expected one of [{expected}]")]
    UnsupportedOutput { path: PathBuf, expected: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Option validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the destination directory or move the verified
    /// artifact into place.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Strategy exhaustion ───────────────────────────────────────────────
    /// Every declared strategy failed; carries each strategy's diagnostic.
    #[error("All {} conversion strategies failed:\n{failures}", .failures.len())]
    AllStrategiesFailed { failures: StrategyFailures },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Process exit code for this failure. Every failure exits 1.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// A non-fatal failure of a single strategy.
///
/// The three process-level failures (`Timeout`, `ProcessFailed`,
/// `OutputNotProduced`) are kept distinct so the diagnostic says which one
/// happened, even though they all end the run the same way.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum StrategyError {
    /// Required library or binary is absent.
    #[error("missing dependency '{dependency}': {hint}")]
    MissingDependency { dependency: String, hint: String },

    /// The library call returned an error.
    #[error("backend error: {detail}")]
    Backend { detail: String },

    /// The external process exited with a non-zero status.
    #[error("'{program}' exited with {}: {stderr}", .code.map(|c| format!("code {c}")).unwrap_or_else(|| "a signal".into()))]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The external process did not finish in time and was killed.
    #[error("'{program}' timed out after {secs}s and was killed")]
    Timeout { program: String, secs: u64 },

    /// The backend reported success but no output file exists.
    #[error("output not created: '{path}'")]
    OutputNotProduced { path: PathBuf },

    /// The output exists but has zero bytes.
    #[error("output is empty (0 bytes): '{path}'")]
    OutputEmpty { path: PathBuf },

    /// The output failed structural re-validation.
    #[error("output '{path}' has invalid structure: {reason}")]
    OutputInvalid { path: PathBuf, reason: String },

    /// File-system error while staging files for the backend.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StrategyError {
    fn from(e: std::io::Error) -> Self {
        StrategyError::Io(e.to_string())
    }
}

impl StrategyError {
    pub fn backend(detail: impl fmt::Display) -> Self {
        StrategyError::Backend {
            detail: detail.to_string(),
        }
    }
}

/// One strategy's failure, labelled with the strategy name.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub error: StrategyError,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.strategy, self.error)
    }
}

/// The ordered failures of every strategy that was tried.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StrategyFailures(pub Vec<StrategyFailure>);

impl StrategyFailures {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StrategyFailure> {
        self.0.iter()
    }
}

impl fmt::Display for StrategyFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  • {failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let e = ConvertError::InputNotFound {
            path: PathBuf::from("missing.png"),
        };
        let msg = e.to_string();
        assert!(msg.contains("not found"), "got: {msg}");
        assert!(msg.contains("missing.png"));
    }

    #[test]
    fn empty_display() {
        let e = ConvertError::InputEmpty {
            path: PathBuf::from("zero.csv"),
        };
        assert!(e.to_string().contains("empty"));
    }

    #[test]
    fn process_failures_are_distinct() {
        let timeout = StrategyError::Timeout {
            program: "soffice".into(),
            secs: 30,
        };
        let failed = StrategyError::ProcessFailed {
            program: "soffice".into(),
            code: Some(77),
            stderr: "boom".into(),
        };
        let missing = StrategyError::OutputNotProduced {
            path: PathBuf::from("out.pdf"),
        };
        assert!(timeout.to_string().contains("timed out after 30s"));
        assert!(failed.to_string().contains("code 77"));
        assert!(missing.to_string().contains("not created"));
        assert_ne!(timeout.to_string(), failed.to_string());
    }

    #[test]
    fn signal_exit_display() {
        let e = StrategyError::ProcessFailed {
            program: "gs".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(e.to_string().contains("a signal"));
    }

    #[test]
    fn aggregate_lists_every_strategy() {
        let e = ConvertError::AllStrategiesFailed {
            failures: StrategyFailures(vec![
                StrategyFailure {
                    strategy: "pdfium".into(),
                    error: StrategyError::MissingDependency {
                        dependency: "libpdfium".into(),
                        hint: "set PDFIUM_LIB_PATH".into(),
                    },
                },
                StrategyFailure {
                    strategy: "ghostscript".into(),
                    error: StrategyError::Timeout {
                        program: "gs".into(),
                        secs: 5,
                    },
                },
            ]),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 2 conversion strategies failed"), "got: {msg}");
        assert!(msg.contains("[pdfium] missing dependency"));
        assert!(msg.contains("[ghostscript]"));
        assert_eq!(e.exit_code(), 1);
    }
}
