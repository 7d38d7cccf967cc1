//! Result types produced by a conversion attempt.

use crate::error::{ConvertError, StrategyError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened when one strategy was tried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttemptStatus {
    /// The strategy produced output that passed verification.
    Succeeded,
    /// The strategy failed; the next declared strategy (if any) was tried.
    SoftFailure(StrategyError),
}

/// One entry in the diagnostic trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: String,
    pub status: AttemptStatus,
    pub duration_ms: u64,
}

impl AttemptRecord {
    /// A single human-readable line for console output.
    pub fn describe(&self) -> String {
        match &self.status {
            AttemptStatus::Succeeded => {
                format!("{}: ok ({}ms)", self.strategy, self.duration_ms)
            }
            AttemptStatus::SoftFailure(e) => {
                format!("{}: failed ({}ms): {}", self.strategy, self.duration_ms, e)
            }
        }
    }
}

/// Summary of a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Name of the strategy whose output was kept.
    pub strategy: String,
    /// Input size in bytes.
    pub original_size: u64,
    /// Output size in bytes.
    pub produced_size: u64,
    pub duration_ms: u64,
    /// Every strategy tried, in order, including the winner.
    pub trail: Vec<AttemptRecord>,
}

impl ConversionReport {
    /// Output size relative to input size, as a percentage (100 = same size).
    pub fn size_ratio_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.produced_size as f64 * 100.0 / self.original_size as f64
    }
}

/// Final result of one invocation.
#[derive(Debug)]
pub enum Outcome {
    Success(ConversionReport),
    /// One strategy failed while others may still run. A finished run never
    /// ends here; the same state is kept per strategy in
    /// [`ConversionReport::trail`] and [`AttemptStatus::SoftFailure`].
    SoftFailure(AttemptRecord),
    FatalFailure(ConvertError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// One-line summary for console output.
    pub fn diagnostic(&self) -> String {
        match self {
            Outcome::Success(report) => format!(
                "{} → {} via {}",
                report.source.display(),
                report.destination.display(),
                report.strategy
            ),
            Outcome::SoftFailure(record) => record.describe(),
            Outcome::FatalFailure(e) => format!("Conversion failed: {e}"),
        }
    }

    /// 0 on success, 1 on any failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success(_) => 0,
            Outcome::SoftFailure(_) => 1,
            Outcome::FatalFailure(e) => e.exit_code(),
        }
    }
}

impl From<Result<ConversionReport, ConvertError>> for Outcome {
    fn from(result: Result<ConversionReport, ConvertError>) -> Self {
        match result {
            Ok(report) => Outcome::Success(report),
            Err(e) => Outcome::FatalFailure(e),
        }
    }
}
