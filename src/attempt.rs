//! The conversion-attempt contract shared by every converter.
//!
//! ```text
//! Start ─▶ ValidatingInput ─┬─▶ FatalFailure            (not found / empty / bad extension)
//!                           └─▶ Attempting(strategy 0)
//!                                 ├─▶ SoftFailureRetryNextStrategy ─▶ Attempting(strategy 1) ─▶ …
//!                                 └─▶ VerifyingOutput ─┬─▶ Success
//!                                                      └─▶ SoftFailureRetryNextStrategy / FatalFailure
//! ```
//!
//! A strategy never writes the destination directly. It writes a staging
//! file in the destination's directory; only after [`verify_output`]
//! accepts that file is it renamed over the destination. A half-written or
//! zero-byte artifact therefore never appears under the requested name.
//!
//! Strategies run once each, in declared order. There is no retry of the
//! same strategy and no second pass over the list.

use crate::backends;
use crate::error::{ConvertError, StrategyError, StrategyFailure, StrategyFailures};
use crate::output::{AttemptRecord, AttemptStatus, ConversionReport};
use crate::progress::{AttemptPhase, NoopObserver, Observer};
use async_trait::async_trait;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Structural re-validation applied to a produced artifact on top of the
/// exists-and-non-empty check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCheck {
    /// Exists and has non-zero size.
    SizeOnly,
    /// Decodes with the `image` crate.
    Image,
    /// Loads with `lopdf` and has at least one page.
    Pdf,
    /// Parses as JSON.
    Json,
    /// Starts with a PostScript/EPS header.
    Eps,
    /// Looks like an HTML document.
    Html,
}

/// One backend capable of performing a conversion.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short, stable name used in diagnostics.
    fn name(&self) -> &str;

    /// Confirm the backing library or binary is present.
    ///
    /// A failure here is a soft failure: the next strategy runs.
    fn check_available(&self) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Transform `source` into a file at `staging`.
    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError>;

    /// Extra validation for this strategy's output.
    fn output_check(&self) -> OutputCheck {
        OutputCheck::SizeOnly
    }
}

/// Boxed strategy list in declared order.
pub type StrategyList = Vec<Box<dyn Strategy>>;

/// Input extensions a converter accepts. An empty list accepts anything.
#[derive(Debug, Clone, Copy)]
pub struct InputRule {
    pub extensions: &'static [&'static str],
}

impl InputRule {
    pub const ANY: InputRule = InputRule { extensions: &[] };

    pub const fn extensions(extensions: &'static [&'static str]) -> Self {
        Self { extensions }
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        extension_of(path)
            .map(|ext| self.extensions.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

/// Lower-cased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Check the input exists, is readable, is non-empty and has an accepted
/// extension. Returns the input size in bytes.
pub fn validate_input(path: &Path, rule: &InputRule) -> Result<u64, ConvertError> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ConvertError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    if !meta.is_file() {
        return Err(ConvertError::UnsupportedInput {
            path: path.to_path_buf(),
            expected: "a regular file".into(),
        });
    }

    if meta.len() == 0 {
        return Err(ConvertError::InputEmpty {
            path: path.to_path_buf(),
        });
    }

    // Check read permission by attempting to read one byte
    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut first = [0u8; 1];
            if let Err(e) = f.read(&mut first) {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(ConvertError::PermissionDenied {
                        path: path.to_path_buf(),
                    });
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ConvertError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    if !rule.accepts(path) {
        return Err(ConvertError::UnsupportedInput {
            path: path.to_path_buf(),
            expected: rule.extensions.join(", "),
        });
    }

    debug!("Validated input: {} ({} bytes)", path.display(), meta.len());
    Ok(meta.len())
}

/// Confirm `path` exists, is non-empty and passes `check`. Returns its size.
pub fn verify_output(path: &Path, check: OutputCheck) -> Result<u64, StrategyError> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StrategyError::OutputNotProduced {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    if meta.len() == 0 {
        return Err(StrategyError::OutputEmpty {
            path: path.to_path_buf(),
        });
    }

    let invalid = |reason: String| StrategyError::OutputInvalid {
        path: path.to_path_buf(),
        reason,
    };

    match check {
        OutputCheck::SizeOnly => {}
        OutputCheck::Image => {
            backends::image::load_image(path).map_err(|e| invalid(e.to_string()))?;
        }
        OutputCheck::Pdf => {
            let pages = backends::pdf::count_pages(path).map_err(invalid)?;
            if pages == 0 {
                return Err(invalid("document has no pages".into()));
            }
        }
        OutputCheck::Json => {
            let file = std::fs::File::open(path)?;
            serde_json::from_reader::<_, serde_json::Value>(std::io::BufReader::new(file))
                .map_err(|e| invalid(e.to_string()))?;
        }
        OutputCheck::Eps => {
            let head = read_head(path, 32)?;
            if !head.starts_with(b"%!PS-Adobe") {
                return Err(invalid("missing %!PS-Adobe header".into()));
            }
        }
        OutputCheck::Html => {
            let head = String::from_utf8_lossy(&read_head(path, 4096)?).to_ascii_lowercase();
            if !head.contains("<html") && !head.contains("<!doctype html") {
                return Err(invalid("no <html> element".into()));
            }
        }
    }

    Ok(meta.len())
}

fn read_head(path: &Path, n: u64) -> Result<Vec<u8>, StrategyError> {
    let mut buf = Vec::new();
    std::fs::File::open(path)?.take(n).read_to_end(&mut buf)?;
    Ok(buf)
}

/// One invocation: a source, a destination and the rules to get between them.
///
/// # Example
/// ```rust,no_run
/// use convkit::attempt::{ConversionAttempt, InputRule, StrategyList};
/// use convkit::backends::tabular::CsvToJsonStrategy;
/// use convkit::TabularOptions;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), convkit::ConvertError> {
/// let report = ConversionAttempt::new("table.csv", "table.json")
///     .accept(InputRule::extensions(&["csv"]))
///     .run(|_destination| {
///         let strategies: StrategyList =
///             vec![Box::new(CsvToJsonStrategy::new(TabularOptions::default()))];
///         Ok(strategies)
///     })
///     .await?;
/// println!("{} bytes via {}", report.produced_size, report.strategy);
/// # Ok(())
/// # }
/// ```
pub struct ConversionAttempt {
    source: PathBuf,
    destination: PathBuf,
    input: InputRule,
    observer: Observer,
}

impl ConversionAttempt {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            input: InputRule::ANY,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn accept(mut self, rule: InputRule) -> Self {
        self.input = rule;
        self
    }

    pub fn with_observer(mut self, observer: Option<Observer>) -> Self {
        if let Some(observer) = observer {
            self.observer = observer;
        }
        self
    }

    /// Validate the input, then build the strategy list with `plan` and run
    /// it with fallback.
    ///
    /// `plan` runs only after validation succeeds, so a missing input is
    /// reported before any format or backend decision is made.
    pub async fn run<F>(self, plan: F) -> Result<ConversionReport, ConvertError>
    where
        F: FnOnce(&Path) -> Result<StrategyList, ConvertError>,
    {
        let observer = Arc::clone(&self.observer);
        observer.on_phase(&AttemptPhase::Start);

        let result = self.run_inner(plan).await;
        match &result {
            Ok(report) => {
                observer.on_phase(&AttemptPhase::Success);
                observer.on_success(report);
            }
            Err(e) => {
                warn!("Conversion failed: {}", e);
                observer.on_phase(&AttemptPhase::FatalFailure);
            }
        }
        result
    }

    async fn run_inner<F>(self, plan: F) -> Result<ConversionReport, ConvertError>
    where
        F: FnOnce(&Path) -> Result<StrategyList, ConvertError>,
    {
        let total_start = Instant::now();
        info!(
            "Starting conversion: {} → {}",
            self.source.display(),
            self.destination.display()
        );

        self.observer.on_phase(&AttemptPhase::ValidatingInput);
        let original_size = validate_input(&self.source, &self.input)?;
        self.reject_same_path()?;

        let strategies = plan(&self.destination)?;
        if strategies.is_empty() {
            return Err(ConvertError::Internal("no strategies declared".into()));
        }

        let staging = self.prepare_staging()?;
        let total = strategies.len();
        let mut trail = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (index, strategy) in strategies.iter().enumerate() {
            let name = strategy.name().to_string();
            self.observer.on_phase(&AttemptPhase::Attempting {
                strategy: name.clone(),
                index,
            });
            self.observer.on_strategy_start(&name, index, total);

            let start = Instant::now();
            let result = self.try_strategy(strategy.as_ref(), &staging).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(produced_size) => {
                    trail.push(AttemptRecord {
                        strategy: name.clone(),
                        status: AttemptStatus::Succeeded,
                        duration_ms,
                    });
                    staging
                        .persist(&self.destination)
                        .map_err(|e| ConvertError::OutputWriteFailed {
                            path: self.destination.clone(),
                            source: e.error,
                        })?;

                    info!(
                        "Conversion complete via '{}': {} → {} bytes in {}ms",
                        name,
                        original_size,
                        produced_size,
                        total_start.elapsed().as_millis()
                    );

                    return Ok(ConversionReport {
                        source: self.source,
                        destination: self.destination,
                        strategy: name,
                        original_size,
                        produced_size,
                        duration_ms: total_start.elapsed().as_millis() as u64,
                        trail,
                    });
                }
                Err(error) => {
                    warn!("Strategy '{}' failed: {}", name, error);
                    self.observer.on_strategy_failed(&name, &error);
                    trail.push(AttemptRecord {
                        strategy: name.clone(),
                        status: AttemptStatus::SoftFailure(error.clone()),
                        duration_ms,
                    });
                    failures.push(StrategyFailure {
                        strategy: name.clone(),
                        error,
                    });
                    if index + 1 < total {
                        self.observer
                            .on_phase(&AttemptPhase::SoftFailureRetryNextStrategy { strategy: name });
                    }
                }
            }
        }

        Err(ConvertError::AllStrategiesFailed {
            failures: StrategyFailures(failures),
        })
    }

    async fn try_strategy(
        &self,
        strategy: &dyn Strategy,
        staging: &Path,
    ) -> Result<u64, StrategyError> {
        strategy.check_available()?;

        // Start every strategy from a missing file so "no output" is detectable.
        if staging.exists() {
            std::fs::remove_file(staging)?;
        }

        strategy.attempt(&self.source, staging).await?;

        self.observer.on_phase(&AttemptPhase::VerifyingOutput {
            strategy: strategy.name().to_string(),
        });
        let check = strategy.output_check();
        let path = staging.to_path_buf();
        tokio::task::spawn_blocking(move || verify_output(&path, check))
            .await
            .map_err(|e| StrategyError::backend(format!("verification task panicked: {e}")))?
    }

    fn reject_same_path(&self) -> Result<(), ConvertError> {
        if let (Ok(a), Ok(b)) = (
            std::fs::canonicalize(&self.source),
            std::fs::canonicalize(&self.destination),
        ) {
            if a == b {
                return Err(ConvertError::InvalidConfig(format!(
                    "output '{}' would overwrite the input",
                    self.destination.display()
                )));
            }
        }
        Ok(())
    }

    /// Create the destination directory and a staging path inside it that
    /// keeps the destination's extension (external tools infer the format
    /// from it).
    fn prepare_staging(&self) -> Result<TempPath, ConvertError> {
        let write_err = |source: std::io::Error| ConvertError::OutputWriteFailed {
            path: self.destination.clone(),
            source,
        };

        let parent = match self.destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_err)?;

        let suffix = extension_of(&self.destination)
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let staging = tempfile::Builder::new()
            .prefix(".convkit-")
            .suffix(&suffix)
            .tempfile_in(&parent)
            .map_err(write_err)?
            .into_temp_path();

        debug!("Staging output at {}", staging.display());
        Ok(staging)
    }
}

/// Run `strategies` in order against one source/destination pair.
pub async fn run_with_fallback(
    source: &Path,
    destination: &Path,
    rule: InputRule,
    strategies: StrategyList,
    observer: Option<Observer>,
) -> Result<ConversionReport, ConvertError> {
    ConversionAttempt::new(source, destination)
        .accept(rule)
        .with_observer(observer)
        .run(move |_| Ok(strategies))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::AttemptObserver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Test strategy with a scripted behaviour.
    enum Behaviour {
        Write(&'static [u8]),
        WriteNothing,
        WriteEmpty,
        Fail,
        Missing,
    }

    struct Scripted {
        name: &'static str,
        behaviour: Behaviour,
        check: OutputCheck,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(name: &'static str, behaviour: Behaviour) -> Self {
            Self {
                name,
                behaviour,
                check: OutputCheck::SizeOnly,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn check_available(&self) -> Result<(), StrategyError> {
            match self.behaviour {
                Behaviour::Missing => Err(StrategyError::MissingDependency {
                    dependency: self.name.into(),
                    hint: "not installed".into(),
                }),
                _ => Ok(()),
            }
        }

        async fn attempt(&self, _source: &Path, staging: &Path) -> Result<(), StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Write(bytes) => {
                    std::fs::write(staging, bytes)?;
                    Ok(())
                }
                Behaviour::WriteEmpty => {
                    std::fs::write(staging, b"")?;
                    Ok(())
                }
                Behaviour::WriteNothing => Ok(()),
                Behaviour::Fail => Err(StrategyError::backend("scripted failure")),
                Behaviour::Missing => unreachable!("availability check runs first"),
            }
        }

        fn output_check(&self) -> OutputCheck {
            self.check
        }
    }

    #[derive(Default)]
    struct PhaseLog(Mutex<Vec<AttemptPhase>>);

    impl AttemptObserver for PhaseLog {
        fn on_phase(&self, phase: &AttemptPhase) {
            self.0.lock().unwrap().push(phase.clone());
        }
    }

    fn source_file(dir: &Path) -> PathBuf {
        let p = dir.join("in.txt");
        std::fs::write(&p, b"hello").unwrap();
        p
    }

    #[tokio::test]
    async fn first_verified_strategy_wins() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(dir.path());
        let dst = dir.path().join("out/nested/result.txt");

        let second = Scripted::new("second", Behaviour::Write(b"never"));
        let second_calls = Arc::clone(&second.calls);
        let strategies: StrategyList = vec![
            Box::new(Scripted::new("first", Behaviour::Write(b"converted"))),
            Box::new(second),
        ];

        let report = run_with_fallback(&src, &dst, InputRule::ANY, strategies, None)
            .await
            .unwrap();

        assert_eq!(report.strategy, "first");
        assert_eq!(report.original_size, 5);
        assert_eq!(report.produced_size, 9);
        assert_eq!(std::fs::read(&dst).unwrap(), b"converted");
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.trail.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_in_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(dir.path());
        let dst = dir.path().join("out.txt");
        let log = Arc::new(PhaseLog::default());

        let strategies: StrategyList = vec![
            Box::new(Scripted::new("missing", Behaviour::Missing)),
            Box::new(Scripted::new("broken", Behaviour::Fail)),
            Box::new(Scripted::new("silent", Behaviour::WriteNothing)),
            Box::new(Scripted::new("works", Behaviour::Write(b"ok"))),
        ];

        let report = run_with_fallback(
            &src,
            &dst,
            InputRule::ANY,
            strategies,
            Some(log.clone() as Observer),
        )
        .await
        .unwrap();

        assert_eq!(report.strategy, "works");
        let names: Vec<&str> = report.trail.iter().map(|r| r.strategy.as_str()).collect();
        assert_eq!(names, ["missing", "broken", "silent", "works"]);
        assert!(matches!(
            report.trail[2].status,
            AttemptStatus::SoftFailure(StrategyError::OutputNotProduced { .. })
        ));

        let phases = log.0.lock().unwrap().clone();
        assert_eq!(phases.first(), Some(&AttemptPhase::Start));
        assert_eq!(phases[1], AttemptPhase::ValidatingInput);
        assert_eq!(phases.last(), Some(&AttemptPhase::Success));
        let retries = phases
            .iter()
            .filter(|p| matches!(p, AttemptPhase::SoftFailureRetryNextStrategy { .. }))
            .count();
        assert_eq!(retries, 3);
    }

    #[tokio::test]
    async fn all_failing_is_fatal_and_aggregated() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(dir.path());
        let dst = dir.path().join("out.txt");

        let strategies: StrategyList = vec![
            Box::new(Scripted::new("a", Behaviour::Fail)),
            Box::new(Scripted::new("b", Behaviour::WriteEmpty)),
        ];
        let err = run_with_fallback(&src, &dst, InputRule::ANY, strategies, None)
            .await
            .unwrap_err();

        match &err {
            ConvertError::AllStrategiesFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(matches!(failures.0[1].error, StrategyError::OutputEmpty { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!dst.exists(), "no output may be left behind");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".convkit-"))
            .collect();
        assert!(leftovers.is_empty(), "staging file must be cleaned up");
    }

    #[tokio::test]
    async fn missing_input_fails_before_any_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let s = Scripted::new("never", Behaviour::Write(b"x"));
        let calls = Arc::clone(&s.calls);
        let err = run_with_fallback(
            &dir.path().join("absent.txt"),
            &dir.path().join("out.txt"),
            InputRule::ANY,
            vec![Box::new(s)],
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::InputNotFound { .. }));
        assert!(err.to_string().contains("not found"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_input_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("empty.txt");
        std::fs::write(&src, b"").unwrap();
        let s = Scripted::new("never", Behaviour::Write(b"x"));
        let calls = Arc::clone(&s.calls);
        let err = run_with_fallback(
            &src,
            &dir.path().join("out.txt"),
            InputRule::ANY,
            vec![Box::new(s)],
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::InputEmpty { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn plan_runs_only_after_validation() {
        let dir = tempfile::tempdir().unwrap();
        let planned = AtomicUsize::new(0);
        let err = ConversionAttempt::new(dir.path().join("nope.csv"), dir.path().join("x.json"))
            .run(|_| {
                planned.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::InputNotFound { .. }));
        assert_eq!(planned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refuses_to_overwrite_input() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(dir.path());
        let err = run_with_fallback(
            &src,
            &src,
            InputRule::ANY,
            vec![Box::new(Scripted::new("w", Behaviour::Write(b"x")))],
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
        assert_eq!(std::fs::read(&src).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn structural_check_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_file(dir.path());
        let mut bad = Scripted::new("bad-json", Behaviour::Write(b"{not json"));
        bad.check = OutputCheck::Json;
        let err = run_with_fallback(
            &src,
            &dir.path().join("o.json"),
            InputRule::ANY,
            vec![Box::new(bad)],
            None,
        )
        .await
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid structure"), "got: {msg}");
    }

    #[test]
    fn extension_rule() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("data.TSV");
        std::fs::write(&p, b"a").unwrap();
        let err = validate_input(&p, &InputRule::extensions(&["csv"])).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedInput { .. }));
        assert!(validate_input(&p, &InputRule::extensions(&["csv", "tsv"])).is_ok());
    }

    #[test]
    fn directory_is_not_an_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_input(dir.path(), &InputRule::ANY).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedInput { .. }));
    }

    #[test]
    fn verify_distinguishes_missing_empty_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.eps");
        assert!(matches!(
            verify_output(&missing, OutputCheck::SizeOnly),
            Err(StrategyError::OutputNotProduced { .. })
        ));

        let empty = dir.path().join("empty.eps");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            verify_output(&empty, OutputCheck::SizeOnly),
            Err(StrategyError::OutputEmpty { .. })
        ));

        let not_eps = dir.path().join("bad.eps");
        std::fs::write(&not_eps, b"GIF89a").unwrap();
        assert!(matches!(
            verify_output(&not_eps, OutputCheck::Eps),
            Err(StrategyError::OutputInvalid { .. })
        ));

        let html = dir.path().join("page.html");
        std::fs::write(&html, b"<!DOCTYPE html>\n<html><body>x</body></html>").unwrap();
        assert_eq!(verify_output(&html, OutputCheck::Html).unwrap(), 43);
    }
}
