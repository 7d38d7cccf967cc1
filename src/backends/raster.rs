//! PDF page rasterisation: pdfium first, Ghostscript as the fallback.
//!
//! ## Binding pdfium
//!
//! `Pdfium::default()` panics when no library can be found, so the binding
//! is done explicitly: `PDFIUM_LIB_PATH` (a library file or a directory
//! containing one) wins, then the system library search path. Any binding
//! error becomes [`StrategyError::MissingDependency`] and Ghostscript runs.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and rendering is
//! CPU-bound; `spawn_blocking` keeps it off the async worker.

use crate::attempt::{OutputCheck, Strategy};
use crate::backends::image::{encode, load_image, RasterTarget};
use crate::backends::write_file;
use crate::config::{ProcessLimits, RasterOptions};
use crate::error::StrategyError;
use crate::process::{require_program, run_tool, ToolCommand};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Output formats a rendered page can be written as.
pub const PAGE_OUTPUTS: &[&str] = &["png", "jpg", "jpeg", "webp"];

const GHOSTSCRIPT_CANDIDATES: &[&str] = &["gs", "gswin64c", "gswin32c"];

/// Bind to a pdfium shared library without panicking.
pub fn bind_pdfium() -> Result<Pdfium, StrategyError> {
    let missing = |detail: String| StrategyError::MissingDependency {
        dependency: "pdfium".into(),
        hint: detail,
    };

    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(raw) => {
            let path = PathBuf::from(raw);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
                .map_err(|e| missing(format!("cannot load '{}': {e:?}", lib.display())))?
        }
        None => Pdfium::bind_to_system_library().map_err(|e| {
            missing(format!(
                "no system pdfium library ({e:?}); set PDFIUM_LIB_PATH"
            ))
        })?,
    };
    Ok(Pdfium::new(bindings))
}

/// Render page `page` (1-based) of `pdf_path`.
fn render_page_blocking(
    pdf_path: &Path,
    options: &RasterOptions,
) -> Result<DynamicImage, StrategyError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| StrategyError::backend(format!("cannot open PDF: {e:?}")))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);
    if options.page > total {
        return Err(StrategyError::backend(format!(
            "page {} out of range, document has {} page(s)",
            options.page, total
        )));
    }

    let page = pages
        .get((options.page - 1) as u16)
        .map_err(|e| StrategyError::backend(format!("page {}: {e:?}", options.page)))?;

    let mut render_config = PdfRenderConfig::new().scale_page_by_factor(options.dpi as f32 / 72.0);
    let max = options.image.max_dimension;
    if max > 0 {
        let max = max.min(i32::MAX as u32) as i32;
        render_config = render_config
            .set_maximum_width(max)
            .set_maximum_height(max);
    }

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| StrategyError::backend(format!("render page {}: {e:?}", options.page)))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        options.page,
        image.width(),
        image.height()
    );
    Ok(image)
}

fn page_target(staging: &Path) -> Result<RasterTarget, StrategyError> {
    crate::attempt::extension_of(staging)
        .as_deref()
        .and_then(RasterTarget::from_extension)
        .ok_or_else(|| StrategyError::backend("unsupported page image format"))
}

/// Render with pdfium-render.
pub struct PdfiumStrategy {
    options: RasterOptions,
}

impl PdfiumStrategy {
    pub fn new(options: RasterOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Strategy for PdfiumStrategy {
    fn name(&self) -> &str {
        "pdfium"
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let target = page_target(staging)?;
        let source = source.to_path_buf();
        let staging = staging.to_path_buf();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            let img = render_page_blocking(&source, &options)?;
            let bytes = encode(img, target, &options.image)?;
            write_file(&staging, &bytes)
        })
        .await
        .map_err(|e| StrategyError::backend(format!("Render task panicked: {e}")))?
    }

    fn output_check(&self) -> OutputCheck {
        OutputCheck::Image
    }
}

/// Render with Ghostscript's `png16m` device, then re-encode.
pub struct GhostscriptStrategy {
    options: RasterOptions,
    limits: ProcessLimits,
    program: Option<PathBuf>,
}

impl GhostscriptStrategy {
    pub fn new(options: RasterOptions, limits: ProcessLimits) -> Self {
        Self {
            options,
            limits,
            program: None,
        }
    }

    /// Run `program` instead of looking Ghostscript up on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    fn resolve_program(&self) -> Result<PathBuf, StrategyError> {
        match &self.program {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(StrategyError::MissingDependency {
                dependency: "ghostscript".into(),
                hint: format!("'{}' does not exist", path.display()),
            }),
            None => require_program("ghostscript", GHOSTSCRIPT_CANDIDATES),
        }
    }

    fn command(&self, program: PathBuf, source: &Path, raster: &Path) -> ToolCommand {
        let page = self.options.page.to_string();
        ToolCommand::new("ghostscript", program)
            .args(["-dSAFER", "-dBATCH", "-dNOPAUSE", "-dQUIET", "-sDEVICE=png16m"])
            .arg(format!("-r{}", self.options.dpi))
            .arg(format!("-dFirstPage={page}"))
            .arg(format!("-dLastPage={page}"))
            .args(["-dTextAlphaBits=4", "-dGraphicsAlphaBits=4"])
            .arg(format!("-sOutputFile={}", raster.display()))
            .arg(source)
    }

    async fn render_into(
        &self,
        program: PathBuf,
        source: &Path,
        staging: &Path,
        raster: &Path,
    ) -> Result<(), StrategyError> {
        run_tool(&self.command(program, source, raster), self.limits).await?;

        if !raster.exists() {
            return Err(StrategyError::OutputNotProduced {
                path: raster.to_path_buf(),
            });
        }

        let target = page_target(staging)?;
        let raster = raster.to_path_buf();
        let staging = staging.to_path_buf();
        let image_options = self.options.image.clone();
        tokio::task::spawn_blocking(move || {
            let img = load_image(&raster)?;
            let bytes = encode(img, target, &image_options)?;
            write_file(&staging, &bytes)
        })
        .await
        .map_err(|e| StrategyError::backend(format!("encode task panicked: {e}")))?
    }
}

#[async_trait]
impl Strategy for GhostscriptStrategy {
    fn name(&self) -> &str {
        "ghostscript"
    }

    fn check_available(&self) -> Result<(), StrategyError> {
        self.resolve_program().map(|_| ())
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let program = self.resolve_program()?;
        let scratch_parent = staging
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let scratch = tempfile::Builder::new()
            .prefix("convkit-gs-")
            .tempdir_in(&scratch_parent)?;
        let raster = scratch.path().join("page.png");

        let result = self.render_into(program, source, staging, &raster).await;

        // The intermediate raster never outlives the attempt.
        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(
                "Failed to remove intermediate raster in {}: {}",
                scratch_path.display(),
                e
            );
        }
        result
    }

    fn output_check(&self) -> OutputCheck {
        OutputCheck::Image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageOptions;

    #[cfg(unix)]
    mod ghostscript {
        use super::*;
        use crate::attempt::{run_with_fallback, InputRule, StrategyList};
        use crate::error::ConvertError;
        use crate::output::Outcome;
        use image::{Rgb, RgbImage};
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// A stand-in `gs` that sets `$out` from `-sOutputFile=` and runs `body`.
        fn fake_gs(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            let script = format!(
                "#!/bin/sh\n\
                 for a in \"$@\"; do case \"$a\" in -sOutputFile=*) out=\"${{a#-sOutputFile=}}\";; esac; done\n\
                 {body}\n"
            );
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn leftover_scratch(dir: &Path) -> Vec<String> {
            std::fs::read_dir(dir)
                .unwrap()
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.starts_with("convkit-gs-"))
                .collect()
        }

        fn setup() -> (TempDir, TempDir, PathBuf) {
            let tools = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let source = work.path().join("doc.pdf");
            std::fs::write(&source, b"%PDF-1.4\n").unwrap();
            (tools, work, source)
        }

        fn strategy(program: PathBuf, timeout_secs: u64) -> GhostscriptStrategy {
            let options = RasterOptions::new(1, 72, ImageOptions::default()).unwrap();
            GhostscriptStrategy::new(options, ProcessLimits::new(timeout_secs)).with_program(program)
        }

        #[tokio::test]
        async fn rendered_raster_is_encoded_and_scratch_removed() {
            let (tools, work, source) = setup();
            let fixture = tools.path().join("rendered.png");
            RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]))
                .save(&fixture)
                .unwrap();
            let gs = fake_gs(
                tools.path(),
                "gs-ok",
                &format!("cp '{}' \"$out\"", fixture.display()),
            );

            let staging = work.path().join("staging.png");
            strategy(gs, 10).attempt(&source, &staging).await.unwrap();

            let img = image::open(&staging).unwrap();
            assert_eq!((img.width(), img.height()), (4, 3));
            assert!(leftover_scratch(work.path()).is_empty());
        }

        #[tokio::test]
        async fn failed_render_is_process_failed_and_scratch_removed() {
            let (tools, work, source) = setup();
            let gs = fake_gs(
                tools.path(),
                "gs-fail",
                "printf partial > \"$out\"; echo 'Error: /syntaxerror' >&2; exit 1",
            );

            let staging = work.path().join("staging.png");
            let err = strategy(gs, 10)
                .attempt(&source, &staging)
                .await
                .unwrap_err();

            match err {
                StrategyError::ProcessFailed { code, stderr, .. } => {
                    assert_eq!(code, Some(1));
                    assert!(stderr.contains("/syntaxerror"));
                }
                other => panic!("expected ProcessFailed, got {other:?}"),
            }
            assert!(!staging.exists());
            assert!(leftover_scratch(work.path()).is_empty());
        }

        #[tokio::test]
        async fn timeout_and_exit_status_each_land_in_the_trail() {
            let (tools, work, source) = setup();
            let slow = fake_gs(tools.path(), "gs-slow", "sleep 5");
            let broken = fake_gs(tools.path(), "gs-broken", "echo 'bad page' >&2; exit 2");
            let destination = work.path().join("page.png");

            let strategies: StrategyList =
                vec![Box::new(strategy(slow, 1)), Box::new(strategy(broken, 10))];
            let err = run_with_fallback(&source, &destination, InputRule::ANY, strategies, None)
                .await
                .unwrap_err();

            match &err {
                ConvertError::AllStrategiesFailed { failures } => {
                    assert_eq!(failures.len(), 2);
                    let first = &failures.0[0].error;
                    let second = &failures.0[1].error;
                    assert!(matches!(first, StrategyError::Timeout { secs: 1, .. }), "got {first:?}");
                    assert!(first.to_string().contains("timed out"));
                    assert!(
                        matches!(second, StrategyError::ProcessFailed { code: Some(2), .. }),
                        "got {second:?}"
                    );
                    assert!(second.to_string().contains("bad page"));
                }
                other => panic!("expected AllStrategiesFailed, got {other:?}"),
            }
            assert_eq!(Outcome::from(Err(err)).exit_code(), 1);
            assert!(!destination.exists());
            assert!(leftover_scratch(work.path()).is_empty());
        }
    }

    #[test]
    fn ghostscript_arguments() {
        let options = RasterOptions::new(3, 200, ImageOptions::default()).unwrap();
        let gs = GhostscriptStrategy::new(options, ProcessLimits::default());
        let cmd = gs.command(
            PathBuf::from("/usr/bin/gs"),
            Path::new("doc.pdf"),
            Path::new("/tmp/x/page.png"),
        );
        let args: Vec<String> = cmd
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"-sDEVICE=png16m".to_string()));
        assert!(args.contains(&"-r200".to_string()));
        assert!(args.contains(&"-dFirstPage=3".to_string()));
        assert!(args.contains(&"-dLastPage=3".to_string()));
        assert!(args.contains(&"-sOutputFile=/tmp/x/page.png".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("doc.pdf"));
    }

    #[test]
    fn missing_program_override_is_missing_dependency() {
        let options = RasterOptions::new(1, 72, ImageOptions::default()).unwrap();
        let gs = GhostscriptStrategy::new(options, ProcessLimits::default())
            .with_program("/definitely/not/here/gs");
        assert!(matches!(
            gs.check_available(),
            Err(StrategyError::MissingDependency { .. })
        ));
    }

    #[test]
    fn page_target_from_staging_extension() {
        assert_eq!(page_target(Path::new("a.JPG")).unwrap(), RasterTarget::Jpeg);
        assert!(page_target(Path::new("a.eps")).is_err());
    }
}
