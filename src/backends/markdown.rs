//! Markdown → standalone HTML with `pulldown-cmark`.
//!
//! GitHub-style extensions are on (tables, footnotes, strikethrough, task
//! lists). The document title comes from `--title`, else the first
//! heading, else the file stem. With `embed_images`, local images referenced
//! either as Markdown images or as raw `<img src>` tags are inlined as
//! base64 `data:` URIs so the HTML is self-contained.

use crate::attempt::{OutputCheck, Strategy};
use crate::backends::write_file;
use crate::config::MarkdownOptions;
use crate::error::StrategyError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use pulldown_cmark_escape::escape_html;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Markdown source extensions.
pub const MARKDOWN_INPUTS: &[&str] = &["md", "markdown", "mdown", "mkd", "txt"];

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(<img\b[^>]*?\bsrc\s*=\s*)(["'])([^"']*)(["'])"#).unwrap()
});

const STYLE: &str = "\
body{max-width:52rem;margin:2rem auto;padding:0 1rem;\
font-family:-apple-system,BlinkMacSystemFont,\"Segoe UI\",Helvetica,Arial,sans-serif;\
line-height:1.6;color:#24292f}\
pre{background:#f6f8fa;padding:1rem;overflow:auto}\
code{font-family:ui-monospace,SFMono-Regular,Menlo,monospace}\
table{border-collapse:collapse}th,td{border:1px solid #d0d7de;padding:.3rem .6rem}\
img{max-width:100%}blockquote{color:#57606a;border-left:.25rem solid #d0d7de;margin:0;padding:0 1rem}";

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Plain text of the first heading, if any.
pub fn first_heading(markdown: &str) -> Option<String> {
    let mut in_heading = false;
    let mut text = String::new();
    for event in Parser::new_ext(markdown, parser_options()) {
        match event {
            Event::Start(Tag::Heading { .. }) => in_heading = true,
            Event::End(TagEnd::Heading(_)) if in_heading => {
                let title = text.trim().to_string();
                if !title.is_empty() {
                    return Some(title);
                }
                in_heading = false;
                text.clear();
            }
            Event::Text(t) | Event::Code(t) if in_heading => text.push_str(&t),
            _ => {}
        }
    }
    None
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = crate::attempt::extension_of(path)?;
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    })
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    ["http://", "https://", "data:", "//", "mailto:"]
        .iter()
        .any(|p| lower.starts_with(p))
}

/// `data:` URI for a local image referenced from a document in `base_dir`.
fn data_uri(url: &str, base_dir: &Path) -> Option<String> {
    if url.is_empty() || is_remote(url) {
        return None;
    }
    let local = url.strip_prefix("file://").unwrap_or(url);
    let path: PathBuf = if Path::new(local).is_absolute() {
        PathBuf::from(local)
    } else {
        base_dir.join(local)
    };
    let mime = mime_for(&path)?;
    match std::fs::read(&path) {
        Ok(bytes) => {
            debug!("Embedding {} ({} bytes)", path.display(), bytes.len());
            Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
        }
        Err(e) => {
            warn!("Cannot embed image '{}': {}", path.display(), e);
            None
        }
    }
}

fn embed_img_tags(html: &str, base_dir: &Path) -> String {
    IMG_SRC
        .replace_all(html, |caps: &Captures| match data_uri(&caps[3], base_dir) {
            Some(uri) => format!("{}{}{}{}", &caps[1], &caps[2], uri, &caps[4]),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render `markdown` to an HTML body fragment.
pub fn render_body(markdown: &str, embed_from: Option<&Path>) -> String {
    let parser = Parser::new_ext(markdown, parser_options());
    let mut body = String::with_capacity(markdown.len() * 3 / 2);

    match embed_from {
        None => html::push_html(&mut body, parser),
        Some(base) => {
            let events = parser.map(|event| match event {
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let dest_url = data_uri(&dest_url, base)
                        .map(CowStr::from)
                        .unwrap_or(dest_url);
                    Event::Start(Tag::Image {
                        link_type,
                        dest_url,
                        title,
                        id,
                    })
                }
                Event::Html(raw) => Event::Html(embed_img_tags(&raw, base).into()),
                Event::InlineHtml(raw) => Event::InlineHtml(embed_img_tags(&raw, base).into()),
                other => other,
            });
            html::push_html(&mut body, events);
        }
    }
    body
}

/// Wrap a body fragment in a complete HTML document.
pub fn html_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        escaped(title)
    )
}

fn escaped(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail.
    let _ = escape_html(&mut out, text);
    out
}

/// Pick the document title.
pub fn resolve_title(explicit: Option<&str>, markdown: &str, source: &Path) -> String {
    explicit
        .map(str::to_string)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| first_heading(markdown))
        .or_else(|| {
            source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "Document".to_string())
}

/// In-process renderer.
pub struct CmarkStrategy {
    options: MarkdownOptions,
}

impl CmarkStrategy {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Strategy for CmarkStrategy {
    fn name(&self) -> &str {
        "pulldown-cmark"
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let source = source.to_path_buf();
        let staging = staging.to_path_buf();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&source)?;
            let text = String::from_utf8_lossy(&bytes);
            let markdown = text.strip_prefix('\u{feff}').unwrap_or(&text);

            let title = resolve_title(options.title.as_deref(), markdown, &source);
            let base = source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let body = render_body(markdown, options.embed_images.then_some(base.as_path()));

            write_file(&staging, html_document(&title, &body).as_bytes())
        })
        .await
        .map_err(|e| StrategyError::backend(format!("render task panicked: {e}")))?
    }

    fn output_check(&self) -> OutputCheck {
        OutputCheck::Html
    }
}
