//! Source readers. Each reader turns one file into an ordered stream of
//! logical lines with whatever layout hints its format carries; none of them
//! infers hierarchy.

mod docx;
mod layout;
mod normalize;
mod plain;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::model::SourceKind;
use crate::util::{file_name_of, sha256_file};

pub use normalize::NormalizationStats;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FontHint {
    pub bold: bool,
    pub size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub page: u32,
    pub text: String,
    pub left: Option<f64>,
    pub font: FontHint,
    /// Text of the leading emphasized run, when the format exposes runs.
    pub lead_emphasis: Option<String>,
}

impl Token {
    pub fn plain(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
            left: None,
            font: FontHint::default(),
            lead_emphasis: None,
        }
    }

    #[cfg(test)]
    pub fn positioned(page: u32, text: impl Into<String>, left: f64) -> Self {
        Self {
            left: Some(left),
            ..Self::plain(page, text)
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenStream {
    pub source: SourceKind,
    pub file_name: String,
    pub sha256: String,
    pub tokens: Vec<Token>,
    pub stats: NormalizationStats,
}

/// Reads `path` with the reader for `kind`. Every failure to obtain usable
/// text surfaces as `SourceUnavailable` so the caller can continue with the
/// remaining sources.
pub fn read_source(kind: SourceKind, path: &Path) -> Result<TokenStream> {
    let unavailable = |reason: String| PipelineError::SourceUnavailable {
        kind,
        path: path.display().to_string(),
        reason,
    };

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Err(unavailable("file not found".to_string()).into()),
    };
    if !metadata.is_file() {
        return Err(unavailable("not a regular file".to_string()).into());
    }
    if metadata.len() == 0 {
        return Err(unavailable("zero-length file".to_string()).into());
    }

    let pages = match kind {
        SourceKind::PdfLayout => layout::read_pages(path),
        SourceKind::Docx => docx::read_pages(path),
        SourceKind::PlainText => plain::read_pages(path),
    };
    let pages = match pages {
        Ok(pages) => pages,
        Err(error) => {
            let reason = error
                .chain()
                .map(ToString::to_string)
                .collect::<Vec<String>>()
                .join(": ");
            return Err(unavailable(reason).into());
        }
    };

    let sha256 = sha256_file(path)?;
    let join_soft_breaks = !matches!(kind, SourceKind::Docx);
    let (tokens, stats) = normalize::normalize_pages(pages, join_soft_breaks);
    if tokens.is_empty() {
        return Err(unavailable("no text after normalization".to_string()).into());
    }

    info!(
        source = %kind,
        path = %path.display(),
        pages = stats.page_count,
        tokens = tokens.len(),
        headers_removed = stats.header_lines_removed,
        footers_removed = stats.footer_lines_removed,
        page_numbers_removed = stats.page_numbers_removed,
        dehyphenation_merges = stats.dehyphenation_merges,
        soft_breaks_joined = stats.soft_breaks_joined,
        "source read"
    );

    Ok(TokenStream {
        source: kind,
        file_name: file_name_of(path),
        sha256,
        tokens,
        stats,
    })
}

/// `read_source`, with unavailability reported as `Ok(Err(reason))` and only
/// unexpected failures propagated.
pub fn try_read_source(kind: SourceKind, path: &Path) -> Result<Result<TokenStream, String>> {
    match read_source(kind, path) {
        Ok(stream) => Ok(Ok(stream)),
        Err(error) => match error.downcast_ref::<PipelineError>() {
            Some(PipelineError::SourceUnavailable { reason, .. }) => {
                warn!(source = %kind, path = %path.display(), reason = %reason, "source unavailable");
                Ok(Err(reason.clone()))
            }
            _ => Err(error),
        },
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

fn read_text_file(path: &Path) -> Result<String> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

pub(crate) fn decode_xml_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';').filter(|end| *end <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };

        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(ch) => {
                out.push(if ch == '\u{a0}' { ' ' } else { ch });
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
