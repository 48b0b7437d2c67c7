use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;

use super::{FontHint, Token, decode_xml_entities, has_extension, read_text_file};

const TWIPS_PER_POINT: f64 = 20.0;

pub(super) fn read_pages(path: &Path) -> Result<Vec<Vec<Token>>> {
    let xml = if has_extension(path, "xml") {
        read_text_file(path)?
    } else {
        extract_document_xml(path)?
    };
    parse_document_xml(&xml)
}

fn extract_document_xml(docx_path: &Path) -> Result<String> {
    let output = Command::new("unzip")
        .arg("-p")
        .arg(docx_path)
        .arg("word/document.xml")
        .output()
        .with_context(|| format!("failed to execute unzip for {}", docx_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "unzip returned non-zero exit status for {}: {}",
            docx_path.display(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

struct DocxPatterns {
    paragraph: Regex,
    indent: Regex,
    page_break_before: Regex,
    run: Regex,
    bold: Regex,
    piece: Regex,
}

impl DocxPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            paragraph: Regex::new(r"(?s)<w:p\b[^>]*?(?:/>|>(.*?)</w:p>)")
                .context("failed to compile docx paragraph regex")?,
            indent: Regex::new(r#"<w:ind\b[^>]*?\bw:(?:left|start)="(-?\d+)""#)
                .context("failed to compile docx indent regex")?,
            page_break_before: Regex::new(r#"<w:pageBreakBefore(?:\s+w:val="(?:1|true|on)")?\s*/>"#)
                .context("failed to compile docx page break regex")?,
            run: Regex::new(r"(?s)<w:r\b[^>]*?>(.*?)</w:r>")
                .context("failed to compile docx run regex")?,
            bold: Regex::new(r#"<w:b(?:\s+w:val="(?P<val>[^"]*)")?\s*/>"#)
                .context("failed to compile docx bold regex")?,
            piece: Regex::new(
                r#"(?s)<w:t(?:\s[^>]*)?>(?P<text>.*?)</w:t>|<w:tab\s*/>|<w:br(?:\s+w:type="(?P<br>\w+)")?[^>]*/>|<w:lastRenderedPageBreak\s*/>"#,
            )
            .context("failed to compile docx text regex")?,
        })
    }
}

/// One token per `<w:p>`. Page numbers follow explicit and last-rendered page
/// breaks, so they approximate what Word displayed when the file was saved.
pub(super) fn parse_document_xml(xml: &str) -> Result<Vec<Vec<Token>>> {
    let patterns = DocxPatterns::new()?;
    let body = xml
        .find("<w:body")
        .map(|start| &xml[start..])
        .unwrap_or(xml);

    let mut pages = vec![Vec::<Token>::new()];
    let mut page = 1u32;

    for paragraph in patterns.paragraph.captures_iter(body) {
        let inner = paragraph.get(1).map(|value| value.as_str()).unwrap_or("");

        let rendered_break = inner.contains("<w:lastRenderedPageBreak");
        let last_page_has_text = pages.last().map(|tokens| !tokens.is_empty()).unwrap_or(false);
        if patterns.page_break_before.is_match(inner) && !rendered_break && last_page_has_text {
            page += 1;
            pages.push(Vec::new());
        }

        let left = patterns
            .indent
            .captures(inner)
            .and_then(|captures| captures.get(1))
            .and_then(|value| value.as_str().parse::<i64>().ok())
            .map(|twips| twips as f64 / TWIPS_PER_POINT)
            .unwrap_or(0.0);

        let mut token_page: Option<u32> = None;
        let mut text = String::new();
        let mut emphasis = String::new();
        let mut emphasis_open = true;
        let mut first_bold: Option<bool> = None;

        for run in patterns.run.captures_iter(inner) {
            let run_body = run.get(1).map(|value| value.as_str()).unwrap_or("");
            let bold = patterns
                .bold
                .captures(run_body)
                .map(|captures| {
                    !matches!(
                        captures.name("val").map(|value| value.as_str()),
                        Some("0" | "false" | "off")
                    )
                })
                .unwrap_or(false);

            let mut run_text = String::new();
            for piece in patterns.piece.captures_iter(run_body) {
                if let Some(value) = piece.name("text") {
                    run_text.push_str(&decode_xml_entities(value.as_str()));
                    continue;
                }
                let whole = piece.get(0).map(|value| value.as_str()).unwrap_or("");
                if whole.starts_with("<w:tab") {
                    run_text.push(' ');
                } else if whole.starts_with("<w:lastRenderedPageBreak") {
                    page += 1;
                } else if piece.name("br").map(|value| value.as_str()) == Some("page") {
                    page += 1;
                } else {
                    run_text.push(' ');
                }
            }

            if run_text.trim().is_empty() {
                text.push_str(&run_text);
                continue;
            }
            if first_bold.is_none() {
                first_bold = Some(bold);
                token_page = Some(page);
            }
            if emphasis_open {
                if bold {
                    emphasis.push_str(&run_text);
                } else {
                    emphasis_open = false;
                }
            }
            text.push_str(&run_text);
        }

        while pages.len() < page as usize {
            pages.push(Vec::new());
        }

        if text.trim().is_empty() {
            continue;
        }

        let token_page = token_page.unwrap_or(page);
        let emphasis = emphasis.trim().to_string();
        let token = Token {
            page: token_page,
            text,
            left: Some(left),
            font: FontHint {
                bold: first_bold.unwrap_or(false),
                size: None,
            },
            lead_emphasis: if emphasis.is_empty() {
                None
            } else {
                Some(emphasis)
            },
        };

        let slot = (token_page as usize).saturating_sub(1);
        if let Some(target) = pages.get_mut(slot) {
            target.push(token);
        }
    }

    while pages.last().map(Vec::is_empty).unwrap_or(false) && pages.len() > 1 {
        pages.pop();
    }

    Ok(pages)
}
