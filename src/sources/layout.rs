use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;

use super::{FontHint, Token, decode_xml_entities, has_extension, read_text_file};

/// Runs sharing a baseline within this many points form one line.
const BASELINE_TOLERANCE: f64 = 3.0;
/// Horizontal gap (points) above which joined runs get a space.
const WORD_GAP: f64 = 1.5;

pub(super) fn read_pages(path: &Path) -> Result<Vec<Vec<Token>>> {
    let xml = if has_extension(path, "xml") {
        read_text_file(path)?
    } else {
        render_with_pdftohtml(path)?
    };
    parse_layout_xml(&xml)
}

fn render_with_pdftohtml(pdf_path: &Path) -> Result<String> {
    let output = Command::new("pdftohtml")
        .arg("-xml")
        .arg("-i")
        .arg("-q")
        .arg("-zoom")
        .arg("1")
        .arg(pdf_path)
        .arg("-stdout")
        .output()
        .with_context(|| format!("failed to execute pdftohtml for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftohtml returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, Clone)]
struct TextRun {
    top: f64,
    left: f64,
    width: f64,
    text: String,
    bold: bool,
    size: Option<f64>,
}

struct FontSpec {
    size: f64,
    bold: bool,
}

pub(super) fn parse_layout_xml(xml: &str) -> Result<Vec<Vec<Token>>> {
    let page_regex = Regex::new(r#"(?s)<page\b([^>]*)>(.*?)</page>"#)
        .context("failed to compile layout page regex")?;
    let fontspec_regex = Regex::new(r#"<fontspec\b([^>]*?)/?>"#)
        .context("failed to compile layout fontspec regex")?;
    let text_regex = Regex::new(r#"(?s)<text\b([^>]*)>(.*?)</text>"#)
        .context("failed to compile layout text regex")?;
    let attr_regex =
        Regex::new(r#"(\w+)="([^"]*)""#).context("failed to compile layout attribute regex")?;
    let tag_regex = Regex::new(r"<[^>]+>").context("failed to compile layout tag regex")?;

    let attributes = |raw: &str| -> HashMap<String, String> {
        attr_regex
            .captures_iter(raw)
            .filter_map(|captures| {
                Some((
                    captures.get(1)?.as_str().to_string(),
                    captures.get(2)?.as_str().to_string(),
                ))
            })
            .collect()
    };

    let mut fonts = HashMap::<String, FontSpec>::new();
    for captures in fontspec_regex.captures_iter(xml) {
        let attrs = attributes(captures.get(1).map(|value| value.as_str()).unwrap_or(""));
        let Some(id) = attrs.get("id") else {
            continue;
        };
        let size = attrs
            .get("size")
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(0.0);
        let bold = attrs
            .get("family")
            .map(|family| family.to_ascii_lowercase().contains("bold"))
            .unwrap_or(false);
        fonts.insert(id.clone(), FontSpec { size, bold });
    }

    let mut pages = Vec::<Vec<Token>>::new();
    for (index, page_captures) in page_regex.captures_iter(xml).enumerate() {
        let page_attrs = attributes(page_captures.get(1).map(|value| value.as_str()).unwrap_or(""));
        let page_number = page_attrs
            .get("number")
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(index as u32 + 1);
        let body = page_captures.get(2).map(|value| value.as_str()).unwrap_or("");

        let mut runs = Vec::<TextRun>::new();
        for text_captures in text_regex.captures_iter(body) {
            let attrs = attributes(text_captures.get(1).map(|value| value.as_str()).unwrap_or(""));
            let inner = text_captures.get(2).map(|value| value.as_str()).unwrap_or("");

            let number = |key: &str| attrs.get(key).and_then(|value| value.parse::<f64>().ok());
            let (Some(top), Some(left)) = (number("top"), number("left")) else {
                continue;
            };

            let text = decode_xml_entities(&tag_regex.replace_all(inner, ""));
            if text.trim().is_empty() {
                continue;
            }

            let font = attrs.get("font").and_then(|id| fonts.get(id));
            let marked_bold = inner.trim_start().starts_with("<b>");
            runs.push(TextRun {
                top,
                left,
                width: number("width").unwrap_or(0.0),
                text,
                bold: marked_bold || font.map(|spec| spec.bold).unwrap_or(false),
                size: font.map(|spec| spec.size),
            });
        }

        pages.push(merge_runs_into_lines(page_number, runs));
    }

    Ok(pages)
}

fn merge_runs_into_lines(page: u32, mut runs: Vec<TextRun>) -> Vec<Token> {
    runs.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));

    let mut lines = Vec::<Vec<TextRun>>::new();
    for run in runs {
        let same_baseline = lines
            .last()
            .map(|line| (line[0].top - run.top).abs() <= BASELINE_TOLERANCE)
            .unwrap_or(false);
        if !same_baseline {
            lines.push(Vec::new());
        }
        if let Some(line) = lines.last_mut() {
            line.push(run);
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.left.total_cmp(&b.left));

            let mut text = String::new();
            let mut previous_right: Option<f64> = None;
            for run in &line {
                if let Some(right) = previous_right {
                    let gap = run.left - right;
                    let boundary_space = text.ends_with(char::is_whitespace)
                        || run.text.starts_with(char::is_whitespace);
                    if gap > WORD_GAP && !boundary_space {
                        text.push(' ');
                    }
                }
                text.push_str(&run.text);
                previous_right = Some(run.left + run.width);
            }

            let emphasis = line
                .iter()
                .take_while(|run| run.bold)
                .map(|run| run.text.trim())
                .collect::<Vec<&str>>()
                .join(" ");

            Token {
                page,
                text,
                left: Some(line[0].left),
                font: FontHint {
                    bold: line[0].bold,
                    size: line[0].size,
                },
                lead_emphasis: if emphasis.is_empty() {
                    None
                } else {
                    Some(emphasis)
                },
            }
        })
        .collect()
}
