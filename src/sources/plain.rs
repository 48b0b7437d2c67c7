use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};

use super::{Token, has_extension, read_text_file};

pub(super) fn read_pages(path: &Path) -> Result<Vec<Vec<Token>>> {
    let raw = if has_extension(path, "txt") {
        read_text_file(path)?
    } else {
        extract_with_pdftotext(path)?
    };
    Ok(split_pages(&raw))
}

fn extract_with_pdftotext(pdf_path: &Path) -> Result<String> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Pages are separated by form feeds, as pdftotext emits them.
pub(super) fn split_pages(raw: &str) -> Vec<Vec<Token>> {
    let mut pages = raw
        .split('\u{000C}')
        .enumerate()
        .map(|(index, chunk)| {
            chunk
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| Token::plain(index as u32 + 1, line))
                .collect::<Vec<Token>>()
        })
        .collect::<Vec<Vec<Token>>>();

    while pages.last().map(Vec::is_empty).unwrap_or(false) {
        pages.pop();
    }

    pages
}
