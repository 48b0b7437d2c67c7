use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::Token;
use crate::util::normalize_whitespace;

/// Lines this close to a page edge are header/footer candidates.
const EDGE_DEPTH: usize = 2;
const MIN_REPEATED_PAGES: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub page_count: usize,
    pub page_numbers_removed: usize,
    pub header_lines_removed: usize,
    pub footer_lines_removed: usize,
    pub dehyphenation_merges: usize,
    pub soft_breaks_joined: usize,
}

pub(super) fn normalize_pages(
    pages: Vec<Vec<Token>>,
    join_soft_breaks: bool,
) -> (Vec<Token>, NormalizationStats) {
    let mut stats = NormalizationStats {
        page_count: pages.len(),
        ..NormalizationStats::default()
    };

    let mut pages = pages
        .into_iter()
        .map(|page| {
            page.into_iter()
                .filter_map(|mut token| {
                    token.text = normalize_whitespace(&token.text.replace('\u{0000}', ""));
                    if token.text.is_empty() {
                        None
                    } else {
                        Some(token)
                    }
                })
                .collect::<Vec<Token>>()
        })
        .collect::<Vec<Vec<Token>>>();

    for page in &mut pages {
        let before = page.len();
        page.retain(|token| !line_is_page_number(&token.text));
        stats.page_numbers_removed += before - page.len();
    }

    let header_candidates = detect_repeated_edge_lines(&pages, true);
    let footer_candidates = detect_repeated_edge_lines(&pages, false);
    for page in &mut pages {
        stats.header_lines_removed += remove_edge_lines(page, &header_candidates, true);
        stats.footer_lines_removed += remove_edge_lines(page, &footer_candidates, false);
    }

    let mut merged = Vec::<Token>::new();
    for token in pages.into_iter().flatten() {
        if let Some(previous) = merged.last_mut() {
            if should_merge_hyphenated_pair(&previous.text, &token.text) {
                let head = previous.text.trim_end().trim_end_matches('-').to_string();
                previous.text = format!("{}{}", head, token.text.trim_start());
                stats.dehyphenation_merges += 1;
                continue;
            }
            if join_soft_breaks && should_join_soft_break(&previous.text, &token.text) {
                previous.text = format!("{} {}", previous.text, token.text);
                stats.soft_breaks_joined += 1;
                continue;
            }
        }
        merged.push(token);
    }

    (merged, stats)
}

/// Stray page numbers: `12`, `- 12 -`, `Página 3 de 90`, `Pág. 4`.
fn line_is_page_number(line: &str) -> bool {
    let folded = line.trim().to_lowercase();
    let rest = folded
        .strip_prefix("página")
        .or_else(|| folded.strip_prefix("pagina"))
        .or_else(|| folded.strip_prefix("pág."))
        .or_else(|| folded.strip_prefix("pag."))
        .unwrap_or(folded.as_str())
        .trim()
        .trim_matches('-')
        .trim();

    let mut parts = rest.splitn(2, [' ', '/']);
    let Some(first) = parts.next() else {
        return false;
    };
    if first.is_empty() || first.len() > 4 || !first.chars().all(|ch| ch.is_ascii_digit()) {
        return false;
    }

    match parts.next().map(str::trim) {
        None => true,
        Some(tail) => {
            let tail = tail.strip_prefix("de").unwrap_or(tail).trim();
            !tail.is_empty() && tail.len() <= 4 && tail.chars().all(|ch| ch.is_ascii_digit())
        }
    }
}

fn detect_repeated_edge_lines(pages: &[Vec<Token>], header: bool) -> HashSet<String> {
    let threshold = MIN_REPEATED_PAGES.max(pages.len().div_ceil(2));
    let mut counts = HashMap::<String, usize>::new();

    for page in pages {
        let edge = if header {
            page.iter().take(EDGE_DEPTH).collect::<Vec<&Token>>()
        } else {
            page.iter().rev().take(EDGE_DEPTH).collect::<Vec<&Token>>()
        };

        let mut seen = HashSet::<String>::new();
        for token in edge {
            let normalized = normalize_edge_line(&token.text);
            if normalized.is_empty() || normalized.len() > 160 {
                continue;
            }
            if seen.insert(normalized.clone()) {
                *counts.entry(normalized).or_insert(0) += 1;
            }
        }
    }

    counts
        .into_iter()
        .filter_map(|(candidate, count)| if count >= threshold { Some(candidate) } else { None })
        .collect()
}

fn remove_edge_lines(page: &mut Vec<Token>, candidates: &HashSet<String>, header: bool) -> usize {
    if candidates.is_empty() {
        return 0;
    }

    let mut removed = 0usize;
    for _ in 0..EDGE_DEPTH {
        let index = if header {
            if page.is_empty() {
                break;
            }
            0
        } else {
            match page.len().checked_sub(1) {
                Some(index) => index,
                None => break,
            }
        };

        if candidates.contains(&normalize_edge_line(&page[index].text)) {
            page.remove(index);
            removed += 1;
        } else {
            break;
        }
    }
    removed
}

/// Lowercased with digits masked, so running headers that carry a page or
/// date still compare equal across pages.
fn normalize_edge_line(input: &str) -> String {
    normalize_whitespace(input)
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_digit() { '#' } else { ch })
        .collect()
}

fn should_merge_hyphenated_pair(current: &str, next: &str) -> bool {
    let left = current.trim_end();
    if !left.ends_with('-') || left.ends_with("--") || left.ends_with(".-") {
        return false;
    }

    let starts_with_lowercase = next
        .trim_start()
        .chars()
        .next()
        .map(char::is_lowercase)
        .unwrap_or(false);
    if !starts_with_lowercase {
        return false;
    }

    left.trim_end_matches('-')
        .chars()
        .last()
        .map(char::is_alphabetic)
        .unwrap_or(false)
}

fn should_join_soft_break(current: &str, next: &str) -> bool {
    let ends_clause = current
        .trim_end()
        .chars()
        .last()
        .map(|ch| matches!(ch, '.' | ':' | ';' | '-'))
        .unwrap_or(true);
    if ends_clause {
        return false;
    }

    let next = next.trim_start();
    let starts_with_lowercase = next
        .chars()
        .next()
        .map(char::is_lowercase)
        .unwrap_or(false);
    if !starts_with_lowercase {
        return false;
    }

    !starts_with_item_marker(next)
}

/// `a)`, `b)`, `aa)` style sub-item markers.
fn starts_with_item_marker(text: &str) -> bool {
    let letters = text.chars().take_while(|ch| ch.is_lowercase()).count();
    (1..=2).contains(&letters) && text.chars().nth(letters) == Some(')')
}
