use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use tracing::{info, warn};

use super::absorb_name_line;
use super::paragraphs::ParagraphBuilder;
use super::patterns::{LineFlow, LinePatterns, LineRole};
use crate::config::{BandPolicy, IndentBand};
use crate::grammar::{self, ArticleKey, ArticleNumber};
use crate::model::{
    DivisionKind, DocumentKind, ExtractionIssue, IssueKind, ParagraphNode, SkeletonDivision,
    SourceKind, StructureSkeleton,
};
use crate::sources::{Token, TokenStream};
use crate::util::normalize_whitespace;

/// One article as segmented from a single source, before merging.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDraft {
    pub id: String,
    pub raw_identifier: String,
    pub number: Option<ArticleNumber>,
    pub title: Option<String>,
    pub intro: String,
    pub is_transitional: bool,
    pub transitional_block: Option<u32>,
    pub amendments: Vec<String>,
    pub division_key: Option<String>,
    pub page_start: u32,
    pub page_end: u32,
    pub paragraphs: Vec<ParagraphNode>,
    pub issues: Vec<ExtractionIssue>,
}

#[derive(Debug, Clone)]
pub struct SourceExtraction {
    pub source: SourceKind,
    pub articles: Vec<ArticleDraft>,
    /// Division names as this source spells them, keyed by skeleton key.
    pub division_names: BTreeMap<String, String>,
    pub unmatched_headings: Vec<String>,
    /// Body lines read while no article was open, as `page N: text`.
    pub stray_lines: Vec<String>,
    pub unbanded_lines: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions<'a> {
    pub document_kind: DocumentKind,
    pub bands: &'a [IndentBand],
    pub policy: BandPolicy,
}

struct OpenArticle<'a> {
    draft: ArticleDraft,
    builder: ParagraphBuilder<'a>,
}

/// Identifier bookkeeping across one source: repeats and the last key seen
/// in the current numbering sequence (each transitional block restarts it).
#[derive(Default)]
struct Numbering {
    seen_ids: HashMap<String, usize>,
    previous: Option<(String, ArticleKey)>,
}

/// Segments one source into articles, attaching each to the approved
/// skeleton's divisions by walking the skeleton in document order.
pub fn extract_articles(
    stream: &TokenStream,
    skeleton: &StructureSkeleton,
    patterns: &LinePatterns,
    options: &ExtractOptions<'_>,
) -> Result<SourceExtraction> {
    let outline = skeleton.flatten();
    let mut cursor = 0usize;
    let mut current_division: Option<String> = None;
    let mut naming: Option<(String, String)> = None;

    let mut transitional = false;
    let mut block = 0u32;
    let mut numbering = Numbering::default();
    let mut flow = LineFlow::default();
    let whole_paragraphs = stream.source == SourceKind::Docx;

    let mut extraction = SourceExtraction {
        source: stream.source,
        articles: Vec::new(),
        division_names: BTreeMap::new(),
        unmatched_headings: Vec::new(),
        stray_lines: Vec::new(),
        unbanded_lines: 0,
    };
    let mut open: Option<OpenArticle<'_>> = None;

    for token in &stream.tokens {
        let role = patterns.classify_in_flow(&token.text, flow, transitional, options.document_kind);
        flow.advance(&role, &token.text);

        if let (Some((_, name)), LineRole::Body) = (naming.as_mut(), &role) {
            match absorb_name_line(name, &token.text) {
                Some(true) => {
                    flow.close();
                    continue;
                }
                Some(false) => {
                    flow.close();
                    finish_naming(&mut naming, &mut extraction.division_names);
                    continue;
                }
                None => finish_naming(&mut naming, &mut extraction.division_names),
            }
        } else if !matches!(role, LineRole::Body) {
            finish_naming(&mut naming, &mut extraction.division_names);
        }

        match role {
            LineRole::TableOfContents => {}
            LineRole::TransitionalHeading => {
                close_article(&mut open, &mut extraction);
                transitional = true;
                block += 1;
                current_division = None;
                numbering.previous = None;
            }
            LineRole::DivisionHeading {
                kind,
                number,
                value,
                name,
            } => {
                close_article(&mut open, &mut extraction);
                match locate_division(&outline, cursor, kind, value) {
                    Some(position) => {
                        let key = outline[position].1.key.clone();
                        cursor = position + 1;
                        if name.is_empty() {
                            naming = Some((key.clone(), String::new()));
                        } else {
                            extraction
                                .division_names
                                .insert(key.clone(), normalize_whitespace(&name));
                        }
                        current_division = Some(key);
                    }
                    None => {
                        warn!(
                            source = %stream.source,
                            page = token.page,
                            heading = %format!("{kind} {number}"),
                            "division heading not present in the approved structure"
                        );
                        extraction
                            .unmatched_headings
                            .push(format!("{kind} {number} (page {})", token.page));
                    }
                }
            }
            LineRole::ArticleHeader {
                raw_id, rest, rule, ..
            } => {
                close_article(&mut open, &mut extraction);
                let division_key = if transitional {
                    None
                } else {
                    current_division.clone()
                };
                let header = HeaderLine {
                    raw_id: &raw_id,
                    rest: &rest,
                    rule,
                    token,
                };
                let mut article = open_article(
                    header,
                    patterns,
                    options,
                    division_key,
                    transitional.then_some(block),
                    &mut numbering,
                );
                if whole_paragraphs {
                    article.builder = article.builder.paragraph_per_token();
                }
                open = Some(article);
            }
            LineRole::AmendmentNote => match open.as_mut() {
                Some(article) => {
                    article.draft.amendments.push(normalize_whitespace(&token.text));
                    article.draft.page_end = token.page;
                }
                None => record_stray_line(&mut extraction, token),
            },
            LineRole::Body => match open.as_mut() {
                Some(article) => {
                    article.builder.push_line(token)?;
                    article.draft.page_end = token.page;
                }
                None => record_stray_line(&mut extraction, token),
            },
        }
    }

    close_article(&mut open, &mut extraction);
    finish_naming(&mut naming, &mut extraction.division_names);

    info!(
        source = %stream.source,
        articles = extraction.articles.len(),
        unmatched_headings = extraction.unmatched_headings.len(),
        stray_lines = extraction.stray_lines.len(),
        unbanded_lines = extraction.unbanded_lines,
        "source segmented"
    );

    Ok(extraction)
}

struct HeaderLine<'t> {
    raw_id: &'t str,
    rest: &'t str,
    rule: bool,
    token: &'t Token,
}

fn open_article<'a>(
    header: HeaderLine<'_>,
    patterns: &'a LinePatterns,
    options: &ExtractOptions<'a>,
    division_key: Option<String>,
    transitional_block: Option<u32>,
    numbering: &mut Numbering,
) -> OpenArticle<'a> {
    let mut issues = Vec::new();
    let raw_identifier = normalize_whitespace(header.raw_id);

    let number = match grammar::parse(&raw_identifier) {
        Ok(number) => Some(number),
        Err(error) => {
            issues.push(ExtractionIssue {
                kind: IssueKind::Grammar,
                message: error.to_string(),
            });
            None
        }
    };

    let display = number
        .as_ref()
        .map(|number| number.display.clone())
        .unwrap_or_else(|| raw_identifier.clone());
    let mut id = match transitional_block {
        Some(block) => format!("T{block}:{display}"),
        None => display,
    };

    let occurrences = numbering.seen_ids.entry(id.clone()).or_insert(0);
    *occurrences += 1;
    if *occurrences > 1 {
        let duplicate = format!("{id}~{occurrences}");
        issues.push(ExtractionIssue {
            kind: IssueKind::DuplicateIdentifier,
            message: format!("identifier {id} repeats on page {}; kept as {duplicate}", header.token.page),
        });
        id = duplicate;
    } else if let Some(number) = number.as_ref() {
        let key = number.key();
        if let Some((previous_id, previous_key)) = numbering.previous.as_ref() {
            if key <= *previous_key {
                warn!(
                    article = %id,
                    previous = %previous_id,
                    page = header.token.page,
                    "article identifier does not follow its predecessor"
                );
                issues.push(ExtractionIssue {
                    kind: IssueKind::OutOfOrder,
                    message: format!(
                        "identifier {id} on page {} does not follow {previous_id}",
                        header.token.page
                    ),
                });
            }
        }
        numbering.previous = Some((id.clone(), key));
    }

    let (title, intro) = if header.rule {
        let rest = normalize_whitespace(header.rest);
        ((!rest.is_empty()).then_some(rest), String::new())
    } else {
        split_title(patterns, header.token.lead_emphasis.as_deref(), header.rest)
    };

    let builder = ParagraphBuilder::new(patterns, options.bands, options.policy, &id, &intro);

    OpenArticle {
        draft: ArticleDraft {
            id,
            raw_identifier,
            number,
            title,
            intro,
            is_transitional: transitional_block.is_some(),
            transitional_block,
            amendments: Vec::new(),
            division_key,
            page_start: header.token.page,
            page_end: header.token.page,
            paragraphs: Vec::new(),
            issues,
        },
        builder,
    }
}

/// A law article's heading is the emphasized text following its identifier
/// (`Artículo 5o.- Objeto.`); it is removed from the intro.
fn split_title(
    patterns: &LinePatterns,
    lead_emphasis: Option<&str>,
    rest: &str,
) -> (Option<String>, String) {
    let rest = rest.trim();
    let emphasized = lead_emphasis
        .and_then(|emphasis| patterns.header_rest(emphasis))
        .map(str::trim)
        .filter(|value| value.chars().any(char::is_alphabetic));

    match emphasized {
        Some(title) => {
            let intro = rest.strip_prefix(title).unwrap_or(rest).trim();
            (Some(normalize_whitespace(title)), normalize_whitespace(intro))
        }
        None => (None, normalize_whitespace(rest)),
    }
}

fn close_article(open: &mut Option<OpenArticle<'_>>, extraction: &mut SourceExtraction) {
    let Some(article) = open.take() else {
        return;
    };
    let body = article.builder.finish();
    let mut draft = article.draft;

    draft.intro = body.intro;
    draft.paragraphs = body.paragraphs;
    draft.issues.extend(body.issues);
    extraction.unbanded_lines += body.unbanded_lines;
    extraction.articles.push(draft);
}

fn record_stray_line(extraction: &mut SourceExtraction, token: &Token) {
    let text = normalize_whitespace(&token.text);
    if text.is_empty() {
        return;
    }
    warn!(
        source = %extraction.source,
        page = token.page,
        text = %text,
        "line outside any article discarded"
    );
    extraction.stray_lines.push(format!("page {}: {text}", token.page));
}

fn finish_naming(naming: &mut Option<(String, String)>, names: &mut BTreeMap<String, String>) {
    if let Some((key, name)) = naming.take() {
        if !name.is_empty() {
            names.insert(key, name);
        }
    }
}

/// Finds the next skeleton node at or after `cursor` with the same kind and
/// number. Duplicate keys carry a `~N` suffix on their last segment.
fn locate_division(
    outline: &[(Option<&str>, &SkeletonDivision)],
    cursor: usize,
    kind: DivisionKind,
    value: u32,
) -> Option<usize> {
    let expected = format!("{}-{}", kind.slug(), value);
    let duplicate_prefix = format!("{expected}~");

    outline
        .iter()
        .enumerate()
        .skip(cursor)
        .find(|(_, (_, node))| {
            let segment = node.key.rsplit('/').next().unwrap_or(node.key.as_str());
            node.kind == kind && (segment == expected || segment.starts_with(&duplicate_prefix))
        })
        .map(|(position, _)| position)
}
