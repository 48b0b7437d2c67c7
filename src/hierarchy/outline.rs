use std::collections::HashSet;

use anyhow::{Result, bail};
use tracing::info;

use super::absorb_name_line;
use super::patterns::{LineFlow, LinePatterns, LineRole};
use crate::model::{DivisionKind, DocumentKind, MANIFEST_VERSION, SkeletonDivision, StructureSkeleton};
use crate::sources::TokenStream;

#[derive(Debug, Clone)]
struct DraftDivision {
    key: String,
    kind: DivisionKind,
    number: String,
    name: String,
    page: u32,
    parent: Option<usize>,
    direct: usize,
}

/// Scans headings and article headers only and produces the division tree
/// with direct and total article counts.
pub fn build_skeleton(
    document: &str,
    document_kind: DocumentKind,
    stream: &TokenStream,
    patterns: &LinePatterns,
) -> Result<StructureSkeleton> {
    let mut drafts = Vec::<DraftDivision>::new();
    let mut open = Vec::<usize>::new();
    let mut keys = HashSet::<String>::new();
    let mut violations = Vec::<String>::new();

    let mut transitional = false;
    let mut root_count = 0usize;
    let mut transitional_count = 0usize;
    let mut naming: Option<usize> = None;
    let mut flow = LineFlow::default();

    for token in &stream.tokens {
        let role = patterns.classify_in_flow(&token.text, flow, transitional, document_kind);
        flow.advance(&role, &token.text);

        if let (Some(index), LineRole::Body) = (naming, &role) {
            match absorb_name_line(&mut drafts[index].name, &token.text) {
                Some(more) => {
                    flow.close();
                    if !more {
                        naming = None;
                    }
                    continue;
                }
                None => naming = None,
            }
        }

        match role {
            LineRole::TableOfContents | LineRole::AmendmentNote | LineRole::Body => {}
            LineRole::TransitionalHeading => {
                transitional = true;
                open.clear();
                naming = None;
            }
            LineRole::DivisionHeading {
                kind,
                number,
                value,
                name,
            } => {
                while let Some(&top) = open.last() {
                    if drafts[top].kind.rank() >= kind.rank() {
                        open.pop();
                    } else {
                        break;
                    }
                }

                let parent = open.last().copied();
                let parent_kind = parent.map(|index| drafts[index].kind);
                if !kind.permits_parent(parent_kind) {
                    let parent_label = parent
                        .map(|index| {
                            format!(
                                "{} {} (page {})",
                                drafts[index].kind, drafts[index].number, drafts[index].page
                            )
                        })
                        .unwrap_or_else(|| "the document root".to_string());
                    violations.push(format!(
                        "{kind} {number} on page {} cannot be nested under {parent_label}",
                        token.page
                    ));
                }

                let segment = format!("{}-{}", kind.slug(), value);
                let base_key = match parent {
                    Some(index) => format!("{}/{}", drafts[index].key, segment),
                    None => segment,
                };
                let key = unique_key(&mut keys, base_key);

                drafts.push(DraftDivision {
                    key,
                    kind,
                    number,
                    name: name.clone(),
                    page: token.page,
                    parent,
                    direct: 0,
                });
                let index = drafts.len() - 1;
                open.push(index);
                naming = if name.is_empty() { Some(index) } else { None };
            }
            LineRole::ArticleHeader { .. } => {
                naming = None;
                if transitional {
                    transitional_count += 1;
                } else if let Some(&top) = open.last() {
                    drafts[top].direct += 1;
                } else {
                    root_count += 1;
                }
            }
        }
    }

    if !violations.is_empty() {
        bail!(
            "division nesting violations in {document}:\n{}",
            violations.join("\n")
        );
    }

    let divisions = assemble(&drafts, None);
    let division_total = divisions
        .iter()
        .map(|division| division.total_article_count)
        .sum::<usize>();
    let total_article_count = division_total + root_count + transitional_count;

    if total_article_count == 0 {
        bail!(
            "no article headers found in {} ({})",
            stream.file_name,
            stream.source
        );
    }

    info!(
        document = %document,
        source = %stream.source,
        divisions = drafts.len(),
        articles = total_article_count,
        root_articles = root_count,
        transitional_articles = transitional_count,
        "structure skeleton mapped"
    );

    Ok(StructureSkeleton {
        manifest_version: MANIFEST_VERSION,
        document: document.to_string(),
        source: stream.source,
        source_sha256: stream.sha256.clone(),
        divisions,
        root_article_count: root_count,
        transitional_article_count: transitional_count,
        total_article_count,
    })
}

fn unique_key(keys: &mut HashSet<String>, base: String) -> String {
    if keys.insert(base.clone()) {
        return base;
    }
    let mut counter = 2usize;
    loop {
        let candidate = format!("{base}~{counter}");
        if keys.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Drafts are in document order, which is pre-order, so a draft's index is
/// its `order`.
fn assemble(drafts: &[DraftDivision], parent: Option<usize>) -> Vec<SkeletonDivision> {
    drafts
        .iter()
        .enumerate()
        .filter(|(_, draft)| draft.parent == parent)
        .map(|(index, draft)| {
            let children = assemble(drafts, Some(index));
            let nested = children
                .iter()
                .map(|child| child.total_article_count)
                .sum::<usize>();
            SkeletonDivision {
                key: draft.key.clone(),
                kind: draft.kind,
                number: draft.number.clone(),
                name: draft.name.clone(),
                order: index,
                page: draft.page,
                article_count: draft.direct,
                total_article_count: draft.direct + nested,
                children,
            }
        })
        .collect()
}
