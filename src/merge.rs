use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::hierarchy::{ArticleDraft, SourceExtraction};
use crate::model::{ArticleRecord, DivisionRecord, ExtractionIssue, SourceKind, StructureSkeleton};
use crate::util::normalize_whitespace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Article,
    Division,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeField {
    Title,
    Intro,
    Paragraphs,
    Amendments,
    Placement,
    Name,
}

impl MergeField {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeField::Title => "title",
            MergeField::Intro => "intro",
            MergeField::Paragraphs => "paragraphs",
            MergeField::Amendments => "amendments",
            MergeField::Placement => "placement",
            MergeField::Name => "name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub entity: EntityKind,
    pub field: MergeField,
    pub sources: Vec<SourceKind>,
}

/// Ordered source preference per (entity, field). A source missing from a
/// field's list never supplies that field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityTable {
    entries: Vec<PriorityEntry>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        let headings = vec![SourceKind::Docx, SourceKind::PdfLayout, SourceKind::PlainText];
        let content = vec![SourceKind::PdfLayout, SourceKind::Docx, SourceKind::PlainText];
        let entry = |entity, field, sources: &Vec<SourceKind>| PriorityEntry {
            entity,
            field,
            sources: sources.clone(),
        };

        Self {
            entries: vec![
                entry(EntityKind::Article, MergeField::Title, &headings),
                entry(EntityKind::Article, MergeField::Intro, &content),
                entry(EntityKind::Article, MergeField::Paragraphs, &content),
                entry(EntityKind::Article, MergeField::Amendments, &content),
                entry(EntityKind::Article, MergeField::Placement, &content),
                entry(EntityKind::Division, MergeField::Name, &headings),
            ],
        }
    }
}

impl PriorityTable {
    pub fn sources_for(&self, entity: EntityKind, field: MergeField) -> &[SourceKind] {
        self.entries
            .iter()
            .find(|entry| entry.entity == entity && entry.field == field)
            .map(|entry| entry.sources.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub divisions: Vec<DivisionRecord>,
    pub articles: Vec<ArticleRecord>,
    pub issues: Vec<String>,
}

/// Reconciles per-source extractions into one article list. Each field is
/// taken from the first source in its priority list that has a non-empty
/// value; article order comes from the top placement source with articles
/// spliced in from the others after their predecessor.
pub fn merge(
    skeleton: &StructureSkeleton,
    extractions: &[SourceExtraction],
    priority: &PriorityTable,
    similarity_threshold: f64,
) -> MergeOutcome {
    let by_source = extractions
        .iter()
        .map(|extraction| (extraction.source, index_articles(extraction)))
        .collect::<HashMap<SourceKind, HashMap<&str, &ArticleDraft>>>();

    let mut issues = Vec::new();
    for extraction in extractions {
        for heading in &extraction.unmatched_headings {
            issues.push(format!(
                "{}: heading not in approved structure: {heading}",
                extraction.source
            ));
        }
        for line in &extraction.stray_lines {
            issues.push(format!("{}: text outside any article: {line}", extraction.source));
        }
    }

    let placement_sources = priority.sources_for(EntityKind::Article, MergeField::Placement);
    let order = article_order(extractions, placement_sources);
    let placed = order.iter().map(String::as_str).collect::<HashSet<&str>>();

    for extraction in extractions {
        if placement_sources.contains(&extraction.source) {
            continue;
        }
        for article in &extraction.articles {
            if !placed.contains(article.id.as_str()) {
                warn!(
                    source = %extraction.source,
                    article = %article.id,
                    "article only present in a source without placement priority; dropped"
                );
                issues.push(format!(
                    "{}: article {} has no placement source",
                    extraction.source, article.id
                ));
            }
        }
    }

    let articles = order
        .iter()
        .enumerate()
        .filter_map(|(position, id)| {
            merge_article(id, position, &by_source, priority, similarity_threshold)
        })
        .collect::<Vec<ArticleRecord>>();

    let divisions = merge_divisions(skeleton, extractions, priority);

    let unverified = articles
        .iter()
        .filter(|article| article.content_unverified)
        .count();
    info!(
        articles = articles.len(),
        divisions = divisions.len(),
        content_unverified = unverified,
        sources = extractions.len(),
        "sources merged"
    );

    MergeOutcome {
        divisions,
        articles,
        issues,
    }
}

fn index_articles(extraction: &SourceExtraction) -> HashMap<&str, &ArticleDraft> {
    extraction
        .articles
        .iter()
        .map(|article| (article.id.as_str(), article))
        .collect()
}

fn article_order(extractions: &[SourceExtraction], placement: &[SourceKind]) -> Vec<String> {
    let ranked = placement
        .iter()
        .filter_map(|source| {
            extractions
                .iter()
                .find(|extraction| extraction.source == *source && !extraction.articles.is_empty())
        })
        .collect::<Vec<&SourceExtraction>>();

    let Some((spine, others)) = ranked.split_first() else {
        return Vec::new();
    };

    let mut order = spine
        .articles
        .iter()
        .map(|article| article.id.clone())
        .collect::<Vec<String>>();

    for extraction in others {
        let mut previous: Option<&str> = None;
        for article in &extraction.articles {
            if !order.iter().any(|id| *id == article.id) {
                let at = previous
                    .and_then(|prev| order.iter().position(|id| id == prev))
                    .map(|index| index + 1)
                    .unwrap_or(0);
                info!(
                    source = %extraction.source,
                    article = %article.id,
                    after = previous.unwrap_or("<start>"),
                    "article spliced from secondary source"
                );
                order.insert(at, article.id.clone());
            }
            previous = Some(article.id.as_str());
        }
    }

    order
}

fn pick<'a, T>(
    drafts: &HashMap<SourceKind, &'a ArticleDraft>,
    sources: &[SourceKind],
    value: impl Fn(&'a ArticleDraft) -> Option<T>,
) -> Option<(T, SourceKind)> {
    sources.iter().find_map(|source| {
        drafts
            .get(source)
            .and_then(|draft| value(*draft))
            .map(|found| (found, *source))
    })
}

fn merge_article(
    id: &str,
    position: usize,
    by_source: &HashMap<SourceKind, HashMap<&str, &ArticleDraft>>,
    priority: &PriorityTable,
    similarity_threshold: f64,
) -> Option<ArticleRecord> {
    let drafts = by_source
        .iter()
        .filter_map(|(source, articles)| articles.get(id).map(|draft| (*source, *draft)))
        .collect::<HashMap<SourceKind, &ArticleDraft>>();

    let sources = |field: MergeField| priority.sources_for(EntityKind::Article, field);

    let (placement, placement_source) = pick(&drafts, sources(MergeField::Placement), Some)?;

    let mut provenance = BTreeMap::new();
    provenance.insert(MergeField::Placement.as_str().to_string(), placement_source);

    let title = pick(&drafts, sources(MergeField::Title), |draft| {
        draft.title.clone().filter(|title| !title.is_empty())
    });
    let intro = pick(&drafts, sources(MergeField::Intro), |draft| {
        (!draft.intro.is_empty()).then(|| draft.intro.clone())
    });
    let paragraphs = pick(&drafts, sources(MergeField::Paragraphs), |draft| {
        (!draft.paragraphs.is_empty()).then(|| draft.paragraphs.clone())
    });
    let amendments = pick(&drafts, sources(MergeField::Amendments), |draft| {
        (!draft.amendments.is_empty()).then(|| draft.amendments.clone())
    });

    for (field, winner) in [
        (MergeField::Title, title.as_ref().map(|(_, source)| *source)),
        (MergeField::Intro, intro.as_ref().map(|(_, source)| *source)),
        (MergeField::Paragraphs, paragraphs.as_ref().map(|(_, source)| *source)),
        (MergeField::Amendments, amendments.as_ref().map(|(_, source)| *source)),
    ] {
        if let Some(source) = winner {
            provenance.insert(field.as_str().to_string(), source);
        }
    }

    let body_source = intro
        .as_ref()
        .map(|(_, source)| *source)
        .or_else(|| paragraphs.as_ref().map(|(_, source)| *source))
        .unwrap_or(placement_source);
    let similarity = body_similarity(&drafts, body_source);
    let content_unverified = similarity
        .map(|value| value < similarity_threshold)
        .unwrap_or(false);
    if content_unverified {
        warn!(
            article = %id,
            similarity = similarity.unwrap_or_default(),
            threshold = similarity_threshold,
            winner = %body_source,
            "sources disagree on article text"
        );
    }

    let mut issues = Vec::<ExtractionIssue>::new();
    for source in provenance.values() {
        if let Some(draft) = drafts.get(source) {
            for issue in &draft.issues {
                if !issues.contains(issue) {
                    issues.push(issue.clone());
                }
            }
        }
    }

    Some(ArticleRecord {
        id: id.to_string(),
        raw_identifier: placement.raw_identifier.clone(),
        number: placement.number.clone(),
        title: title.map(|(value, _)| value),
        intro: intro.map(|(value, _)| value).unwrap_or_default(),
        is_transitional: placement.is_transitional,
        transitional_block: placement.transitional_block,
        amendments: amendments.map(|(value, _)| value).unwrap_or_default(),
        division_key: placement.division_key.clone(),
        order: position,
        page_start: placement.page_start,
        page_end: placement.page_end,
        paragraphs: paragraphs.map(|(value, _)| value).unwrap_or_default(),
        provenance,
        similarity,
        content_unverified,
        issues,
    })
}

fn merge_divisions(
    skeleton: &StructureSkeleton,
    extractions: &[SourceExtraction],
    priority: &PriorityTable,
) -> Vec<DivisionRecord> {
    let name_sources = priority.sources_for(EntityKind::Division, MergeField::Name);

    skeleton
        .flatten()
        .into_iter()
        .map(|(parent, node)| {
            let found = name_sources.iter().find_map(|source| {
                extractions
                    .iter()
                    .find(|extraction| extraction.source == *source)
                    .and_then(|extraction| extraction.division_names.get(&node.key))
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.clone(), *source))
            });
            let (name, name_source) = match found {
                Some((name, source)) => (name, Some(source)),
                None => (node.name.clone(), None),
            };

            DivisionRecord {
                key: node.key.clone(),
                parent_key: parent.map(str::to_string),
                kind: node.kind,
                number: node.number.clone(),
                name,
                order: node.order,
                name_source,
            }
        })
        .collect()
}

/// Body text used for cross-source comparison: intro plus every paragraph.
fn body_text(draft: &ArticleDraft) -> String {
    let mut parts = vec![draft.intro.as_str()];
    parts.extend(draft.paragraphs.iter().map(|node| node.text.as_str()));
    normalize_whitespace(&parts.join(" "))
}

fn body_similarity(drafts: &HashMap<SourceKind, &ArticleDraft>, winner: SourceKind) -> Option<f64> {
    let winning = drafts.get(&winner).map(|draft| body_text(draft))?;

    let mut others = drafts
        .iter()
        .filter(|(source, _)| **source != winner)
        .map(|(_, draft)| body_text(draft))
        .filter(|text| !text.is_empty())
        .collect::<Vec<String>>();
    others.sort();

    others
        .iter()
        .map(|other| dice_similarity(&winning, other))
        .reduce(f64::min)
        .map(|value| (value * 10_000.0).round() / 10_000.0)
}

/// Sørensen–Dice coefficient over word bigrams, case-insensitive.
pub fn dice_similarity(left: &str, right: &str) -> f64 {
    let left = bigrams(left);
    let right = bigrams(right);
    let total = left.values().sum::<usize>() + right.values().sum::<usize>();
    if total == 0 {
        return 1.0;
    }

    let shared = left
        .iter()
        .map(|(pair, count)| right.get(pair).map(|other| (*other).min(*count)).unwrap_or(0))
        .sum::<usize>();
    (2 * shared) as f64 / total as f64
}

fn bigrams(text: &str) -> HashMap<(String, String), usize> {
    let words = text
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|ch: char| !ch.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<String>>();

    let mut counts = HashMap::new();
    if words.len() == 1 {
        *counts.entry((words[0].clone(), String::new())).or_insert(0) += 1;
    }
    for pair in words.windows(2) {
        *counts
            .entry((pair[0].clone(), pair[1].clone()))
            .or_insert(0) += 1;
    }
    counts
}
