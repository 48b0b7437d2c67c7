use std::collections::BTreeMap;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::model::{
    ArticleDiff, ArticleRecord, ChecksumBaseline, ContentArtifact, FingerprintEntry,
    MANIFEST_VERSION, RegressionCounts, RegressionEntry, RegressionReport, RegressionStatus,
};
use crate::util::{normalize_whitespace, now_utc_string, sha256_text};

/// Canonical text of one article: identifier, heading, intro, one line per
/// paragraph indented by depth, then amendment notes. Whitespace inside each
/// line is normalized so reflowed but identical text hashes the same.
pub fn canonical_content(article: &ArticleRecord) -> String {
    let mut lines = vec![
        format!("id: {}", article.id),
        format!(
            "title: {}",
            normalize_whitespace(article.title.as_deref().unwrap_or(""))
        ),
        format!("intro: {}", normalize_whitespace(&article.intro)),
    ];

    for node in &article.paragraphs {
        let indent = "  ".repeat(node.depth);
        let text = normalize_whitespace(&node.text);
        if node.label.is_empty() {
            lines.push(format!("{indent}{text}"));
        } else {
            lines.push(format!("{indent}[{}] {text}", node.label));
        }
    }

    for amendment in &article.amendments {
        lines.push(format!("note: {}", normalize_whitespace(amendment)));
    }

    lines.join("\n")
}

pub fn fingerprint(content: &ContentArtifact) -> BTreeMap<String, FingerprintEntry> {
    content
        .articles
        .iter()
        .map(|article| {
            let text = canonical_content(article);
            (
                article.id.clone(),
                FingerprintEntry {
                    sha256: sha256_text(&text),
                    content: text,
                },
            )
        })
        .collect()
}

pub fn build_baseline(content: &ContentArtifact, signed_off_by: Option<String>) -> ChecksumBaseline {
    let entries = fingerprint(content);
    info!(
        document = %content.document.code,
        edition = %content.document.edition,
        articles = entries.len(),
        "fingerprint baseline built"
    );

    ChecksumBaseline {
        manifest_version: MANIFEST_VERSION,
        document: content.document.code.clone(),
        edition: content.document.edition.clone(),
        structure_version: content.structure_version,
        saved_at: now_utc_string(),
        signed_off_by,
        entries,
    }
}

/// Entries follow the current document order, then articles that only the
/// baseline still has.
pub fn compare(baseline: &ChecksumBaseline, content: &ContentArtifact) -> RegressionReport {
    let current = fingerprint(content);
    let mut counts = RegressionCounts::default();
    let mut entries = Vec::new();

    for article in &content.articles {
        let Some(now) = current.get(&article.id) else {
            continue;
        };
        let before = baseline.entries.get(&article.id);
        let status = match before {
            None => RegressionStatus::Added,
            Some(entry) if entry.sha256 == now.sha256 => RegressionStatus::Unchanged,
            Some(_) => RegressionStatus::Changed,
        };
        entries.push(RegressionEntry {
            article_id: article.id.clone(),
            status,
            baseline_sha256: before.map(|entry| entry.sha256.clone()),
            current_sha256: Some(now.sha256.clone()),
        });
    }

    for (article_id, entry) in &baseline.entries {
        if !current.contains_key(article_id) {
            entries.push(RegressionEntry {
                article_id: article_id.clone(),
                status: RegressionStatus::Removed,
                baseline_sha256: Some(entry.sha256.clone()),
                current_sha256: None,
            });
        }
    }

    for entry in &entries {
        match entry.status {
            RegressionStatus::Unchanged => counts.unchanged += 1,
            RegressionStatus::Changed => counts.changed += 1,
            RegressionStatus::Added => counts.added += 1,
            RegressionStatus::Removed => counts.removed += 1,
        }
        if entry.status != RegressionStatus::Unchanged {
            warn!(
                document = %baseline.document,
                article = %entry.article_id,
                status = ?entry.status,
                "article drifted from baseline"
            );
        }
    }

    info!(
        document = %baseline.document,
        unchanged = counts.unchanged,
        changed = counts.changed,
        added = counts.added,
        removed = counts.removed,
        "regression comparison finished"
    );

    RegressionReport {
        manifest_version: MANIFEST_VERSION,
        document: baseline.document.clone(),
        edition: baseline.edition.clone(),
        baseline_saved_at: baseline.saved_at.clone(),
        generated_at: now_utc_string(),
        counts,
        entries,
    }
}

pub fn diff(baseline: &ChecksumBaseline, content: &ContentArtifact, article_id: &str) -> Result<ArticleDiff> {
    let old = baseline.entries.get(article_id);
    let new = content
        .articles
        .iter()
        .find(|article| article.id == article_id)
        .map(canonical_content);

    let status = match (old, &new) {
        (None, None) => bail!(
            "article {article_id} is in neither the baseline nor the current content of {}",
            baseline.document
        ),
        (None, Some(_)) => RegressionStatus::Added,
        (Some(_), None) => RegressionStatus::Removed,
        (Some(entry), Some(text)) if entry.content == *text => RegressionStatus::Unchanged,
        (Some(_), Some(_)) => RegressionStatus::Changed,
    };

    Ok(ArticleDiff {
        article_id: article_id.to_string(),
        status,
        old_content: old.map(|entry| entry.content.clone()),
        new_content: new,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentKind, DocumentMeta, ParagraphKind, ParagraphNode};

    fn article(id: &str, intro: &str) -> ArticleRecord {
        ArticleRecord {
            id: id.to_string(),
            raw_identifier: id.to_string(),
            number: None,
            title: None,
            intro: intro.to_string(),
            is_transitional: false,
            transitional_block: None,
            amendments: Vec::new(),
            division_key: None,
            order: 0,
            page_start: 1,
            page_end: 1,
            paragraphs: vec![ParagraphNode {
                id: 0,
                parent: None,
                kind: ParagraphKind::Fraction,
                label: "I".to_string(),
                text: "Primera fracción.".to_string(),
                depth: 1,
            }],
            provenance: BTreeMap::new(),
            similarity: None,
            content_unverified: false,
            issues: Vec::new(),
        }
    }

    fn content(articles: Vec<ArticleRecord>) -> ContentArtifact {
        ContentArtifact {
            manifest_version: MANIFEST_VERSION,
            document: DocumentMeta {
                code: "CFF".to_string(),
                name: "Código Fiscal de la Federación".to_string(),
                kind: DocumentKind::Code,
                edition: "2024-11-12".to_string(),
                published_on: None,
                amended_on: None,
            },
            structure_version: 1,
            expected_structure_sha256: String::new(),
            sources: Vec::new(),
            divisions: Vec::new(),
            articles,
            issues: Vec::new(),
        }
    }

    #[test]
    fn canonical_content_ignores_reflowed_whitespace() {
        let left = article("1o", "Las personas   físicas\ny morales.");
        let right = article("1o", "Las personas físicas y morales.");

        assert_eq!(canonical_content(&left), canonical_content(&right));
        assert!(canonical_content(&left).contains("  [I] Primera fracción."));
    }

    #[test]
    fn single_changed_article_is_the_only_drift() {
        let original = content(vec![
            article("1o", "Uno."),
            article("2o", "Dos."),
            article("3o", "Tres."),
        ]);
        let baseline = build_baseline(&original, Some("revisor".to_string()));

        let edited = content(vec![
            article("1o", "Uno."),
            article("2o", "Dos, con una coma."),
            article("3o", "Tres."),
        ]);
        let report = compare(&baseline, &edited);

        assert_eq!(report.counts.unchanged, 2);
        assert_eq!(report.counts.changed, 1);
        assert_eq!(report.drifted_article_ids(), vec!["2o".to_string()]);
    }

    #[test]
    fn added_and_removed_articles_are_reported() {
        let baseline = build_baseline(&content(vec![article("1o", "Uno."), article("2o", "Dos.")]), None);
        let current = content(vec![article("1o", "Uno."), article("4o", "Cuatro.")]);

        let report = compare(&baseline, &current);

        let statuses = report
            .entries
            .iter()
            .map(|entry| (entry.article_id.as_str(), entry.status))
            .collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![
                ("1o", RegressionStatus::Unchanged),
                ("4o", RegressionStatus::Added),
                ("2o", RegressionStatus::Removed),
            ]
        );
    }

    #[test]
    fn diff_returns_both_versions() {
        let baseline = build_baseline(&content(vec![article("1o", "Uno.")]), None);
        let current = content(vec![article("1o", "Uno reformado.")]);

        let diff = diff(&baseline, &current, "1o").expect("diff should resolve");
        assert_eq!(diff.status, RegressionStatus::Changed);
        assert!(diff.old_content.unwrap_or_default().contains("intro: Uno."));
        assert!(diff.new_content.unwrap_or_default().contains("intro: Uno reformado."));

        assert!(super::diff(&baseline, &current, "99").is_err());
    }
}
