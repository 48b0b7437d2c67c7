use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::model::{
    ContentArtifact, FindingStatus, MANIFEST_VERSION, SkeletonDivision, StructureSkeleton,
    ValidationFinding, ValidationReport, ValidationSummary,
};

/// Share of the expected count below which a shortfall is an error rather
/// than a warning.
const WARNING_FLOOR_PERCENT: usize = 80;

pub fn finding_status(expected: usize, actual: usize) -> FindingStatus {
    if actual == expected {
        FindingStatus::Ok
    } else if actual > expected {
        FindingStatus::Error
    } else if actual == 0 {
        FindingStatus::Empty
    } else if actual * 100 >= expected * WARNING_FLOOR_PERCENT {
        FindingStatus::Warning
    } else {
        FindingStatus::Error
    }
}

pub fn percent(expected: usize, actual: usize) -> f64 {
    let raw = actual as f64 * 100.0 / expected.max(1) as f64;
    (raw * 100.0).round() / 100.0
}

/// Compares extracted article counts against the approved structure, per
/// division (recursive totals) and for root-level and transitional articles.
pub fn validate(
    expected: &StructureSkeleton,
    content: &ContentArtifact,
) -> ValidationReport {
    let mut failures = Vec::<String>::new();

    if !expected.document.eq_ignore_ascii_case(&content.document.code) {
        failures.push(format!(
            "content is for {} but the expected structure is for {}",
            content.document.code, expected.document
        ));
    }

    for division in &expected.divisions {
        check_sum_invariant(division, &mut failures);
    }
    let top_total = expected
        .divisions
        .iter()
        .map(|division| division.total_article_count)
        .sum::<usize>();
    if top_total + expected.root_article_count + expected.transitional_article_count
        != expected.total_article_count
    {
        failures.push(format!(
            "expected structure is inconsistent: divisions {top_total} + root {} + transitional {} != total {}",
            expected.root_article_count,
            expected.transitional_article_count,
            expected.total_article_count
        ));
    }

    let known = expected
        .flatten()
        .into_iter()
        .map(|(_, node)| node.key.as_str())
        .collect::<Vec<&str>>();

    let mut direct = HashMap::<&str, usize>::new();
    let mut actual_root = 0usize;
    let mut actual_transitional = 0usize;
    let mut unknown = BTreeMap::<&str, usize>::new();
    for article in &content.articles {
        if article.is_transitional {
            actual_transitional += 1;
            continue;
        }
        match article.division_key.as_deref() {
            None => actual_root += 1,
            Some(key) if known.contains(&key) => *direct.entry(key).or_insert(0) += 1,
            Some(key) => *unknown.entry(key).or_insert(0) += 1,
        }
    }

    for (key, count) in &unknown {
        failures.push(format!(
            "{count} article(s) attached to division {key}, which is not in the expected structure"
        ));
    }

    let names = content
        .divisions
        .iter()
        .map(|division| (division.key.as_str(), division.name.as_str()))
        .collect::<HashMap<&str, &str>>();

    let mut findings = Vec::new();
    for division in &expected.divisions {
        collect_findings(division, &direct, &names, &mut findings);
    }

    for finding in &findings {
        if finding.status.blocks() {
            warn!(
                division = %finding.division_key,
                expected = finding.expected,
                actual = finding.actual,
                status = finding.status.as_str(),
                "division count check failed"
            );
            failures.push(format!(
                "{} {} \"{}\" ({}): expected {}, found {} ({}%, {})",
                finding.kind,
                finding.number,
                finding.name,
                finding.division_key,
                finding.expected,
                finding.actual,
                finding.percent,
                finding.status.as_str()
            ));
        }
    }

    for (label, expected_count, actual_count) in [
        ("root-level articles", expected.root_article_count, actual_root),
        (
            "transitional articles",
            expected.transitional_article_count,
            actual_transitional,
        ),
    ] {
        if expected_count != actual_count {
            let status = finding_status(expected_count, actual_count);
            warn!(
                check = label,
                expected = expected_count,
                actual = actual_count,
                "article count check failed"
            );
            failures.push(format!(
                "{label}: expected {expected_count}, found {actual_count} ({}%, {})",
                percent(expected_count, actual_count),
                status.as_str()
            ));
        }
    }

    let count_status = |status: FindingStatus| {
        findings
            .iter()
            .filter(|finding| finding.status == status)
            .count()
    };
    let summary = ValidationSummary {
        expected_total: expected.total_article_count,
        actual_total: content.articles.len(),
        completeness_percent: percent(expected.total_article_count, content.articles.len()),
        expected_root: expected.root_article_count,
        actual_root,
        expected_transitional: expected.transitional_article_count,
        actual_transitional,
        unknown_division_articles: unknown.values().sum(),
        ok: count_status(FindingStatus::Ok),
        warning: count_status(FindingStatus::Warning),
        error: count_status(FindingStatus::Error),
        empty: count_status(FindingStatus::Empty),
    };

    let passed = failures.is_empty();
    info!(
        document = %content.document.code,
        passed,
        expected = summary.expected_total,
        actual = summary.actual_total,
        completeness = summary.completeness_percent,
        warnings = summary.warning,
        "structural validation finished"
    );

    ValidationReport {
        manifest_version: MANIFEST_VERSION,
        document: content.document.code.clone(),
        structure_version: content.structure_version,
        passed,
        summary,
        findings,
        failures,
    }
}

pub fn ensure_passed(report: &ValidationReport) -> Result<(), PipelineError> {
    if report.passed {
        return Ok(());
    }
    Err(PipelineError::StructuralMismatch {
        document: report.document.clone(),
        failures: report.failures.clone(),
    })
}

fn check_sum_invariant(node: &SkeletonDivision, failures: &mut Vec<String>) {
    let nested = node
        .children
        .iter()
        .map(|child| child.total_article_count)
        .sum::<usize>();
    if node.total_article_count != node.article_count + nested {
        failures.push(format!(
            "expected structure is inconsistent at {}: total {} != direct {} + nested {}",
            node.key, node.total_article_count, node.article_count, nested
        ));
    }
    for child in &node.children {
        check_sum_invariant(child, failures);
    }
}

/// Pushes findings in pre-order and returns the node's actual recursive total.
fn collect_findings(
    node: &SkeletonDivision,
    direct: &HashMap<&str, usize>,
    names: &HashMap<&str, &str>,
    findings: &mut Vec<ValidationFinding>,
) -> usize {
    let index = findings.len();
    findings.push(ValidationFinding {
        division_key: node.key.clone(),
        kind: node.kind,
        number: node.number.clone(),
        name: names
            .get(node.key.as_str())
            .map(|name| name.to_string())
            .unwrap_or_else(|| node.name.clone()),
        expected: node.total_article_count,
        actual: 0,
        percent: 0.0,
        status: FindingStatus::Ok,
    });

    let mut actual = direct.get(node.key.as_str()).copied().unwrap_or(0);
    for child in &node.children {
        actual += collect_findings(child, direct, names, findings);
    }

    let finding = &mut findings[index];
    finding.actual = actual;
    finding.percent = percent(finding.expected, actual);
    finding.status = finding_status(finding.expected, actual);
    actual
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ArticleRecord, DivisionKind, DocumentKind, DocumentMeta, SourceKind,
    };

    fn division(key: &str, number: &str, direct: usize, children: Vec<SkeletonDivision>) -> SkeletonDivision {
        let nested = children
            .iter()
            .map(|child| child.total_article_count)
            .sum::<usize>();
        SkeletonDivision {
            key: key.to_string(),
            kind: if key.contains('/') {
                DivisionKind::Chapter
            } else {
                DivisionKind::Title
            },
            number: number.to_string(),
            name: format!("Nombre {number}"),
            order: 0,
            page: 1,
            article_count: direct,
            total_article_count: direct + nested,
            children,
        }
    }

    fn skeleton(divisions: Vec<SkeletonDivision>, root: usize) -> StructureSkeleton {
        let total = divisions
            .iter()
            .map(|division| division.total_article_count)
            .sum::<usize>()
            + root;
        StructureSkeleton {
            manifest_version: MANIFEST_VERSION,
            document: "LEY".to_string(),
            source: SourceKind::PdfLayout,
            source_sha256: String::new(),
            divisions,
            root_article_count: root,
            transitional_article_count: 0,
            total_article_count: total,
        }
    }

    fn article(order: usize, division_key: Option<&str>) -> ArticleRecord {
        ArticleRecord {
            id: (order + 1).to_string(),
            raw_identifier: (order + 1).to_string(),
            number: None,
            title: None,
            intro: "Texto.".to_string(),
            is_transitional: false,
            transitional_block: None,
            amendments: Vec::new(),
            division_key: division_key.map(str::to_string),
            order,
            page_start: 1,
            page_end: 1,
            paragraphs: Vec::new(),
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
                code: "LEY".to_string(),
                name: "Ley de prueba".to_string(),
                kind: DocumentKind::Law,
                edition: "2024".to_string(),
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

    fn with_count(count: usize) -> ValidationReport {
        let expected = skeleton(vec![division("capitulo-1", "I", 10, Vec::new())], 0);
        let articles = (0..count).map(|order| article(order, Some("capitulo-1"))).collect();
        validate(&expected, &content(articles))
    }

    #[test]
    fn status_thresholds() {
        let cases = [
            (10, FindingStatus::Ok, true),
            (8, FindingStatus::Warning, true),
            (7, FindingStatus::Error, false),
            (0, FindingStatus::Empty, false),
            (11, FindingStatus::Error, false),
        ];

        for (count, status, passed) in cases {
            let report = with_count(count);
            assert_eq!(report.findings[0].status, status, "count {count}");
            assert_eq!(report.passed, passed, "count {count}");
        }
    }

    #[test]
    fn failure_names_division_and_counts() {
        let report = with_count(7);

        assert_eq!(report.findings[0].percent, 70.0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0],
            "title I \"Nombre I\" (capitulo-1): expected 10, found 7 (70%, error)"
        );
        assert!(matches!(
            ensure_passed(&report),
            Err(PipelineError::StructuralMismatch { .. })
        ));
    }

    #[test]
    fn parent_totals_include_nested_divisions() {
        let expected = skeleton(
            vec![division(
                "titulo-1",
                "I",
                1,
                vec![
                    division("titulo-1/capitulo-1", "I", 2, Vec::new()),
                    division("titulo-1/capitulo-2", "II", 2, Vec::new()),
                ],
            )],
            1,
        );
        let articles = vec![
            article(0, None),
            article(1, Some("titulo-1")),
            article(2, Some("titulo-1/capitulo-1")),
            article(3, Some("titulo-1/capitulo-1")),
            article(4, Some("titulo-1/capitulo-2")),
            article(5, Some("titulo-1/capitulo-2")),
        ];

        let report = validate(&expected, &content(articles));

        assert!(report.passed, "{:?}", report.failures);
        assert_eq!(report.findings[0].expected, 5);
        assert_eq!(report.findings[0].actual, 5);
        assert_eq!(report.summary.ok, 3);
        assert_eq!(report.summary.completeness_percent, 100.0);
    }

    #[test]
    fn unknown_division_and_root_mismatch_fail() {
        let expected = skeleton(vec![division("capitulo-1", "I", 1, Vec::new())], 0);
        let articles = vec![article(0, Some("capitulo-1")), article(1, Some("capitulo-9"))];

        let report = validate(&expected, &content(articles));

        assert!(!report.passed);
        assert_eq!(report.summary.unknown_division_articles, 1);
        assert!(report.failures.iter().any(|failure| failure.contains("capitulo-9")));
    }

    #[test]
    fn inconsistent_expected_structure_is_reported() {
        let mut broken = division("titulo-1", "I", 0, vec![division("titulo-1/capitulo-1", "I", 2, Vec::new())]);
        broken.total_article_count = 3;
        let mut expected = skeleton(vec![broken], 0);
        expected.total_article_count = 3;

        let articles = vec![
            article(0, Some("titulo-1/capitulo-1")),
            article(1, Some("titulo-1/capitulo-1")),
        ];
        let report = validate(&expected, &content(articles));

        assert!(!report.passed);
        assert!(report.failures.iter().any(|failure| failure.contains("inconsistent at titulo-1")));
    }
}
