use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::grammar::ArticleNumber;
use crate::sources::NormalizationStats;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    PdfLayout,
    Docx,
    PlainText,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::PdfLayout, SourceKind::Docx, SourceKind::PlainText];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::PdfLayout => "pdf_layout",
            SourceKind::Docx => "docx",
            SourceKind::PlainText => "plain_text",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Code,
    Law,
    Regulation,
    Resolution,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Code => "code",
            DocumentKind::Law => "law",
            DocumentKind::Regulation => "regulation",
            DocumentKind::Resolution => "resolution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub code: String,
    pub name: String,
    pub kind: DocumentKind,
    pub edition: String,
    #[serde(default)]
    pub published_on: Option<NaiveDate>,
    #[serde(default)]
    pub amended_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisionKind {
    Book,
    Title,
    Chapter,
    Section,
    Subsection,
}

impl DivisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DivisionKind::Book => "book",
            DivisionKind::Title => "title",
            DivisionKind::Chapter => "chapter",
            DivisionKind::Section => "section",
            DivisionKind::Subsection => "subsection",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            DivisionKind::Book => "libro",
            DivisionKind::Title => "titulo",
            DivisionKind::Chapter => "capitulo",
            DivisionKind::Section => "seccion",
            DivisionKind::Subsection => "subseccion",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            DivisionKind::Book => 1,
            DivisionKind::Title => 2,
            DivisionKind::Chapter => 3,
            DivisionKind::Section => 4,
            DivisionKind::Subsection => 5,
        }
    }

    /// Parent kinds a node may hang from; `None` is the document root.
    pub fn permits_parent(self, parent: Option<DivisionKind>) -> bool {
        match (self, parent) {
            (DivisionKind::Book, None) => true,
            (DivisionKind::Title, None | Some(DivisionKind::Book)) => true,
            (DivisionKind::Chapter, None | Some(DivisionKind::Title)) => true,
            (DivisionKind::Section, Some(DivisionKind::Chapter)) => true,
            (DivisionKind::Subsection, Some(DivisionKind::Section)) => true,
            _ => false,
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let folded = fold_accents(keyword).to_ascii_lowercase();
        match folded.as_str() {
            "libro" => Some(DivisionKind::Book),
            "titulo" => Some(DivisionKind::Title),
            "capitulo" => Some(DivisionKind::Chapter),
            "seccion" => Some(DivisionKind::Section),
            "subseccion" => Some(DivisionKind::Subsection),
            _ => None,
        }
    }
}

impl fmt::Display for DivisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structure skeleton produced by the map stage. The approved copy of this
/// exact document is the expected-structure reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSkeleton {
    pub manifest_version: u32,
    pub document: String,
    pub source: SourceKind,
    pub source_sha256: String,
    pub divisions: Vec<SkeletonDivision>,
    pub root_article_count: usize,
    pub transitional_article_count: usize,
    pub total_article_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonDivision {
    pub key: String,
    pub kind: DivisionKind,
    pub number: String,
    pub name: String,
    pub order: usize,
    pub page: u32,
    pub article_count: usize,
    pub total_article_count: usize,
    #[serde(default)]
    pub children: Vec<SkeletonDivision>,
}

impl StructureSkeleton {
    /// Pre-order (document order) listing paired with each node's parent key.
    pub fn flatten(&self) -> Vec<(Option<&str>, &SkeletonDivision)> {
        fn visit<'a>(
            parent: Option<&'a str>,
            nodes: &'a [SkeletonDivision],
            out: &mut Vec<(Option<&'a str>, &'a SkeletonDivision)>,
        ) {
            for node in nodes {
                out.push((parent, node));
                visit(Some(node.key.as_str()), &node.children, out);
            }
        }

        let mut out = Vec::new();
        visit(None, &self.divisions, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub manifest_version: u32,
    pub document: String,
    pub structure_version: u32,
    pub approved_by: String,
    pub approved_at: String,
    pub skeleton_sha256: String,
    pub expected_structure_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentArtifact {
    pub manifest_version: u32,
    pub document: DocumentMeta,
    pub structure_version: u32,
    pub expected_structure_sha256: String,
    pub sources: Vec<SourceSummary>,
    pub divisions: Vec<DivisionRecord>,
    pub articles: Vec<ArticleRecord>,
    #[serde(default)]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub kind: SourceKind,
    pub file_name: String,
    pub sha256: Option<String>,
    pub available: bool,
    pub reason: Option<String>,
    pub token_count: usize,
    pub article_count: usize,
    #[serde(default)]
    pub normalization: NormalizationStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionRecord {
    pub key: String,
    pub parent_key: Option<String>,
    pub kind: DivisionKind,
    pub number: String,
    pub name: String,
    pub order: usize,
    pub name_source: Option<SourceKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: String,
    pub raw_identifier: String,
    pub number: Option<ArticleNumber>,
    #[serde(default)]
    pub title: Option<String>,
    pub intro: String,
    pub is_transitional: bool,
    #[serde(default)]
    pub transitional_block: Option<u32>,
    #[serde(default)]
    pub amendments: Vec<String>,
    pub division_key: Option<String>,
    pub order: usize,
    pub page_start: u32,
    pub page_end: u32,
    #[serde(default)]
    pub paragraphs: Vec<ParagraphNode>,
    #[serde(default)]
    pub provenance: BTreeMap<String, SourceKind>,
    #[serde(default)]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub content_unverified: bool,
    #[serde(default)]
    pub issues: Vec<ExtractionIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphKind {
    Fraction,
    SubItem,
    Numeral,
    HeadingLetter,
    Text,
}

impl ParagraphKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParagraphKind::Fraction => "fraction",
            ParagraphKind::SubItem => "sub_item",
            ParagraphKind::Numeral => "numeral",
            ParagraphKind::HeadingLetter => "heading_letter",
            ParagraphKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphNode {
    pub id: usize,
    pub parent: Option<usize>,
    pub kind: ParagraphKind,
    pub label: String,
    pub text: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Grammar,
    UnbandedLine,
    EmptyBody,
    DuplicateIdentifier,
    OutOfOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionIssue {
    pub kind: IssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Ok,
    Warning,
    Error,
    Empty,
}

impl FindingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingStatus::Ok => "ok",
            FindingStatus::Warning => "warning",
            FindingStatus::Error => "error",
            FindingStatus::Empty => "empty",
        }
    }

    pub fn blocks(self) -> bool {
        matches!(self, FindingStatus::Error | FindingStatus::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub division_key: String,
    pub kind: DivisionKind,
    pub number: String,
    pub name: String,
    pub expected: usize,
    pub actual: usize,
    pub percent: f64,
    pub status: FindingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub expected_total: usize,
    pub actual_total: usize,
    pub completeness_percent: f64,
    pub expected_root: usize,
    pub actual_root: usize,
    pub expected_transitional: usize,
    pub actual_transitional: usize,
    pub unknown_division_articles: usize,
    pub ok: usize,
    pub warning: usize,
    pub error: usize,
    pub empty: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub manifest_version: u32,
    pub document: String,
    pub structure_version: u32,
    pub passed: bool,
    pub summary: ValidationSummary,
    pub findings: Vec<ValidationFinding>,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub sha256: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumBaseline {
    pub manifest_version: u32,
    pub document: String,
    pub edition: String,
    pub structure_version: u32,
    pub saved_at: String,
    pub signed_off_by: Option<String>,
    pub entries: BTreeMap<String, FingerprintEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionStatus {
    Unchanged,
    Changed,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionEntry {
    pub article_id: String,
    pub status: RegressionStatus,
    pub baseline_sha256: Option<String>,
    pub current_sha256: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionCounts {
    pub unchanged: usize,
    pub changed: usize,
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub manifest_version: u32,
    pub document: String,
    pub edition: String,
    pub baseline_saved_at: String,
    pub generated_at: String,
    pub counts: RegressionCounts,
    pub entries: Vec<RegressionEntry>,
}

impl RegressionReport {
    pub fn drifted_article_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.status != RegressionStatus::Unchanged)
            .map(|entry| entry.article_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleDiff {
    pub article_id: String,
    pub status: RegressionStatus,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
}

pub fn fold_accents(input: &str) -> String {
    input
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'Á' | 'À' | 'Ä' => 'A',
            'É' | 'È' | 'Ë' => 'E',
            'Í' | 'Ì' | 'Ï' => 'I',
            'Ó' | 'Ò' | 'Ö' => 'O',
            'Ú' | 'Ù' | 'Ü' => 'U',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_may_only_hang_from_title_or_root() {
        assert!(DivisionKind::Chapter.permits_parent(None));
        assert!(DivisionKind::Chapter.permits_parent(Some(DivisionKind::Title)));
        assert!(!DivisionKind::Chapter.permits_parent(Some(DivisionKind::Book)));
        assert!(!DivisionKind::Section.permits_parent(None));
        assert!(DivisionKind::Subsection.permits_parent(Some(DivisionKind::Section)));
    }

    #[test]
    fn division_keywords_accept_accented_and_plain_spellings() {
        assert_eq!(DivisionKind::from_keyword("CAPÍTULO"), Some(DivisionKind::Chapter));
        assert_eq!(DivisionKind::from_keyword("Capitulo"), Some(DivisionKind::Chapter));
        assert_eq!(DivisionKind::from_keyword("Sección"), Some(DivisionKind::Section));
        assert_eq!(DivisionKind::from_keyword("Anexo"), None);
    }

    #[test]
    fn source_kind_serializes_as_snake_case() {
        let value = serde_json::to_value(SourceKind::PdfLayout).expect("serialize");
        assert_eq!(value, serde_json::json!("pdf_layout"));
    }
}
