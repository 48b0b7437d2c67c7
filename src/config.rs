use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::merge::PriorityTable;
use crate::model::{DocumentKind, DocumentMeta, SourceKind};
use crate::util::read_json;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const BAND_POLICY_ENV: &str = "MXLEX_BAND_POLICY";
pub const REGRESSION_MODE_ENV: &str = "MXLEX_REGRESSION_MODE";
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub documents: Vec<DocumentEntry>,
    pub layouts: BTreeMap<DocumentKind, LayoutProfile>,
    pub priority: PriorityTable,
    pub similarity_threshold: f64,
    pub band_policy: BandPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            layouts: BTreeMap::new(),
            priority: PriorityTable::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            band_policy: BandPolicy::Lenient,
        }
    }
}

impl PipelineConfig {
    /// Reads `<cache_root>/config.json` when present and applies environment
    /// overrides on top.
    pub fn load(cache_root: &Path) -> Result<Self> {
        let path = cache_root.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            let config: PipelineConfig = read_json(&path)?;
            info!(path = %path.display(), documents = config.documents.len(), "loaded pipeline config");
            config
        } else {
            PipelineConfig::default()
        };

        if let Ok(raw) = std::env::var(BAND_POLICY_ENV) {
            config.band_policy = parse_band_policy(Some(&raw));
        }

        Ok(config)
    }

    pub fn document(&self, code: &str) -> DocumentEntry {
        match self
            .documents
            .iter()
            .find(|entry| entry.code.eq_ignore_ascii_case(code))
        {
            Some(entry) => entry.clone(),
            None => {
                warn!(document = %code, "document not registered in config; using defaults");
                DocumentEntry::unregistered(code)
            }
        }
    }

    pub fn layout_for(&self, kind: DocumentKind) -> LayoutProfile {
        self.layouts.get(&kind).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub code: String,
    pub name: String,
    pub kind: DocumentKind,
    pub edition: String,
    #[serde(default)]
    pub published_on: Option<NaiveDate>,
    #[serde(default)]
    pub amended_on: Option<NaiveDate>,
    /// File names under `<cache_root>/sources/`, keyed by source kind.
    #[serde(default)]
    pub sources: BTreeMap<SourceKind, String>,
}

impl DocumentEntry {
    fn unregistered(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: code.to_string(),
            kind: DocumentKind::Law,
            edition: "unversioned".to_string(),
            published_on: None,
            amended_on: None,
            sources: BTreeMap::new(),
        }
    }

    pub fn meta(&self) -> DocumentMeta {
        DocumentMeta {
            code: self.code.clone(),
            name: self.name.clone(),
            kind: self.kind,
            edition: self.edition.clone(),
            published_on: self.published_on,
            amended_on: self.amended_on,
        }
    }

    pub fn source_file(&self, kind: SourceKind) -> String {
        if let Some(name) = self.sources.get(&kind) {
            return name.clone();
        }
        match kind {
            SourceKind::PdfLayout | SourceKind::PlainText => format!("{}.pdf", self.code),
            SourceKind::Docx => format!("{}.docx", self.code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndentBand {
    pub name: String,
    pub min_left: f64,
    pub max_left: f64,
}

impl IndentBand {
    fn new(name: &str, min_left: f64, max_left: f64) -> Self {
        Self {
            name: name.to_string(),
            min_left,
            max_left,
        }
    }

    pub fn contains(&self, left: f64) -> bool {
        left >= self.min_left && left < self.max_left
    }
}

/// Named indentation bands per positional source kind. PDF coordinates are
/// page points (pdftohtml at zoom 1); DOCX values are paragraph indentation in
/// points from the text margin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutProfile {
    pub bands: BTreeMap<SourceKind, Vec<IndentBand>>,
}

impl Default for LayoutProfile {
    fn default() -> Self {
        let mut bands = BTreeMap::new();
        bands.insert(
            SourceKind::PdfLayout,
            vec![
                IndentBand::new("margin", 0.0, 100.0),
                IndentBand::new("indent", 100.0, 135.0),
                IndentBand::new("hanging", 135.0, 170.0),
                IndentBand::new("nested", 170.0, 215.0),
                IndentBand::new("deep", 215.0, 300.0),
            ],
        );
        bands.insert(
            SourceKind::Docx,
            vec![
                IndentBand::new("margin", 0.0, 18.0),
                IndentBand::new("indent", 18.0, 45.0),
                IndentBand::new("hanging", 45.0, 80.0),
                IndentBand::new("nested", 80.0, 120.0),
                IndentBand::new("deep", 120.0, 200.0),
            ],
        );
        Self { bands }
    }
}

impl LayoutProfile {
    pub fn bands_for(&self, source: SourceKind) -> &[IndentBand] {
        self.bands.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandPolicy {
    Lenient,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegressionMode {
    Warn,
    Block,
}

pub fn parse_band_policy(raw: Option<&str>) -> BandPolicy {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if value == "strict" => BandPolicy::Strict,
        _ => BandPolicy::Lenient,
    }
}

pub fn parse_regression_mode(raw: Option<&str>) -> RegressionMode {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        Some(value) if value == "block" || value == "blocking" || value == "strict" => {
            RegressionMode::Block
        }
        _ => RegressionMode::Warn,
    }
}

pub fn resolve_regression_mode(strict_flag: bool) -> RegressionMode {
    if strict_flag {
        return RegressionMode::Block;
    }
    parse_regression_mode(std::env::var(REGRESSION_MODE_ENV).ok().as_deref())
}
