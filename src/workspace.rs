use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

pub const DEFAULT_CACHE_ROOT: &str = ".cache/mxlex";
pub const DEFAULT_DB_FILE: &str = "mxlex_staging.sqlite";

pub const SKELETON_FILE: &str = "skeleton.json";
pub const APPROVAL_FILE: &str = "approval.json";
pub const CONTENT_FILE: &str = "content.json";
pub const VALIDATION_REPORT_FILE: &str = "validation_report.json";
pub const REGRESSION_REPORT_FILE: &str = "regression_report.json";
pub const IMPORT_RECEIPT_FILE: &str = "import_receipt.json";
pub const STATE_FILE: &str = "state.json";

/// Artifact layout under the cache root:
/// `sources/` for input files and `documents/<CODE>/` for everything a
/// pipeline stage writes.
#[derive(Debug, Clone)]
pub struct Workspace {
    cache_root: PathBuf,
}

impl Workspace {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.cache_root.join("sources")
    }

    pub fn source_path(&self, file_name: &str) -> PathBuf {
        let candidate = Path::new(file_name);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.sources_dir().join(candidate)
        }
    }

    pub fn document_dir(&self, code: &str) -> PathBuf {
        self.cache_root.join("documents").join(code)
    }

    pub fn skeleton_path(&self, code: &str) -> PathBuf {
        self.document_dir(code).join(SKELETON_FILE)
    }

    pub fn approval_path(&self, code: &str) -> PathBuf {
        self.document_dir(code).join(APPROVAL_FILE)
    }

    pub fn expected_structure_file(version: u32) -> String {
        format!("expected/structure_v{version}.json")
    }

    pub fn expected_structure_path(&self, code: &str, version: u32) -> PathBuf {
        self.document_dir(code)
            .join(Self::expected_structure_file(version))
    }

    pub fn expected_dir(&self, code: &str) -> PathBuf {
        self.document_dir(code).join("expected")
    }

    pub fn content_path(&self, code: &str) -> PathBuf {
        self.document_dir(code).join(CONTENT_FILE)
    }

    pub fn validation_report_path(&self, code: &str) -> PathBuf {
        self.document_dir(code).join(VALIDATION_REPORT_FILE)
    }

    pub fn baseline_path(&self, code: &str, edition: &str) -> PathBuf {
        self.document_dir(code)
            .join("baselines")
            .join(format!("{}.json", sanitize_component(edition)))
    }

    pub fn regression_report_path(&self, code: &str) -> PathBuf {
        self.document_dir(code).join(REGRESSION_REPORT_FILE)
    }

    pub fn import_receipt_path(&self, code: &str) -> PathBuf {
        self.document_dir(code).join(IMPORT_RECEIPT_FILE)
    }

    pub fn state_path(&self, code: &str) -> PathBuf {
        self.document_dir(code).join(STATE_FILE)
    }

    pub fn default_db_path(&self) -> PathBuf {
        self.cache_root.join(DEFAULT_DB_FILE)
    }
}

/// Document codes become directory names, so only plain identifiers pass.
pub fn validate_document_code(code: &str) -> Result<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        bail!("document code must not be empty");
    }
    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        bail!("document code {trimmed:?} may only contain ASCII letters, digits, '-' or '_'");
    }
    Ok(trimmed.to_ascii_uppercase())
}

pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }

    while out.contains("__") {
        out = out.replace("__", "_");
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "unversioned".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_artifacts_live_under_the_document_directory() {
        let workspace = Workspace::new("/tmp/cache");
        assert_eq!(
            workspace.expected_structure_path("LISR", 3),
            PathBuf::from("/tmp/cache/documents/LISR/expected/structure_v3.json")
        );
        assert_eq!(
            workspace.baseline_path("LISR", "DOF 12/11/2021"),
            PathBuf::from("/tmp/cache/documents/LISR/baselines/dof_12_11_2021.json")
        );
        assert_eq!(
            workspace.source_path("lisr.pdf"),
            PathBuf::from("/tmp/cache/sources/lisr.pdf")
        );
    }

    #[test]
    fn document_codes_are_restricted_to_identifiers() {
        assert_eq!(validate_document_code(" cff ").expect("valid"), "CFF");
        assert_eq!(validate_document_code("RMF-2024").expect("valid"), "RMF-2024");
        assert!(validate_document_code("../etc").is_err());
        assert!(validate_document_code("").is_err());
    }
}
