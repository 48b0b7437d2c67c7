use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;
use crate::model::{ApprovalRecord, MANIFEST_VERSION, StructureSkeleton};
use crate::util::{file_name_of, now_utc_string, read_json, sha256_file, write_json_pretty};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Map,
    Approve,
    Extract,
    Validate,
    Import,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Map,
        Stage::Approve,
        Stage::Extract,
        Stage::Validate,
        Stage::Import,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Map => "map",
            Stage::Approve => "approve",
            Stage::Extract => "extract",
            Stage::Validate => "validate",
            Stage::Import => "import",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub completed_at: String,
    /// Path relative to the document directory.
    pub artifact: String,
    pub artifact_sha256: String,
}

/// Per-document record of which stages completed and what they produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub manifest_version: u32,
    pub document: String,
    #[serde(default)]
    pub stages: BTreeMap<Stage, StageRecord>,
}

impl PipelineState {
    pub fn load(workspace: &Workspace, code: &str) -> Result<Self> {
        let path = workspace.state_path(code);
        if !path.exists() {
            return Ok(Self {
                manifest_version: MANIFEST_VERSION,
                document: code.to_string(),
                stages: BTreeMap::new(),
            });
        }
        read_json(&path)
    }

    pub fn save(&self, workspace: &Workspace) -> Result<()> {
        write_json_pretty(&workspace.state_path(&self.document), self)
    }

    /// Records `stage` as complete with the hash of `artifact`, clearing
    /// every later stage, and persists the state.
    pub fn record(&mut self, workspace: &Workspace, stage: Stage, artifact: &Path) -> Result<()> {
        let document_dir = workspace.document_dir(&self.document);
        let relative = artifact
            .strip_prefix(&document_dir)
            .map(|value| value.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| file_name_of(artifact));

        let cleared = self
            .stages
            .keys()
            .filter(|existing| **existing > stage)
            .copied()
            .collect::<Vec<Stage>>();
        for later in &cleared {
            self.stages.remove(later);
        }

        self.stages.insert(
            stage,
            StageRecord {
                completed_at: now_utc_string(),
                artifact: relative,
                artifact_sha256: sha256_file(artifact)?,
            },
        );
        self.save(workspace)?;

        info!(
            document = %self.document,
            stage = %stage,
            cleared = cleared.len(),
            "stage recorded"
        );
        Ok(())
    }

    /// Drops the record of `stage` and every later stage.
    pub fn invalidate(&mut self, workspace: &Workspace, stage: Stage) -> Result<()> {
        let before = self.stages.len();
        self.stages.retain(|existing, _| *existing < stage);
        if self.stages.len() != before {
            self.save(workspace)?;
        }
        Ok(())
    }

    /// Fails unless `stage` completed and its artifact is unchanged on disk.
    pub fn require(&self, workspace: &Workspace, stage: Stage) -> Result<&StageRecord> {
        let Some(record) = self.stages.get(&stage) else {
            bail!(
                "stage {stage} has not completed for {}; run `mxlex {stage} {}` first",
                self.document,
                self.document
            );
        };

        let path = workspace.document_dir(&self.document).join(&record.artifact);
        if !path.exists() {
            bail!(
                "artifact of stage {stage} is missing for {}: {}",
                self.document,
                path.display()
            );
        }
        let actual = sha256_file(&path)?;
        if actual != record.artifact_sha256 {
            bail!(
                "artifact of stage {stage} changed since it was recorded for {}: {} (expected sha256 {}, found {})",
                self.document,
                path.display(),
                record.artifact_sha256,
                actual
            );
        }
        Ok(record)
    }
}

/// Loads the approved expected structure, verifying the approval record
/// against the copied file.
pub fn load_approved_structure(
    workspace: &Workspace,
    code: &str,
) -> Result<(ApprovalRecord, StructureSkeleton, String)> {
    let missing = |reason: String| PipelineError::ApprovalMissing {
        document: code.to_string(),
        reason,
    };

    let approval_path = workspace.approval_path(code);
    if !approval_path.exists() {
        return Err(missing(format!(
            "{} not found; run `mxlex approve {code} --approved-by NAME`",
            approval_path.display()
        ))
        .into());
    }
    let approval: ApprovalRecord = read_json(&approval_path)?;

    let expected_path = workspace.document_dir(code).join(&approval.expected_structure_file);
    if !expected_path.exists() {
        return Err(missing(format!(
            "expected structure {} is missing",
            expected_path.display()
        ))
        .into());
    }

    let expected_sha256 = sha256_file(&expected_path)?;
    if expected_sha256 != approval.skeleton_sha256 {
        return Err(missing(format!(
            "expected structure {} does not match the approved sha256 {}",
            expected_path.display(),
            approval.skeleton_sha256
        ))
        .into());
    }

    let skeleton: StructureSkeleton = read_json(&expected_path)?;
    Ok((approval, skeleton, expected_sha256))
}
