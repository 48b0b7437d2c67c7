pub mod approve;
pub mod checksum;
pub mod extract;
pub mod import;
pub mod map;
pub mod status;
pub mod validate;


use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::{ApprovalRecord, StructureSkeleton};
use crate::pipeline::{self, PipelineState, Stage};
use crate::workspace::{Workspace, validate_document_code};

/// What every stage command starts from: the resolved workspace, the
/// normalized document code and the loaded pipeline config.
pub struct StageContext {
    pub workspace: Workspace,
    pub code: String,
    pub config: PipelineConfig,
}

impl StageContext {
    pub fn open(cache_root: &Path, code: &str, stage: &str) -> Result<Self> {
        let code = validate_document_code(code)?;
        let workspace = Workspace::new(cache_root);
        let config = PipelineConfig::load(workspace.cache_root())?;

        info!(
            document = %code,
            stage,
            cache_root = %cache_root.display(),
            "stage started"
        );

        Ok(Self {
            workspace,
            code,
            config,
        })
    }

    pub fn state(&self) -> Result<PipelineState> {
        PipelineState::load(&self.workspace, &self.code)
    }
}

pub struct ApprovedStructure {
    pub approval: ApprovalRecord,
    pub skeleton: StructureSkeleton,
    pub sha256: String,
}

/// The approved expected structure, provided the approval is still the
/// current one (re-mapping clears it).
pub fn require_approval(context: &StageContext, state: &PipelineState) -> Result<ApprovedStructure> {
    if !state.stages.contains_key(&Stage::Approve) {
        return Err(PipelineError::ApprovalMissing {
            document: context.code.clone(),
            reason: format!(
                "the current skeleton has not been approved; run `mxlex approve {} --approved-by NAME`",
                context.code
            ),
        }
        .into());
    }
    state.require(&context.workspace, Stage::Approve)?;

    let (approval, skeleton, sha256) = pipeline::load_approved_structure(&context.workspace, &context.code)?;
    Ok(ApprovedStructure {
        approval,
        skeleton,
        sha256,
    })
}
