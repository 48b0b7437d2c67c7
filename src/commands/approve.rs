use std::fs;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::ApproveArgs;
use crate::commands::StageContext;
use crate::model::{ApprovalRecord, MANIFEST_VERSION};
use crate::pipeline::Stage;
use crate::util::{ensure_directory, now_utc_string, read_json, sha256_file, write_json_pretty};
use crate::workspace::Workspace;

pub fn run(args: ApproveArgs) -> Result<()> {
    let context = StageContext::open(&args.cache_root, &args.code, "approve")?;
    let approved_by = args.approved_by.trim();
    if approved_by.is_empty() {
        bail!("--approved-by must name the reviewer");
    }

    let mut state = context.state()?;
    state.require(&context.workspace, Stage::Map)?;

    let skeleton_path = context.workspace.skeleton_path(&context.code);
    let skeleton_sha256 = sha256_file(&skeleton_path)?;
    if let Some(reviewed) = args.skeleton_sha256.as_deref() {
        if !reviewed.trim().eq_ignore_ascii_case(&skeleton_sha256) {
            bail!(
                "skeleton for {} changed since review: reviewed sha256 {}, current {}",
                context.code,
                reviewed.trim(),
                skeleton_sha256
            );
        }
    }

    let approval_path = context.workspace.approval_path(&context.code);
    let structure_version = if approval_path.exists() {
        let previous: ApprovalRecord = read_json(&approval_path)?;
        previous.structure_version + 1
    } else {
        1
    };

    ensure_directory(&context.workspace.expected_dir(&context.code))?;
    let expected_path = context
        .workspace
        .expected_structure_path(&context.code, structure_version);
    fs::copy(&skeleton_path, &expected_path).with_context(|| {
        format!(
            "failed to copy {} to {}",
            skeleton_path.display(),
            expected_path.display()
        )
    })?;

    let approval = ApprovalRecord {
        manifest_version: MANIFEST_VERSION,
        document: context.code.clone(),
        structure_version,
        approved_by: approved_by.to_string(),
        approved_at: now_utc_string(),
        skeleton_sha256,
        expected_structure_file: Workspace::expected_structure_file(structure_version),
    };
    write_json_pretty(&approval_path, &approval)?;
    state.record(&context.workspace, Stage::Approve, &approval_path)?;

    info!(
        document = %context.code,
        structure_version,
        approved_by = %approval.approved_by,
        expected = %expected_path.display(),
        "expected structure approved"
    );
    Ok(())
}
