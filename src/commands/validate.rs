use anyhow::{Result, bail};
use tracing::info;

use crate::cli::ValidateArgs;
use crate::commands::{StageContext, require_approval};
use crate::model::ContentArtifact;
use crate::pipeline::Stage;
use crate::util::{read_json, write_json_pretty};
use crate::validation::{ensure_passed, validate};

pub fn run(args: ValidateArgs) -> Result<()> {
    let context = StageContext::open(&args.cache_root, &args.code, "validate")?;
    let mut state = context.state()?;
    state.require(&context.workspace, Stage::Extract)?;
    let approved = require_approval(&context, &state)?;

    let content: ContentArtifact = read_json(&context.workspace.content_path(&context.code))?;
    if content.structure_version != approved.approval.structure_version {
        bail!(
            "content of {} was extracted against structure v{} but v{} is approved; re-run extract",
            context.code,
            content.structure_version,
            approved.approval.structure_version
        );
    }

    let report = validate(&approved.skeleton, &content);
    let report_path = context.workspace.validation_report_path(&context.code);
    write_json_pretty(&report_path, &report)?;

    if !report.passed {
        state.invalidate(&context.workspace, Stage::Validate)?;
        ensure_passed(&report)?;
    }

    state.record(&context.workspace, Stage::Validate, &report_path)?;
    info!(
        document = %context.code,
        findings = report.findings.len(),
        warnings = report.summary.warning,
        completeness = report.summary.completeness_percent,
        path = %report_path.display(),
        "validation passed"
    );
    Ok(())
}
