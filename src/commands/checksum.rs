use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::checksum::{build_baseline, compare, diff};
use crate::cli::ChecksumArgs;
use crate::commands::StageContext;
use crate::config::{RegressionMode, resolve_regression_mode};
use crate::error::PipelineError;
use crate::model::{ChecksumBaseline, ContentArtifact};
use crate::pipeline::Stage;
use crate::util::{read_json, write_json_pretty};

pub fn run(args: ChecksumArgs) -> Result<()> {
    let context = StageContext::open(&args.cache_root, &args.code, "checksum")?;
    let state = context.state()?;
    state.require(&context.workspace, Stage::Extract)?;

    let content: ContentArtifact = read_json(&context.workspace.content_path(&context.code))?;
    let baseline_path = context
        .workspace
        .baseline_path(&context.code, &content.document.edition);

    if args.save {
        // Only validated content may become a baseline.
        state.require(&context.workspace, Stage::Validate)?;
        if baseline_path.exists() && !args.overwrite {
            bail!(
                "baseline for {} edition {} already exists at {}; pass --overwrite to replace it",
                context.code,
                content.document.edition,
                baseline_path.display()
            );
        }

        let baseline = build_baseline(&content, args.signed_off_by.clone());
        write_json_pretty(&baseline_path, &baseline)?;
        info!(
            document = %context.code,
            edition = %baseline.edition,
            articles = baseline.entries.len(),
            path = %baseline_path.display(),
            "baseline saved"
        );
        return Ok(());
    }

    if !baseline_path.exists() {
        bail!(
            "no baseline for {} edition {}; run `mxlex checksum {} --save` first",
            context.code,
            content.document.edition,
            context.code
        );
    }
    let baseline: ChecksumBaseline = read_json(&baseline_path)?;

    if let Some(article_id) = args.diff.as_deref() {
        let article_diff = diff(&baseline, &content, article_id)?;
        let rendered =
            serde_json::to_string_pretty(&article_diff).context("failed to render article diff")?;
        println!("{rendered}");
        return Ok(());
    }

    let report = compare(&baseline, &content);
    let report_path = context.workspace.regression_report_path(&context.code);
    write_json_pretty(&report_path, &report)?;

    let rendered =
        serde_json::to_string_pretty(&report.counts).context("failed to render regression counts")?;
    println!("{rendered}");

    let drifted = report.drifted_article_ids();
    if drifted.is_empty() {
        info!(document = %context.code, "no drift against baseline");
        return Ok(());
    }

    match resolve_regression_mode(args.strict) {
        RegressionMode::Block => Err(PipelineError::RegressionDetected {
            document: context.code.clone(),
            articles: drifted,
        }
        .into()),
        RegressionMode::Warn => {
            warn!(
                document = %context.code,
                drifted = drifted.len(),
                path = %report_path.display(),
                "drift reported without blocking"
            );
            Ok(())
        }
    }
}
