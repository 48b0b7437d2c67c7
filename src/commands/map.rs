use anyhow::Result;
use tracing::info;

use crate::cli::MapArgs;
use crate::commands::StageContext;
use crate::error::PipelineError;
use crate::hierarchy::{LinePatterns, build_skeleton};
use crate::merge::{EntityKind, MergeField};
use crate::model::SourceKind;
use crate::pipeline::Stage;
use crate::sources::{TokenStream, try_read_source};
use crate::util::write_json_pretty;

pub fn run(args: MapArgs) -> Result<()> {
    let context = StageContext::open(&args.cache_root, &args.code, "map")?;
    let entry = context.config.document(&context.code);

    let stream = read_primary_source(&context)?;
    let patterns = LinePatterns::new()?;
    let skeleton = build_skeleton(&context.code, entry.kind, &stream, &patterns)?;

    let skeleton_path = context.workspace.skeleton_path(&context.code);
    write_json_pretty(&skeleton_path, &skeleton)?;

    let mut state = context.state()?;
    state.record(&context.workspace, Stage::Map, &skeleton_path)?;

    info!(
        document = %context.code,
        source = %stream.source,
        divisions = skeleton.flatten().len(),
        articles = skeleton.total_article_count,
        path = %skeleton_path.display(),
        "skeleton written; review it and run approve"
    );
    Ok(())
}

/// The skeleton is mapped from the first readable source in placement
/// priority, falling back to any remaining kind.
fn read_primary_source(context: &StageContext) -> Result<TokenStream> {
    let entry = context.config.document(&context.code);
    let mut order = context
        .config
        .priority
        .sources_for(EntityKind::Article, MergeField::Placement)
        .to_vec();
    for kind in SourceKind::ALL {
        if !order.contains(&kind) {
            order.push(kind);
        }
    }

    let mut reasons = Vec::new();
    for kind in &order {
        let path = context.workspace.source_path(&entry.source_file(*kind));
        match try_read_source(*kind, &path)? {
            Ok(stream) => return Ok(stream),
            Err(reason) => reasons.push(format!("{kind}: {reason}")),
        }
    }

    Err(PipelineError::SourceUnavailable {
        kind: order.first().copied().unwrap_or(SourceKind::PdfLayout),
        path: context.workspace.sources_dir().display().to_string(),
        reason: format!("no readable source for {} ({})", context.code, reasons.join("; ")),
    }
    .into())
}
