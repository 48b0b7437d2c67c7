use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::ExtractArgs;
use crate::commands::{StageContext, require_approval};
use crate::error::PipelineError;
use crate::hierarchy::{ExtractOptions, LinePatterns, SourceExtraction, extract_articles};
use crate::merge::merge;
use crate::model::{ContentArtifact, MANIFEST_VERSION, SourceKind, SourceSummary};
use crate::pipeline::Stage;
use crate::sources::{NormalizationStats, try_read_source};
use crate::util::write_json_pretty;

pub fn run(args: ExtractArgs) -> Result<()> {
    let context = StageContext::open(&args.cache_root, &args.code, "extract")?;
    let mut state = context.state()?;
    let approved = require_approval(&context, &state)?;

    let entry = context.config.document(&context.code);
    let layout = context.config.layout_for(entry.kind);
    let patterns = LinePatterns::new()?;

    let mut summaries = Vec::<SourceSummary>::new();
    let mut extractions = Vec::<SourceExtraction>::new();
    for kind in SourceKind::ALL {
        let file_name = entry.source_file(kind);
        let path = context.workspace.source_path(&file_name);

        match try_read_source(kind, &path)? {
            Ok(stream) => {
                let options = ExtractOptions {
                    document_kind: entry.kind,
                    bands: layout.bands_for(kind),
                    policy: context.config.band_policy,
                };
                let extraction = extract_articles(&stream, &approved.skeleton, &patterns, &options)?;
                summaries.push(SourceSummary {
                    kind,
                    file_name: stream.file_name.clone(),
                    sha256: Some(stream.sha256.clone()),
                    available: true,
                    reason: None,
                    token_count: stream.tokens.len(),
                    article_count: extraction.articles.len(),
                    normalization: stream.stats.clone(),
                });
                extractions.push(extraction);
            }
            Err(reason) => summaries.push(SourceSummary {
                kind,
                file_name,
                sha256: None,
                available: false,
                reason: Some(reason),
                token_count: 0,
                article_count: 0,
                normalization: NormalizationStats::default(),
            }),
        }
    }

    if extractions.is_empty() {
        let reasons = summaries
            .iter()
            .map(|summary| {
                format!(
                    "{}: {}",
                    summary.kind,
                    summary.reason.as_deref().unwrap_or("unavailable")
                )
            })
            .collect::<Vec<String>>();
        return Err(PipelineError::SourceUnavailable {
            kind: SourceKind::PdfLayout,
            path: context.workspace.sources_dir().display().to_string(),
            reason: format!("no readable source for {} ({})", context.code, reasons.join("; ")),
        }
        .into());
    }

    let outcome = merge(
        &approved.skeleton,
        &extractions,
        &context.config.priority,
        context.config.similarity_threshold,
    );

    let content = ContentArtifact {
        manifest_version: MANIFEST_VERSION,
        document: entry.meta(),
        structure_version: approved.approval.structure_version,
        expected_structure_sha256: approved.sha256,
        sources: summaries,
        divisions: outcome.divisions,
        articles: outcome.articles,
        issues: outcome.issues,
    };

    let content_path = context.workspace.content_path(&context.code);
    write_json_pretty(&content_path, &content)?;

    let flagged = content
        .articles
        .iter()
        .filter(|article| !article.issues.is_empty())
        .map(|article| article.id.clone())
        .collect::<Vec<String>>();
    if !flagged.is_empty() {
        warn!(
            document = %context.code,
            articles = flagged.len(),
            first = %flagged[0],
            "articles carry extraction issues"
        );
    }
    if args.fail_on_issues && !flagged.is_empty() {
        state.invalidate(&context.workspace, Stage::Extract)?;
        bail!(
            "extraction issues in {} article(s) of {}: {}",
            flagged.len(),
            context.code,
            flagged.join(", ")
        );
    }

    state.record(&context.workspace, Stage::Extract, &content_path)?;

    info!(
        document = %context.code,
        structure_version = content.structure_version,
        articles = content.articles.len(),
        divisions = content.divisions.len(),
        sources = extractions.len(),
        path = %content_path.display(),
        "content written"
    );
    Ok(())
}
