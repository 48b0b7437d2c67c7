use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::loader::{article_count, document_exists};
use crate::model::{ApprovalRecord, ContentArtifact, ValidationReport};
use crate::pipeline::{PipelineState, Stage};
use crate::util::read_json;
use crate::workspace::{Workspace, validate_document_code};

pub fn run(args: StatusArgs) -> Result<()> {
    let code = validate_document_code(&args.code)?;
    let workspace = Workspace::new(&args.cache_root);
    let state = PipelineState::load(&workspace, &code)?;

    info!(document = %code, cache_root = %args.cache_root.display(), "status requested");

    for stage in Stage::ALL {
        match state.stages.get(&stage) {
            Some(record) => {
                let intact = state.require(&workspace, stage).is_ok();
                info!(
                    stage = %stage,
                    completed_at = %record.completed_at,
                    artifact = %record.artifact,
                    intact,
                    "stage complete"
                );
            }
            None => warn!(stage = %stage, "stage pending"),
        }
    }

    let approval_path = workspace.approval_path(&code);
    if approval_path.exists() {
        let approval: ApprovalRecord = read_json(&approval_path)?;
        info!(
            structure_version = approval.structure_version,
            approved_by = %approval.approved_by,
            approved_at = %approval.approved_at,
            "loaded approval record"
        );
    }

    let content_path = workspace.content_path(&code);
    if content_path.exists() {
        let content: ContentArtifact = read_json(&content_path)?;
        let unverified = content
            .articles
            .iter()
            .filter(|article| article.content_unverified)
            .count();
        let available = content
            .sources
            .iter()
            .filter(|source| source.available)
            .map(|source| source.kind.as_str())
            .collect::<Vec<&str>>()
            .join(",");
        info!(
            edition = %content.document.edition,
            articles = content.articles.len(),
            divisions = content.divisions.len(),
            content_unverified = unverified,
            sources = %available,
            "loaded content artifact"
        );
    }

    let report_path = workspace.validation_report_path(&code);
    if report_path.exists() {
        let report: ValidationReport = read_json(&report_path)?;
        info!(
            passed = report.passed,
            completeness = report.summary.completeness_percent,
            warnings = report.summary.warning,
            errors = report.summary.error + report.summary.empty,
            "loaded validation report"
        );
    }

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| workspace.default_db_path());
    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        match database_summary(&conn, &code) {
            Ok((loaded, articles)) => info!(
                path = %db_path.display(),
                loaded,
                articles,
                "database status"
            ),
            Err(err) => warn!(
                path = %db_path.display(),
                error = %err,
                "database could not be queried"
            ),
        }
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

fn database_summary(conn: &Connection, code: &str) -> Result<(bool, i64)> {
    let loaded = document_exists(conn, code)?;
    let articles = article_count(conn, code)?;
    Ok((loaded, articles))
}
