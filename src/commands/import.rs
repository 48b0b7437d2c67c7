use anyhow::Result;
use tracing::info;

use crate::cli::ImportArgs;
use crate::commands::{StageContext, require_approval};
use crate::loader::import_content;
use crate::model::ContentArtifact;
use crate::pipeline::Stage;
use crate::util::{read_json, sha256_file, write_json_pretty};
use crate::validation::{ensure_passed, validate};

/// Re-validates before touching the database; the staging load is all or
/// nothing.
pub fn run(args: ImportArgs) -> Result<()> {
    let context = StageContext::open(&args.cache_root, &args.code, "import")?;
    let mut state = context.state()?;
    state.require(&context.workspace, Stage::Extract)?;
    state.require(&context.workspace, Stage::Validate)?;
    let approved = require_approval(&context, &state)?;

    let content_path = context.workspace.content_path(&context.code);
    let content: ContentArtifact = read_json(&content_path)?;
    let report = validate(&approved.skeleton, &content);
    ensure_passed(&report)?;

    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| context.workspace.default_db_path());
    let content_sha256 = sha256_file(&content_path)?;
    let receipt = import_content(&db_path, &content, &content_sha256, args.replace_existing)?;

    let receipt_path = context.workspace.import_receipt_path(&context.code);
    write_json_pretty(&receipt_path, &receipt)?;
    state.record(&context.workspace, Stage::Import, &receipt_path)?;

    info!(
        document = %context.code,
        db_path = %db_path.display(),
        articles = receipt.article_count,
        paragraphs = receipt.paragraph_count,
        replaced = receipt.replaced_existing,
        "import finished"
    );
    Ok(())
}
