use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::workspace::DEFAULT_CACHE_ROOT;

#[derive(Parser, Debug)]
#[command(
    name = "mxlex",
    version,
    about = "Structural extraction pipeline for Mexican legal texts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the top-priority source and write the structure skeleton.
    Map(MapArgs),
    /// Record a reviewer's approval of the current skeleton.
    Approve(ApproveArgs),
    /// Read every source, segment articles and merge them into content.json.
    Extract(ExtractArgs),
    /// Compare extracted counts against the approved structure.
    Validate(ValidateArgs),
    /// Load validated content into the staging database.
    Import(ImportArgs),
    /// Save, compare or diff per-article content fingerprints.
    Checksum(ChecksumArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct MapArgs {
    pub code: String,

    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ApproveArgs {
    pub code: String,

    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub approved_by: String,

    /// Hash of the skeleton the reviewer actually read; approval fails if the
    /// file changed since.
    #[arg(long)]
    pub skeleton_sha256: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    pub code: String,

    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long, default_value_t = false)]
    pub fail_on_issues: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    pub code: String,

    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    pub code: String,

    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub replace_existing: bool,
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["save", "compare", "diff"])
))]
pub struct ChecksumArgs {
    pub code: String,

    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long, default_value_t = false)]
    pub save: bool,

    #[arg(long, default_value_t = false)]
    pub compare: bool,

    #[arg(long, value_name = "ARTICLE_ID")]
    pub diff: Option<String>,

    #[arg(long, default_value_t = false, requires = "save")]
    pub overwrite: bool,

    #[arg(long, requires = "save")]
    pub signed_off_by: Option<String>,

    /// Treat any drift as a failure (same as MXLEX_REGRESSION_MODE=block).
    #[arg(long, default_value_t = false, requires = "compare")]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    pub code: String,

    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
