//! Error taxonomy for the patch/backup/restore engine.
//!
//! Every variant is fatal to the running session. The `help` attached to each
//! diagnostic names the manual remediation path shown to the operator.

use std::{io, path::PathBuf};

use itertools::Itertools;
use miette::Diagnostic;

/// Result alias used throughout the core.
pub type PatchResult<T> = std::result::Result<T, PatchError>;

/// Domain-specific error taxonomy for exit-code mapping
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum PatchError
{
    /// Bad configured paths, invalid anchors, inconsistent thresholds
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(panelpatch::config),
        help("check panelpatch.toml or the PANELPATCH__* environment variables")
    )]
    Config(String),

    #[error("insufficient privilege: this command must run as root")]
    #[diagnostic(code(panelpatch::privilege), help("re-run the command as root (e.g. with sudo)"))]
    Privilege,

    #[error("modification '{name}' is already installed")]
    #[diagnostic(
        code(panelpatch::already_installed),
        help("run `panelpatch uninstall` first if you want to reinstall it")
    )]
    AlreadyInstalled
    {
        name: String
    },

    #[error("modification '{name}' is not installed")]
    #[diagnostic(code(panelpatch::not_installed), help("nothing to remove"))]
    NotInstalled
    {
        name: String
    },

    /// Missing, unreadable or unwritable files
    #[error("I/O error on {}: {source}", .path.display())]
    #[diagnostic(code(panelpatch::io))]
    Io
    {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backup of {} failed verification against {}", .original.display(), .backup.display())]
    #[diagnostic(
        code(panelpatch::backup_verification),
        help("check free space and permissions of the backup directory; no target file was modified")
    )]
    BackupVerification
    {
        original: PathBuf,
        backup: PathBuf,
    },

    #[error("anchor `{pattern}` not found in {}", .path.display())]
    #[diagnostic(
        code(panelpatch::anchor_not_found),
        help(
            "the host application layout has likely changed after an upgrade; \
             update the anchor in panelpatch.toml or reinstall the host package"
        )
    )]
    AnchorNotFound
    {
        path: PathBuf,
        pattern: String,
    },

    #[error("anchor `{pattern}` matched {count} times in {} (lines {lines:?})", .path.display())]
    #[diagnostic(
        code(panelpatch::anchor_ambiguous),
        help("tighten the anchor pattern so it matches exactly one location")
    )]
    AnchorAmbiguous
    {
        path: PathBuf,
        pattern: String,
        count: usize,
        lines: Vec<usize>,
    },

    #[error("no complete block for marker '{marker}' in {}", .path.display())]
    #[diagnostic(
        code(panelpatch::block_not_found),
        help("restore the file from a backup by hand, or reinstall the host package")
    )]
    BlockNotFound
    {
        path: PathBuf,
        marker: String,
    },

    #[error(
        "patching stopped at {}: {reason}\n  already patched: {}",
        .failed.display(),
        display_paths(.patched)
    )]
    #[diagnostic(
        code(panelpatch::partial_patch),
        help("run `panelpatch uninstall` to restore the patched files from their backups")
    )]
    PartialPatch
    {
        patched: Vec<PathBuf>,
        failed: PathBuf,
        reason: Box<PatchError>,
    },

    #[error("uninstall declined by operator; no files were changed")]
    #[diagnostic(code(panelpatch::declined))]
    Declined,

    /// Prompt or console failures
    #[error("operator I/O failed: {0}")]
    #[diagnostic(code(panelpatch::operator))]
    Operator(String),
}

impl PatchError
{
    /// Wrap an `io::Error` with the path it happened on.
    pub fn io(
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self
    {
        PatchError::Io { path: path.into(), source }
    }
}

fn display_paths(paths: &[PathBuf]) -> String
{
    if paths.is_empty()
    {
        return "(none)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display())
        .join(", ")
}

/// Converts errors to process exit codes
/// 0=success, 2=state mismatch, 3=config, 4=privilege, 5=file operation, 6=operator
pub fn exit_code_for(e: &PatchError) -> i32
{
    match e
    {
        PatchError::AlreadyInstalled { .. } | PatchError::NotInstalled { .. } | PatchError::Declined => 2,
        PatchError::Config(_) => 3,
        PatchError::Privilege => 4,
        PatchError::Io { .. }
        | PatchError::BackupVerification { .. }
        | PatchError::AnchorNotFound { .. }
        | PatchError::AnchorAmbiguous { .. }
        | PatchError::BlockNotFound { .. }
        | PatchError::PartialPatch { .. } => 5,
        PatchError::Operator(_) => 6,
    }
}
