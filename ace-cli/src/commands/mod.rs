pub mod apply;
pub mod check;
pub mod init;
pub mod plan;
pub mod revert;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;

use ace_core::config::AceConfig;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize ACE for a project (writes .ace/config.toml)
    Init(init::InitArgs),
    /// Analyze and report findings without planning or applying
    Check(check::CheckArgs),
    /// Synthesize edit plans and show their policy verdicts
    Plan(plan::PlanArgs),
    /// Run the full pipeline and apply approved plans
    Apply(apply::ApplyArgs),
    /// Restore files modified by a previous run from its journal
    Revert(revert::RevertArgs),
    /// Show persisted runs, receipts, and skiplist state
    Status(status::StatusArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args),
        Command::Check(args) => check::run(args),
        Command::Plan(args) => plan::run(args),
        Command::Apply(args) => apply::run(args),
        Command::Revert(args) => revert::run(args),
        Command::Status(args) => status::run(args),
    }
}

/// Canonicalize a user-supplied project path.
pub fn resolve_root(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(path)
        .with_context(|| format!("Cannot resolve path: {}", path.display()))
}

/// Load the project config, requiring `ace init` to have run.
pub fn load_config(root: &Path) -> anyhow::Result<AceConfig> {
    let path = ace_core::apply::config_path(root);
    if !path.exists() {
        anyhow::bail!(
            "ACE is not initialized in {}. Run `ace init` first.",
            root.display()
        );
    }
    AceConfig::load(&path).with_context(|| format!("Cannot load config: {}", path.display()))
}

/// Load the project config if present, falling back to defaults.
/// Read-only commands work on uninitialized trees.
pub fn load_config_or_default(root: &Path) -> anyhow::Result<AceConfig> {
    let path = ace_core::apply::config_path(root);
    if !path.exists() {
        return Ok(AceConfig::default());
    }
    AceConfig::load(&path).with_context(|| format!("Cannot load config: {}", path.display()))
}
