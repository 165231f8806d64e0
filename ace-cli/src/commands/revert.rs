use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use ace_core::apply::journals_dir;
use ace_core::journal::build_revert_plan;

#[derive(Args, Debug)]
pub struct RevertArgs {
    /// Run ID whose journal should be replayed
    pub run_id: String,

    /// Project root (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Show what would be restored without writing
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: RevertArgs) -> anyhow::Result<()> {
    let root = super::resolve_root(&args.path)?;
    if !ace_core::apply::ace_dir(&root).exists() {
        anyhow::bail!(
            "ACE is not initialized in {}. Run `ace init` first.",
            root.display()
        );
    }

    let journal_path = journals_dir(&root).join(format!("{}.jsonl", args.run_id));
    let plan = build_revert_plan(&journal_path)
        .with_context(|| format!("Cannot replay journal for run {}", args.run_id))?;

    if plan.contexts.is_empty() && plan.incomplete.is_empty() {
        println!("Run {} modified no files; nothing to revert.", args.run_id);
        return Ok(());
    }

    // Most recent modification restored first.
    for ctx in &plan.contexts {
        if args.dry_run {
            println!(
                "would restore {} ({} -> {})",
                ctx.file.display(),
                &ctx.applied_sha[..12],
                &ctx.original_sha[..12]
            );
            continue;
        }
        ctx.restore()
            .with_context(|| format!("Cannot restore {}", ctx.file.display()))?;
        println!("restored {}", ctx.file.display());
    }

    for file in &plan.incomplete {
        tracing::warn!(
            file = %file.display(),
            "intent without success in journal; on-disk state unknown, left untouched"
        );
    }

    if !args.dry_run {
        println!(
            "Reverted {} file(s) from run {}.",
            plan.contexts.len(),
            args.run_id
        );
    }
    Ok(())
}
