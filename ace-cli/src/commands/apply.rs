use std::path::PathBuf;

use clap::Args;

use ace_core::apply::{ApplyOptions, run_apply};
use ace_core::progress::IndicatifReporter;
use ace_core::rules::RuleRegistry;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Project root (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Run the pipeline, including verification, without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip pack synthesis; apply individual plans only
    #[arg(long)]
    pub no_packs: bool,

    /// Cap on distinct files modified this run
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Cap on total lines modified this run
    #[arg(long)]
    pub max_lines: Option<u64>,

    /// Fail (exit 4) when no plan is approved and applied
    #[arg(long)]
    pub strict: bool,

    /// Emit the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ApplyArgs) -> anyhow::Result<()> {
    let root = super::resolve_root(&args.path)?;
    let config = super::load_config(&root)?;
    let registry = RuleRegistry::builtin();
    let options = ApplyOptions {
        dry_run: args.dry_run,
        no_packs: args.no_packs,
        max_files: args.max_files,
        max_lines: args.max_lines,
    };

    let summary = run_apply(&root, &config, &registry, &options, &IndicatifReporter::new())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let label = if summary.dry_run { "dry run" } else { "run" };
        println!("ace apply ({label} {})", summary.run_id);
        println!(
            "  findings: {} ({} suppressed, {} skiplisted)",
            summary.findings_total, summary.findings_suppressed, summary.findings_skiplisted
        );
        println!(
            "  plans: {} generated, {} approved, {} suggested, {} denied, {} over budget",
            summary.plans_generated,
            summary.plans_approved,
            summary.plans_suggested,
            summary.plans_denied,
            summary.budget_excluded
        );
        println!(
            "  applied: {} ({} repaired, {} reverted, {} no-op), {} file(s), {} line(s)",
            summary.applied,
            summary.repaired,
            summary.reverted,
            summary.skipped_idempotent,
            summary.files_modified,
            summary.lines_modified
        );
        for suggestion in &summary.suggestions {
            println!(
                "  suggest: plan {} (score {:.2}) — {}",
                suggestion.plan_id,
                suggestion.score,
                suggestion.rules.join(", ")
            );
        }
        if let Some(reason) = summary.stopped_at {
            println!("  stopped: {reason}");
        }
    }

    if args.strict && summary.applied == 0 {
        anyhow::bail!("Policy denied: nothing approved and applied under --strict");
    }
    Ok(())
}
