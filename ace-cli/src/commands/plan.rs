use std::path::PathBuf;

use clap::Args;

use ace_core::apply::run_plan;
use ace_core::policy::GateOutcome;
use ace_core::progress::NoopReporter;
use ace_core::rules::RuleRegistry;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Project root (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Skip pack synthesis
    #[arg(long)]
    pub no_packs: bool,

    /// Emit plans with verdicts as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: PlanArgs) -> anyhow::Result<()> {
    let root = super::resolve_root(&args.path)?;
    let config = super::load_config_or_default(&root)?;
    let registry = RuleRegistry::builtin();

    let (gated, _, refactor_failures, packs) =
        run_plan(&root, &config, &registry, args.no_packs, &NoopReporter)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&gated)?);
        return Ok(());
    }

    for gp in &gated {
        let verdict = match &gp.outcome {
            GateOutcome::Approved { score } => format!("approved (score {score:.2})"),
            GateOutcome::Suggested { score } => format!("suggested (score {score:.2})"),
            GateOutcome::Denied { score, reason } => {
                format!("denied (score {score:.2}: {reason})")
            }
        };
        println!("plan {}  {}", gp.plan.id, verdict);
        println!(
            "    rules: {}  edits: {}  lines: {}",
            gp.plan.rules().join(", "),
            gp.plan.edits.len(),
            gp.plan.line_count()
        );
        for file in gp.plan.files() {
            println!("    file: {}", file.display());
        }
    }
    println!();
    println!(
        "{} plan(s), {} pack(s) synthesized, {} refactor failure(s)",
        gated.len(),
        packs,
        refactor_failures
    );
    Ok(())
}
