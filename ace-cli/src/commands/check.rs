use std::path::PathBuf;

use clap::Args;

use ace_core::apply::run_check;
use ace_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};
use ace_core::rules::RuleRegistry;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Project root (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Emit findings as a JSON array on stdout
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let root = super::resolve_root(&args.path)?;
    let config = super::load_config_or_default(&root)?;
    let registry = RuleRegistry::builtin();

    let reporter: Box<dyn ProgressReporter> = if args.json {
        Box::new(NoopReporter)
    } else {
        Box::new(IndicatifReporter::new())
    };
    let report = run_check(&root, &config, &registry, reporter.as_ref())?;

    for error in &report.scan.detector_errors {
        tracing::warn!(%error, "detector error");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.findings)?);
        return Ok(());
    }

    for finding in &report.findings {
        println!(
            "{}:{}: [{}] {} {}",
            finding.file.display(),
            finding.line,
            finding.severity,
            finding.rule,
            finding.message
        );
        if let Some(suggestion) = &finding.suggestion {
            println!("    suggestion: {suggestion}");
        }
    }
    println!();
    println!(
        "{} finding(s) in {} file(s) ({} suppressed, {} skiplisted)",
        report.findings.len(),
        report.scan.files_scanned,
        report.suppressed,
        report.skiplisted
    );
    Ok(())
}
