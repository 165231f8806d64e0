use std::path::{Path, PathBuf};

use clap::Args;

use ace_core::apply::{ace_dir, journals_dir, load_all_receipts, skiplist_path};
use ace_core::journal::read_journal;
use ace_core::skiplist::Skiplist;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Project root (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

pub fn run(args: StatusArgs) -> anyhow::Result<()> {
    let root = super::resolve_root(&args.path)?;
    if !ace_dir(&root).exists() {
        anyhow::bail!(
            "ACE is not initialized in {}. Run `ace init` first.",
            root.display()
        );
    }

    println!("ACE status for {}", root.display());
    println!();

    let journals = list_journals(&journals_dir(&root));
    println!("  Runs: {}", journals.len());
    for path in &journals {
        let run_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match read_journal(path) {
            Ok(records) => println!("    {run_id:<38} {:>4} record(s)", records.len()),
            Err(e) => println!("    {run_id:<38} unreadable: {e}"),
        }
    }
    println!();

    let receipts = load_all_receipts(&root)?;
    println!("  Receipts: {}", receipts.len());
    if let Some(latest) = receipts.iter().max_by_key(|r| r.timestamp) {
        println!(
            "    latest: {} at {} (risk {:.2})",
            latest.file.display(),
            latest.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            latest.estimated_risk
        );
    }
    println!();

    let skiplist = Skiplist::load(&skiplist_path(&root))?;
    println!("  Skiplist: {} entr{}", skiplist.len(), if skiplist.len() == 1 { "y" } else { "ies" });
    for entry in skiplist.entries() {
        println!("    {}:{}  {}", entry.rule, entry.stable_id, entry.reason);
    }
    Ok(())
}

fn list_journals(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    paths.sort_unstable();
    paths
}
