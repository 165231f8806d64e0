use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use ace_core::config::AceConfig;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project root (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    let root = super::resolve_root(&args.path)?;
    let config_path = ace_core::apply::config_path(&root);

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "ACE is already initialized in {} (use --force to overwrite)",
            root.display()
        );
    }

    std::fs::create_dir_all(config_path.parent().expect("config lives under .ace"))
        .with_context(|| format!("Cannot create .ace directory in {}", root.display()))?;
    std::fs::write(&config_path, AceConfig::default_toml())
        .with_context(|| format!("Cannot write config: {}", config_path.display()))?;

    println!("Initialized ACE in {}", root.display());
    println!("  config: {}", config_path.display());
    Ok(())
}
