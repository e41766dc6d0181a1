use anyhow::Context;
use std::path::Path;
use taskchain_core::{config::Config, io, paths};

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing taskchain in: {}", root.display());

    let dir = paths::taskchain_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if Config::exists(root) {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    io::ensure_gitignore_entry(root, &format!("{}/", paths::DEFAULT_OUT_DIR))
        .context("failed to update .gitignore")?;

    println!("\nNext: taskchain synth");
    Ok(())
}
