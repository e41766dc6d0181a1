use super::diff::print_changes;
use super::{EnvOverrides, Stack};
use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use taskchain_core::provision::{LocalProvisioner, Provisioner};

pub fn run(root: &Path, overrides: &EnvOverrides, json: bool) -> anyhow::Result<()> {
    let stack = Stack::load(root, overrides)?;
    let template = stack.synthesize()?;
    let change_set = LocalProvisioner::new(root)
        .deploy(stack.name(), &stack.env, &template)
        .with_context(|| format!("failed to deploy {}", stack.name()))?;

    if json {
        return print_json(&change_set);
    }
    println!(
        "Deploying {} to {}/{}",
        stack.name(),
        stack.env.account,
        stack.env.region
    );
    print_changes(&change_set.diff);
    if change_set.applied {
        println!("\n{}: deployed", stack.name());
    } else {
        println!("\n{}: no changes", stack.name());
    }
    Ok(())
}

pub fn destroy(root: &Path, overrides: &EnvOverrides, force: bool, json: bool) -> anyhow::Result<()> {
    let stack = Stack::load(root, overrides)?;
    if !force {
        anyhow::bail!(
            "refusing to destroy {} without --force",
            stack.name()
        );
    }

    let change_set = LocalProvisioner::new(root)
        .destroy(stack.name(), &stack.env)
        .with_context(|| format!("failed to destroy {}", stack.name()))?;

    if json {
        return print_json(&change_set);
    }
    print_changes(&change_set.diff);
    println!("\n{}: destroyed", stack.name());
    Ok(())
}
