use super::{EnvOverrides, Stack};
use crate::output::{print_json, render_table};
use anyhow::Context;
use std::path::Path;
use taskchain_core::diff::TemplateDiff;
use taskchain_core::provision::{LocalProvisioner, Provisioner};

pub fn run(root: &Path, overrides: &EnvOverrides, fail: bool, json: bool) -> anyhow::Result<()> {
    let stack = Stack::load(root, overrides)?;
    let template = stack.synthesize()?;
    let plan = LocalProvisioner::new(root)
        .plan(stack.name(), &stack.env, &template)
        .context("failed to read deployed stack")?;

    if json {
        print_json(&plan)?;
    } else {
        println!("Stack {}", stack.name());
        print_changes(&plan);
    }

    if fail && !plan.is_empty() {
        anyhow::bail!("stack {} has differences", stack.name());
    }
    Ok(())
}

/// Human-readable change listing shared by `diff`, `deploy` and `destroy`.
pub fn print_changes(diff: &TemplateDiff) {
    if diff.is_empty() {
        println!("There were no differences");
        return;
    }

    let rows: Vec<Vec<String>> = diff
        .resources
        .iter()
        .map(|c| {
            let mut note = c.changed.join(", ");
            if c.replacement {
                note.push_str(" (replace)");
            }
            vec![
                c.kind.to_string(),
                c.logical_id.clone(),
                c.resource_type.clone(),
                note,
            ]
        })
        .collect();
    if !rows.is_empty() {
        print!(
            "{}",
            render_table(&["", "LOGICAL ID", "TYPE", "CHANGED"], &rows, "  ")
        );
    }
    for name in &diff.parameters {
        println!("  parameter {name} changed");
    }
    for name in &diff.outputs {
        println!("  output {name} changed");
    }
    println!("\n{}", diff.summary());
}
