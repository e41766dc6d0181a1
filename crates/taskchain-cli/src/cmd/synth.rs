use super::{EnvOverrides, Stack};
use crate::output::{print_json, print_table};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use taskchain_core::{io, paths};

// ---------------------------------------------------------------------------
// synth
// ---------------------------------------------------------------------------

pub fn run(
    root: &Path,
    overrides: &EnvOverrides,
    output: Option<&Path>,
    stdout: bool,
    json: bool,
) -> anyhow::Result<()> {
    let stack = Stack::load(root, overrides)?;
    let template = stack.synthesize()?;
    let rendered = template.to_json_pretty()?;

    if stdout {
        println!("{rendered}");
        return Ok(());
    }

    let out_dir = match output {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => root.join(dir),
        None => root.join(paths::DEFAULT_OUT_DIR),
    };
    let path = paths::template_file(&out_dir, stack.name());
    io::atomic_write(&path, rendered.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    if json {
        print_json(&serde_json::json!({
            "stack": stack.name(),
            "template": path,
            "resources": template.resources.len(),
        }))?;
    } else {
        println!(
            "Synthesized {} ({} resources) to {}",
            stack.name(),
            template.resources.len(),
            path.display()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ls
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ResourceRow<'a> {
    logical_id: &'a str,
    resource_type: &'a str,
}

pub fn list(root: &Path, overrides: &EnvOverrides, json: bool) -> anyhow::Result<()> {
    let stack = Stack::load(root, overrides)?;
    let template = stack.synthesize()?;

    if json {
        let rows: Vec<ResourceRow> = template
            .resources
            .iter()
            .map(|(id, r)| ResourceRow {
                logical_id: id,
                resource_type: &r.resource_type,
            })
            .collect();
        return print_json(&rows);
    }

    let rows: Vec<Vec<String>> = template
        .resources
        .iter()
        .map(|(id, r)| vec![id.clone(), r.resource_type.clone()])
        .collect();
    println!("{}", stack.name());
    print_table(&["LOGICAL ID", "TYPE"], &rows);
    Ok(())
}
