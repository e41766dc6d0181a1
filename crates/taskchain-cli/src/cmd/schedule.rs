use super::{EnvOverrides, Stack};
use crate::output::{print_json, print_table};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Upcoming {
    rule: String,
    expression: String,
    description: String,
    target: String,
    next: Vec<DateTime<Utc>>,
}

pub fn run(root: &Path, overrides: &EnvOverrides, count: usize, json: bool) -> anyhow::Result<()> {
    let stack = Stack::load(root, overrides)?;
    let now = Utc::now();

    let mut upcoming = Vec::new();
    for rule in &stack.topology.schedules {
        upcoming.push(Upcoming {
            rule: rule.id.to_string(),
            expression: rule.schedule.expression(),
            description: rule.schedule.describe(),
            target: rule.target.to_string(),
            next: rule.schedule.next_fires(now, count)?,
        });
    }

    if json {
        return print_json(&upcoming);
    }
    if upcoming.is_empty() {
        println!("No scheduled rules.");
        return Ok(());
    }

    for (i, u) in upcoming.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}: {} ({})", u.rule, u.expression, u.description);
        println!("  target: {}", u.target);
        let rows: Vec<Vec<String>> = u
            .next
            .iter()
            .enumerate()
            .map(|(n, at)| vec![(n + 1).to_string(), at.format("%Y-%m-%d %H:%M UTC").to_string()])
            .collect();
        print_table(&["#", "FIRES AT"], &rows);
    }
    Ok(())
}
