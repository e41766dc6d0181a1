use super::{EnvOverrides, Stack};
use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use taskchain_core::dispatch::{dispatch, task_stopped_event};
use taskchain_core::topology::{RuleTarget, Topology};

/// Where the simulated event comes from.
pub enum EventSource {
    /// A JSON event read from disk.
    File(PathBuf),
    /// A generated "task stopped" event. `None` picks the upstream cluster and
    /// the configured stop reason.
    Stopped {
        cluster: Option<String>,
        reason: Option<String>,
    },
}

pub fn run(
    root: &Path,
    overrides: &EnvOverrides,
    source: EventSource,
    json: bool,
) -> anyhow::Result<()> {
    let stack = Stack::load(root, overrides)?;

    let event: serde_json::Value = match source {
        EventSource::File(path) => {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("{} is not valid JSON", path.display()))?
        }
        EventSource::Stopped { cluster, reason } => {
            let upstream = &stack.config.pipeline.upstream;
            let cluster = cluster.unwrap_or_else(|| format!("{upstream}-cluster"));
            let family = family_in(&stack.topology, &cluster)
                .unwrap_or_else(|| format!("{cluster}-task"));
            let reason = reason.unwrap_or_else(|| stack.config.pipeline.stopped_reason.clone());
            task_stopped_event(&stack.env, &cluster, &family, &reason, Utc::now())
        }
    };

    let fired = dispatch(&stack.topology, &stack.env, &event);

    if json {
        return print_json(&serde_json::json!({
            "event": event,
            "dispatched": fired,
        }));
    }

    if fired.is_empty() {
        println!("No rules matched.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = fired
        .iter()
        .map(|d| {
            vec![
                d.rule_name.clone().unwrap_or_else(|| d.rule.to_string()),
                d.target.to_string(),
                d.target_arn.clone(),
            ]
        })
        .collect();
    print_table(&["RULE", "TARGET", "ARN"], &rows);
    Ok(())
}

/// Family of a task the topology runs in the cluster called `cluster_name`.
fn family_in(topology: &Topology, cluster_name: &str) -> Option<String> {
    let targets = topology
        .schedules
        .iter()
        .map(|s| &s.target)
        .chain(topology.event_rules.iter().flat_map(|r| &r.targets));
    for target in targets {
        if let RuleTarget::RunTask { cluster, task, .. } = target {
            let in_cluster = topology
                .cluster(cluster)
                .is_some_and(|c| c.name == cluster_name);
            if in_cluster {
                return topology.task(task).map(|t| t.family.clone());
            }
        }
    }
    None
}
