//! Local evaluation of event rules against a single event.
//!
//! The provider's event bus does the real matching; this lets the topology
//! be checked against sample events without deploying anything.

use crate::pattern::EventPattern;
use crate::synth::Environment;
use crate::topology::{
    ResourceId, RuleTarget, Topology, STATUS_STOPPED, TASK_EVENT_SOURCE, TASK_STATE_CHANGE,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

/// One action the event bus would take for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispatch {
    pub rule: ResourceId,
    pub rule_name: Option<String>,
    pub target: RuleTarget,
    pub target_arn: String,
}

/// Every target of every rule whose predicate matches `event`.
///
/// Targets of one event fire independently; the result is sorted by rule id
/// only so that output is stable.
pub fn dispatch(topology: &Topology, env: &Environment, event: &Value) -> Vec<Dispatch> {
    let mut rules: Vec<_> = topology.event_rules.iter().collect();
    rules.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = Vec::new();
    for rule in rules {
        let Some(predicate) = topology.predicate(&rule.predicate) else {
            continue;
        };
        let Some(cluster) = topology.cluster(&predicate.cluster) else {
            continue;
        };
        let pattern = EventPattern::for_predicate(predicate, json!(env.cluster_arn(&cluster.name)));
        if !pattern.matches(event) {
            tracing::debug!(rule = %rule.id, "no match");
            continue;
        }
        for target in &rule.targets {
            out.push(Dispatch {
                rule: rule.id.clone(),
                rule_name: rule.name.clone(),
                target: target.clone(),
                target_arn: target_arn(topology, env, target),
            });
        }
    }
    out
}

fn target_arn(topology: &Topology, env: &Environment, target: &RuleTarget) -> String {
    match target {
        RuleTarget::InvokeHandler { handler } => topology
            .handler(handler)
            .map(|h| env.function_arn(&h.function_name))
            .unwrap_or_default(),
        RuleTarget::RunTask { task, .. } => topology
            .task(task)
            .map(|t| env.task_definition_arn(&t.family))
            .unwrap_or_default(),
    }
}

/// A "task stopped" state-change event as the execution fabric emits it.
pub fn task_stopped_event(
    env: &Environment,
    cluster_name: &str,
    family: &str,
    reason: &str,
    at: DateTime<Utc>,
) -> Value {
    let cluster_arn = env.cluster_arn(cluster_name);
    let task_arn = format!(
        "arn:aws:ecs:{}:{}:task/{cluster_name}/{:032x}",
        env.region,
        env.account,
        at.timestamp_millis()
    );
    json!({
        "version": "0",
        "id": format!("local-{}", at.timestamp_millis()),
        "detail-type": TASK_STATE_CHANGE,
        "source": TASK_EVENT_SOURCE,
        "account": env.account,
        "time": at.to_rfc3339_opts(SecondsFormat::Secs, true),
        "region": env.region,
        "resources": [task_arn],
        "detail": {
            "clusterArn": cluster_arn,
            "taskArn": task_arn,
            "taskDefinitionArn": env.task_definition_arn(family),
            "group": format!("family:{family}"),
            "launchType": "FARGATE",
            "lastStatus": STATUS_STOPPED,
            "desiredStatus": STATUS_STOPPED,
            "stopCode": "EssentialContainerExited",
            "stoppedReason": reason,
            "stoppedAt": at.to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    })
}
