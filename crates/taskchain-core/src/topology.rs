//! Provider-agnostic description of the pipeline topology.
//!
//! Every record is plain data. Records point at each other through
//! [`ResourceId`]s; the synthesizer resolves those into provider references.

use crate::config::Config;
use crate::error::{Result, TaskchainError};
use crate::network::{Ipv4Cidr, Network};
use crate::paths;
use crate::schedule::CronSchedule;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Event source of the container execution fabric.
pub const TASK_EVENT_SOURCE: &str = "aws.ecs";
pub const TASK_STATE_CHANGE: &str = "ECS Task State Change";
pub const STATUS_STOPPED: &str = "STOPPED";

/// Longest run the function provider allows.
pub const MAX_HANDLER_TIMEOUT_SECONDS: u32 = 900;

const DEBUG_RULE_NAME: &str = "rule-ecs-task-pipeline-launch-lambda";

// ---------------------------------------------------------------------------
// ResourceId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        paths::validate_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = TaskchainError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ResourceId,
    pub name: String,
    pub network: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSink {
    pub id: ResourceId,
    pub group_name: String,
    pub stream_prefix: String,
    pub removal_policy: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub memory_mib: u32,
    pub essential: bool,
    pub log_sink: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: ResourceId,
    pub family: String,
    pub cpu: u32,
    pub memory_mib: u32,
    pub container: ContainerSpec,
}

impl TaskDefinition {
    /// Everything except identity: cpu, task memory, container memory.
    pub fn shape(&self) -> (u32, u32, u32) {
        (self.cpu, self.memory_mib, self.container.memory_mib)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFunction {
    pub id: ResourceId,
    pub function_name: String,
    pub entry: String,
    pub handler: String,
    pub runtime: String,
    pub timeout_seconds: u32,
    pub network: ResourceId,
}

/// "A task in `cluster` stopped because `stopped_reason`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPredicate {
    pub id: ResourceId,
    pub source: String,
    pub detail_type: String,
    pub last_status: String,
    pub cluster: ResourceId,
    pub stopped_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleTarget {
    InvokeHandler {
        handler: ResourceId,
    },
    RunTask {
        cluster: ResourceId,
        task: ResourceId,
        count: u32,
    },
}

impl fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleTarget::InvokeHandler { handler } => write!(f, "invoke {handler}"),
            RuleTarget::RunTask {
                cluster,
                task,
                count,
            } => write!(f, "run {task} x{count} in {cluster}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: ResourceId,
    /// `None` lets the provider generate a name.
    pub name: Option<String>,
    pub schedule: CronSchedule,
    pub target: RuleTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRule {
    pub id: ResourceId,
    pub name: Option<String>,
    pub predicate: ResourceId,
    pub targets: Vec<RuleTarget>,
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub stack_name: String,
    pub description: Option<String>,
    pub network: Network,
    pub clusters: Vec<Cluster>,
    pub log_sinks: Vec<LogSink>,
    pub tasks: Vec<TaskDefinition>,
    pub handlers: Vec<HandlerFunction>,
    pub predicates: Vec<EventPredicate>,
    pub schedules: Vec<ScheduleRule>,
    pub event_rules: Vec<EventRule>,
}

fn id(text: String) -> Result<ResourceId> {
    ResourceId::new(text)
}

impl Topology {
    /// The example topology: default configuration, no parameters.
    pub fn example() -> Result<Self> {
        Self::define(&Config::default())
    }

    /// Wire the network, clusters, tasks, handler and rules described by `cfg`.
    pub fn define(cfg: &Config) -> Result<Self> {
        let pipeline = &cfg.pipeline;
        let up = pipeline.upstream.as_str();
        let down = pipeline.downstream.as_str();
        tracing::debug!(stack = %cfg.stack.name, upstream = up, downstream = down, "defining topology");

        let network = Network {
            id: id("vpc".to_string())?,
            cidr: Ipv4Cidr::parse(&cfg.network.cidr)?,
            max_azs: cfg.network.max_azs,
            enable_dns_hostnames: cfg.network.enable_dns_hostnames,
            enable_dns_support: cfg.network.enable_dns_support,
        };

        let mut clusters = Vec::new();
        let mut log_sinks = Vec::new();
        let mut tasks = Vec::new();
        for name in [up, down] {
            clusters.push(Cluster {
                id: id(format!("{name}-cluster"))?,
                name: format!("{name}-cluster"),
                network: network.id.clone(),
            });
            let (sink, task) = Self::task_with_log_sink(cfg, name)?;
            log_sinks.push(sink);
            tasks.push(task);
        }

        let handler = HandlerFunction {
            id: id("debug-handler".to_string())?,
            function_name: cfg.debug_handler.function_name.clone(),
            entry: cfg.debug_handler.entry.clone(),
            handler: cfg.debug_handler.handler.clone(),
            runtime: cfg.debug_handler.runtime.clone(),
            timeout_seconds: cfg.debug_handler.timeout_seconds,
            network: network.id.clone(),
        };

        let predicate = EventPredicate {
            id: id(format!("{up}-stopped"))?,
            source: TASK_EVENT_SOURCE.to_string(),
            detail_type: TASK_STATE_CHANGE.to_string(),
            last_status: STATUS_STOPPED.to_string(),
            cluster: clusters[0].id.clone(),
            stopped_reason: pipeline.stopped_reason.clone(),
        };

        let schedule = ScheduleRule {
            id: id(format!("{up}-schedule"))?,
            name: None,
            schedule: CronSchedule::from_options(&pipeline.schedule)?,
            target: RuleTarget::RunTask {
                cluster: clusters[0].id.clone(),
                task: tasks[0].id.clone(),
                count: pipeline.desired_count,
            },
        };

        let event_rules = vec![
            EventRule {
                id: id("launch-debug-handler".to_string())?,
                name: Some(DEBUG_RULE_NAME.to_string()),
                predicate: predicate.id.clone(),
                targets: vec![RuleTarget::InvokeHandler {
                    handler: handler.id.clone(),
                }],
            },
            EventRule {
                id: id(format!("launch-{down}"))?,
                name: Some(format!("rule-launch-{down}")),
                predicate: predicate.id.clone(),
                targets: vec![RuleTarget::RunTask {
                    cluster: clusters[1].id.clone(),
                    task: tasks[1].id.clone(),
                    count: 1,
                }],
            },
        ];

        let topology = Topology {
            stack_name: cfg.stack.name.clone(),
            description: cfg.stack.description.clone(),
            network,
            clusters,
            log_sinks,
            tasks,
            handlers: vec![handler],
            predicates: vec![predicate],
            schedules: vec![schedule],
            event_rules,
        };
        topology.validate()?;
        Ok(topology)
    }

    fn task_with_log_sink(cfg: &Config, name: &str) -> Result<(LogSink, TaskDefinition)> {
        let sink = LogSink {
            id: id(format!("{name}-log-group"))?,
            group_name: name.to_string(),
            stream_prefix: name.to_string(),
            removal_policy: RemovalPolicy::Destroy,
        };
        let shape = &cfg.pipeline.shape;
        let task = TaskDefinition {
            id: id(format!("{name}-taskdef"))?,
            family: format!("{name}-taskdef"),
            cpu: shape.cpu,
            memory_mib: shape.memory_mib,
            container: ContainerSpec {
                name: format!("{name}-container"),
                image: cfg.pipeline.image.clone(),
                memory_mib: shape.container_memory_mib,
                essential: true,
                log_sink: sink.id.clone(),
            },
        };
        Ok((sink, task))
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn cluster(&self, id: &ResourceId) -> Option<&Cluster> {
        self.clusters.iter().find(|c| &c.id == id)
    }

    pub fn task(&self, id: &ResourceId) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn log_sink(&self, id: &ResourceId) -> Option<&LogSink> {
        self.log_sinks.iter().find(|s| &s.id == id)
    }

    pub fn handler(&self, id: &ResourceId) -> Option<&HandlerFunction> {
        self.handlers.iter().find(|h| &h.id == id)
    }

    pub fn predicate(&self, id: &ResourceId) -> Option<&EventPredicate> {
        self.predicates.iter().find(|p| &p.id == id)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let ids = std::iter::once(&self.network.id)
            .chain(self.clusters.iter().map(|c| &c.id))
            .chain(self.log_sinks.iter().map(|s| &s.id))
            .chain(self.tasks.iter().map(|t| &t.id))
            .chain(self.handlers.iter().map(|h| &h.id))
            .chain(self.predicates.iter().map(|p| &p.id))
            .chain(self.schedules.iter().map(|s| &s.id))
            .chain(self.event_rules.iter().map(|r| &r.id));
        for id in ids {
            if !seen.insert(id) {
                return Err(TaskchainError::DuplicateId(id.to_string()));
            }
        }

        self.network.subnets()?;

        for cluster in &self.clusters {
            self.expect_network(&cluster.id, &cluster.network)?;
        }
        for handler in &self.handlers {
            self.expect_network(&handler.id, &handler.network)?;
            if !(1..=MAX_HANDLER_TIMEOUT_SECONDS).contains(&handler.timeout_seconds) {
                return Err(TaskchainError::InvalidHandler {
                    handler: handler.id.to_string(),
                    reason: format!(
                        "timeout {}s must be between 1 and {MAX_HANDLER_TIMEOUT_SECONDS}s",
                        handler.timeout_seconds
                    ),
                });
            }
        }

        let mut families = HashSet::new();
        for task in &self.tasks {
            if !families.insert(task.family.as_str()) {
                return Err(TaskchainError::DuplicateFamily(task.family.clone()));
            }
            validate_shape(task)?;
            if self.log_sink(&task.container.log_sink).is_none() {
                return Err(dangling(&task.id, "log sink", &task.container.log_sink));
            }
        }

        for predicate in &self.predicates {
            if self.cluster(&predicate.cluster).is_none() {
                return Err(dangling(&predicate.id, "cluster", &predicate.cluster));
            }
        }

        for rule in &self.schedules {
            self.check_target(&rule.id, &rule.target)?;
        }
        for rule in &self.event_rules {
            if self.predicate(&rule.predicate).is_none() {
                return Err(dangling(&rule.id, "predicate", &rule.predicate));
            }
            for target in &rule.targets {
                self.check_target(&rule.id, target)?;
            }
        }
        Ok(())
    }

    fn expect_network(&self, owner: &ResourceId, network: &ResourceId) -> Result<()> {
        if network != &self.network.id {
            return Err(dangling(owner, "network", network));
        }
        Ok(())
    }

    fn check_target(&self, owner: &ResourceId, target: &RuleTarget) -> Result<()> {
        match target {
            RuleTarget::InvokeHandler { handler } => {
                if self.handler(handler).is_none() {
                    return Err(dangling(owner, "handler", handler));
                }
            }
            RuleTarget::RunTask {
                cluster,
                task,
                count,
            } => {
                if self.cluster(cluster).is_none() {
                    return Err(dangling(owner, "cluster", cluster));
                }
                if self.task(task).is_none() {
                    return Err(dangling(owner, "task", task));
                }
                if *count == 0 {
                    return Err(TaskchainError::InvalidShape {
                        task: task.to_string(),
                        reason: format!("{owner} launches zero tasks"),
                    });
                }
            }
        }
        Ok(())
    }
}

fn dangling(owner: &ResourceId, kind: &'static str, target: &ResourceId) -> TaskchainError {
    TaskchainError::DanglingReference {
        owner: owner.to_string(),
        kind,
        target: target.to_string(),
    }
}

/// Fargate only accepts specific cpu/memory pairs.
fn validate_shape(task: &TaskDefinition) -> Result<()> {
    let invalid = |reason: String| TaskchainError::InvalidShape {
        task: task.id.to_string(),
        reason,
    };
    let mem = task.memory_mib;
    let ok = match task.cpu {
        256 => matches!(mem, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&mem) && mem % 1024 == 0,
        1024 => (2048..=8192).contains(&mem) && mem % 1024 == 0,
        2048 => (4096..=16384).contains(&mem) && mem % 1024 == 0,
        4096 => (8192..=30720).contains(&mem) && mem % 1024 == 0,
        _ => false,
    };
    if !ok {
        return Err(invalid(format!(
            "cpu {} with {mem} MiB is not a supported combination",
            task.cpu
        )));
    }
    if task.container.memory_mib == 0 || task.container.memory_mib > mem {
        return Err(invalid(format!(
            "container memory {} MiB must be between 1 and {mem}",
            task.container.memory_mib
        )));
    }
    if task.container.image.trim().is_empty() {
        return Err(invalid("container image is empty".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::CronField;

    #[test]
    fn definition_is_deterministic() {
        assert_eq!(Topology::example().unwrap(), Topology::example().unwrap());
    }

    #[test]
    fn tasks_differ_in_identity_not_shape() {
        let t = Topology::example().unwrap();
        let (a, b) = (&t.tasks[0], &t.tasks[1]);
        assert_ne!(a.id, b.id);
        assert_ne!(a.family, b.family);
        assert_ne!(a.container.name, b.container.name);
        assert_eq!(a.shape(), b.shape());
        assert_eq!(a.shape(), (256, 1024, 256));
        assert_eq!(a.container.image, "otajisan/spring-batch-kotlin-example");
        assert_eq!(a.family, "ecs-task-a-taskdef");
        assert_eq!(b.family, "ecs-task-b-taskdef");
    }

    #[test]
    fn both_event_rules_share_one_predicate() {
        let t = Topology::example().unwrap();
        assert_eq!(t.event_rules.len(), 2);
        assert_eq!(t.predicates.len(), 1);
        assert_eq!(t.event_rules[0].predicate, t.event_rules[1].predicate);

        let p = t.predicate(&t.event_rules[0].predicate).unwrap();
        assert_eq!(p.last_status, "STOPPED");
        assert_eq!(p.stopped_reason, "Essential container in task exited");
        assert_eq!(t.cluster(&p.cluster).unwrap().name, "ecs-task-a-cluster");
    }

    #[test]
    fn event_rules_fan_out_to_handler_and_downstream_task() {
        let t = Topology::example().unwrap();
        assert_eq!(
            t.event_rules[0].targets,
            vec![RuleTarget::InvokeHandler {
                handler: ResourceId::new("debug-handler").unwrap()
            }]
        );
        assert_eq!(
            t.event_rules[1].targets,
            vec![RuleTarget::RunTask {
                cluster: ResourceId::new("ecs-task-b-cluster").unwrap(),
                task: ResourceId::new("ecs-task-b-taskdef").unwrap(),
                count: 1,
            }]
        );
        assert_eq!(t.event_rules[1].name.as_deref(), Some("rule-launch-ecs-task-b"));
    }

    #[test]
    fn schedule_launches_upstream_every_ten_minutes() {
        let t = Topology::example().unwrap();
        let rule = &t.schedules[0];
        assert_eq!(rule.schedule.minute, CronField::Step { start: 0, step: 10 });
        assert_eq!(rule.schedule.hour, CronField::Any);
        assert_eq!(rule.schedule.year, CronField::Any);
        assert!(matches!(
            &rule.target,
            RuleTarget::RunTask { task, count: 1, .. } if task.as_str() == "ecs-task-a-taskdef"
        ));
    }

    #[test]
    fn same_upstream_and_downstream_rejected() {
        let mut cfg = Config::default();
        cfg.pipeline.downstream = cfg.pipeline.upstream.clone();
        assert!(matches!(
            Topology::define(&cfg),
            Err(TaskchainError::DuplicateId(_))
        ));
    }

    #[test]
    fn unsupported_shape_rejected() {
        let mut cfg = Config::default();
        cfg.pipeline.shape.memory_mib = 4096;
        assert!(matches!(
            Topology::define(&cfg),
            Err(TaskchainError::InvalidShape { .. })
        ));
    }

    #[test]
    fn handler_timeout_over_limit_rejected() {
        let mut cfg = Config::default();
        cfg.debug_handler.timeout_seconds = 901;
        assert!(matches!(
            Topology::define(&cfg),
            Err(TaskchainError::InvalidHandler { .. })
        ));
        cfg.debug_handler.timeout_seconds = 900;
        assert!(Topology::define(&cfg).is_ok());
    }

    #[test]
    fn too_many_zones_rejected() {
        let mut cfg = Config::default();
        cfg.network.cidr = "10.0.0.0/8".to_string();
        cfg.network.max_azs = 200;
        assert!(matches!(
            Topology::define(&cfg),
            Err(TaskchainError::InvalidCidr { .. })
        ));
    }

    #[test]
    fn dangling_reference_detected() {
        let mut t = Topology::example().unwrap();
        t.event_rules[1].predicate = ResourceId::new("nope").unwrap();
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("unknown predicate 'nope'"));
    }

    #[test]
    fn resource_id_rejects_bad_names() {
        assert!(ResourceId::new("Task_A").is_err());
        assert!(serde_json::from_str::<ResourceId>("\"ok-id\"").is_ok());
        assert!(serde_json::from_str::<ResourceId>("\"Bad Id\"").is_err());
    }
}
