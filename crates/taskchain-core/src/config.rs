use crate::error::Result;
use crate::paths;
use crate::schedule::{CronOptions, CronSchedule};
use crate::topology::{Topology, MAX_HANDLER_TIMEOUT_SECONDS};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StackConfig / EnvironmentConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default = "default_stack_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_stack_name() -> String {
    "AwsEcsTaskPipelineExampleStack".to_string()
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
            description: None,
        }
    }
}

/// Target account and region. Only used to resolve provider references
/// (ARNs, availability zones); nothing is contacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_account")]
    pub account: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_account() -> String {
    "123456789012".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            account: default_account(),
            region: default_region(),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_cidr")]
    pub cidr: String,
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,
    #[serde(default = "default_true")]
    pub enable_dns_hostnames: bool,
    #[serde(default = "default_true")]
    pub enable_dns_support: bool,
}

fn default_cidr() -> String {
    "10.0.0.0/16".to_string()
}

fn default_max_azs() -> u8 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: default_cidr(),
            max_azs: default_max_azs(),
            enable_dns_hostnames: true,
            enable_dns_support: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskShape {
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory")]
    pub memory_mib: u32,
    #[serde(default = "default_container_memory")]
    pub container_memory_mib: u32,
}

fn default_cpu() -> u32 {
    256
}

fn default_memory() -> u32 {
    1024
}

fn default_container_memory() -> u32 {
    256
}

impl Default for TaskShape {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory_mib: default_memory(),
            container_memory_mib: default_container_memory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_image")]
    pub image: String,
    /// Task launched on the schedule.
    #[serde(default = "default_upstream")]
    pub upstream: String,
    /// Task launched when the upstream task's essential container exits.
    #[serde(default = "default_downstream")]
    pub downstream: String,
    #[serde(default)]
    pub shape: TaskShape,
    #[serde(default = "CronOptions::every_ten_minutes")]
    pub schedule: CronOptions,
    #[serde(default = "default_stopped_reason")]
    pub stopped_reason: String,
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
}

fn default_image() -> String {
    "otajisan/spring-batch-kotlin-example".to_string()
}

fn default_upstream() -> String {
    "ecs-task-a".to_string()
}

fn default_downstream() -> String {
    "ecs-task-b".to_string()
}

fn default_stopped_reason() -> String {
    "Essential container in task exited".to_string()
}

fn default_desired_count() -> u32 {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            upstream: default_upstream(),
            downstream: default_downstream(),
            shape: TaskShape::default(),
            schedule: CronOptions::every_ten_minutes(),
            stopped_reason: default_stopped_reason(),
            desired_count: default_desired_count(),
        }
    }
}

// ---------------------------------------------------------------------------
// DebugHandlerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugHandlerConfig {
    #[serde(default = "default_function_name")]
    pub function_name: String,
    /// Directory holding the handler's source, relative to the root.
    #[serde(default = "default_entry")]
    pub entry: String,
    #[serde(default = "default_handler")]
    pub handler: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
}

fn default_function_name() -> String {
    "EcsTaskPipelineExampleDebugLambda".to_string()
}

fn default_entry() -> String {
    "lambda/ecs-task-pipeline".to_string()
}

fn default_handler() -> String {
    "lambda_handler".to_string()
}

fn default_runtime() -> String {
    "python3.8".to_string()
}

fn default_timeout() -> u32 {
    30
}

impl Default for DebugHandlerConfig {
    fn default() -> Self {
        Self {
            function_name: default_function_name(),
            entry: default_entry(),
            handler: default_handler(),
            runtime: default_runtime(),
            timeout_seconds: default_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub debug_handler: DebugHandlerConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            stack: StackConfig::default(),
            environment: EnvironmentConfig::default(),
            network: NetworkConfig::default(),
            pipeline: PipelineConfig::default(),
            debug_handler: DebugHandlerConfig::default(),
        }
    }
}

impl Config {
    pub fn exists(root: &Path) -> bool {
        paths::config_path(root).exists()
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load the config if `init` has been run, otherwise use the defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        if Self::exists(root) {
            Self::load(root)
        } else {
            tracing::debug!("no config at {}, using defaults", root.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        let pipeline = &self.pipeline;
        if pipeline.upstream == pipeline.downstream {
            error(format!(
                "pipeline.upstream and pipeline.downstream are both '{}'",
                pipeline.upstream
            ));
        }
        for (field, name) in [
            ("pipeline.upstream", &pipeline.upstream),
            ("pipeline.downstream", &pipeline.downstream),
        ] {
            if crate::paths::validate_id(name).is_err() {
                error(format!("{field} '{name}' is not a valid resource name"));
            }
        }
        if pipeline.image.trim().is_empty() {
            error("pipeline.image is empty".to_string());
        }
        if pipeline.shape.container_memory_mib > pipeline.shape.memory_mib {
            error(format!(
                "container memory {} MiB exceeds task memory {} MiB",
                pipeline.shape.container_memory_mib, pipeline.shape.memory_mib
            ));
        }

        let schedule = CronSchedule::from_options(&pipeline.schedule);
        if let Err(e) = &schedule {
            error(format!("pipeline.schedule: {e}"));
        }
        if crate::network::Ipv4Cidr::parse(&self.network.cidr).is_err() {
            error(format!("network.cidr '{}' is not a valid CIDR block", self.network.cidr));
        }
        if self.network.max_azs == 0 || self.network.max_azs > crate::network::MAX_AZS {
            error(format!(
                "network.max_azs={} must be between 1 and {}",
                self.network.max_azs,
                crate::network::MAX_AZS
            ));
        }
        if self.debug_handler.timeout_seconds == 0
            || self.debug_handler.timeout_seconds > MAX_HANDLER_TIMEOUT_SECONDS
        {
            error(format!(
                "debug_handler.timeout_seconds={} must be between 1 and {MAX_HANDLER_TIMEOUT_SECONDS}",
                self.debug_handler.timeout_seconds
            ));
        }
        if let Ok(s) = &schedule {
            if let Err(e) = s.next_fires(Utc::now(), 1) {
                error(format!("pipeline.schedule cannot be evaluated: {e}"));
            }
        }

        // Anything the checks above miss still surfaces here, e.g. a cpu and
        // memory pairing Fargate does not offer.
        if warnings.is_empty() {
            if let Err(e) = Topology::define(self) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: e.to_string(),
                });
            }
        }

        if let Ok(s) = &schedule {
            if s.fires_every_minute() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "schedule {} launches '{}' every minute",
                        s.expression(),
                        pipeline.upstream
                    ),
                });
            }
        }
        if pipeline.desired_count > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "pipeline.desired_count={} (>10 is unusual for a batch task)",
                    pipeline.desired_count
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_yaml_yields_example_values() {
        let cfg: Config = serde_yaml::from_str("version: 1\n").unwrap();
        assert_eq!(cfg.stack.name, "AwsEcsTaskPipelineExampleStack");
        assert_eq!(cfg.network.cidr, "10.0.0.0/16");
        assert_eq!(cfg.network.max_azs, 2);
        assert_eq!(cfg.pipeline.upstream, "ecs-task-a");
        assert_eq!(cfg.pipeline.downstream, "ecs-task-b");
        assert_eq!(cfg.pipeline.shape, TaskShape::default());
        assert_eq!(cfg.pipeline.schedule, CronOptions::every_ten_minutes());
        assert_eq!(cfg.debug_handler.timeout_seconds, 30);
    }

    #[test]
    fn partial_pipeline_section_keeps_other_defaults() {
        let yaml = "pipeline:\n  image: acme/batch:1.2\n  shape:\n    cpu: 512\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.pipeline.image, "acme/batch:1.2");
        assert_eq!(cfg.pipeline.shape.cpu, 512);
        assert_eq!(cfg.pipeline.shape.memory_mib, 1024);
        assert_eq!(cfg.pipeline.upstream, "ecs-task-a");
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.version, 1);
        cfg.environment.region = "eu-west-1".to_string();
        cfg.save(dir.path()).unwrap();
        assert!(Config::exists(dir.path()));
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.environment.region, "eu-west-1");
    }

    #[test]
    fn description_not_serialized_when_absent() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(!yaml.contains("description"));
    }

    #[test]
    fn validate_default_config_no_warnings() {
        let cfg = Config::load_or_default(Path::new("/nonexistent")).unwrap();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_same_task_names() {
        let mut cfg = Config::default();
        cfg.pipeline.downstream = cfg.pipeline.upstream.clone();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("are both")));
    }

    #[test]
    fn validate_container_larger_than_task() {
        let mut cfg = Config::default();
        cfg.pipeline.shape.container_memory_mib = 2048;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("exceeds task memory")));
    }

    #[test]
    fn validate_bad_schedule_and_cidr() {
        let mut cfg = Config::default();
        cfg.pipeline.schedule.minute = Some("61".to_string());
        cfg.network.cidr = "10.0.0.0/33".to_string();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.starts_with("pipeline.schedule")));
        assert!(warnings.iter().any(|w| w.message.contains("network.cidr")));
    }

    #[test]
    fn validate_bounds_zone_count() {
        let mut cfg = Config::default();
        cfg.network.cidr = "10.0.0.0/8".to_string();
        cfg.network.max_azs = 200;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("network.max_azs")));
    }

    #[test]
    fn validate_rejects_unsupported_fargate_shape() {
        let mut cfg = Config::default();
        cfg.pipeline.shape.memory_mib = 4096;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
        assert!(warnings[0].message.contains("not a supported combination"));
    }

    #[test]
    fn validate_rejects_long_handler_timeout() {
        let mut cfg = Config::default();
        cfg.debug_handler.timeout_seconds = 901;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("timeout_seconds")));
    }

    #[test]
    fn validate_rejects_year_beyond_evaluator() {
        let mut cfg = Config::default();
        cfg.pipeline.schedule.year = Some("2150".to_string());
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.starts_with("pipeline.schedule")));
    }

    #[test]
    fn validate_every_minute_is_only_a_warning() {
        let mut cfg = Config::default();
        cfg.pipeline.schedule.minute = Some("*".to_string());
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
        assert!(warnings[0].message.contains("every minute"));
    }
}
