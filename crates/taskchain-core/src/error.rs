use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskchainError {
    #[error("invalid id '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidId(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("{owner} references unknown {kind} '{target}'")]
    DanglingReference {
        owner: String,
        kind: &'static str,
        target: String,
    },

    #[error("duplicate task family: {0}")]
    DuplicateFamily(String),

    #[error("invalid task shape for '{task}': {reason}")]
    InvalidShape { task: String, reason: String },

    #[error("invalid handler '{handler}': {reason}")]
    InvalidHandler { handler: String, reason: String },

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("invalid CIDR block '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("invalid event pattern: {0}")]
    InvalidPattern(String),

    #[error("stack not deployed: {0}")]
    NotDeployed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskchainError>;
