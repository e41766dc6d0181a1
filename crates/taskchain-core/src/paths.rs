use crate::error::{Result, TaskchainError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TASKCHAIN_DIR: &str = ".taskchain";
pub const DEPLOYMENTS_DIR: &str = ".taskchain/deployments";
pub const CONFIG_FILE: &str = ".taskchain/config.yaml";

/// Default directory for synthesized templates, relative to the root.
pub const DEFAULT_OUT_DIR: &str = "taskchain.out";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn taskchain_dir(root: &Path) -> PathBuf {
    root.join(TASKCHAIN_DIR)
}

/// A stack is deployed once per account and region.
pub fn deployment_record(root: &Path, account: &str, region: &str, stack: &str) -> PathBuf {
    root.join(DEPLOYMENTS_DIR)
        .join(account)
        .join(region)
        .join(format!("{stack}.json"))
}

pub fn template_file(out_dir: &Path, stack: &str) -> PathBuf {
    out_dir.join(format!("{stack}.template.json"))
}

// ---------------------------------------------------------------------------
// Resource id validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").expect("static regex")
    })
}

pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !id_re().is_match(id) {
        return Err(TaskchainError::InvalidId(id.to_string()));
    }
    Ok(())
}
