//! Reconciling synthesized templates against what was last deployed.
//!
//! The real provisioning engine is external. [`LocalProvisioner`] stands in
//! for it by recording the deployed template under
//! `.taskchain/deployments/<account>/<region>/`, which is enough for `diff`,
//! `deploy` and `destroy` to compute change sets. The same stack in another
//! account or region is a separate deployment.

use crate::diff::{diff, TemplateDiff};
use crate::error::{Result, TaskchainError};
use crate::paths;
use crate::synth::{Environment, Template};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub stack: String,
    pub environment: Environment,
    pub deployed_at: DateTime<Utc>,
    pub template: Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub stack: String,
    pub diff: TemplateDiff,
    /// False when there was nothing to do.
    pub applied: bool,
}

pub trait Provisioner {
    fn current(&self, stack: &str, env: &Environment) -> Result<Option<Deployment>>;

    fn deploy(&self, stack: &str, env: &Environment, template: &Template) -> Result<ChangeSet>;

    fn destroy(&self, stack: &str, env: &Environment) -> Result<ChangeSet>;

    /// Changes `deploy` would make, without making them.
    fn plan(&self, stack: &str, env: &Environment, template: &Template) -> Result<TemplateDiff> {
        let current = self
            .current(stack, env)?
            .map(|d| d.template)
            .unwrap_or_else(Template::empty);
        Ok(diff(&current, template))
    }
}

pub struct LocalProvisioner {
    root: PathBuf,
}

impl LocalProvisioner {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn record_path(&self, stack: &str, env: &Environment) -> PathBuf {
        paths::deployment_record(&self.root, &env.account, &env.region, stack)
    }
}

impl Provisioner for LocalProvisioner {
    fn current(&self, stack: &str, env: &Environment) -> Result<Option<Deployment>> {
        let path = self.record_path(stack, env);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn deploy(&self, stack: &str, env: &Environment, template: &Template) -> Result<ChangeSet> {
        let diff = self.plan(stack, env, template)?;
        if diff.is_empty() {
            tracing::info!(stack, account = %env.account, region = %env.region, "no changes");
            return Ok(ChangeSet {
                stack: stack.to_string(),
                diff,
                applied: false,
            });
        }

        let record = Deployment {
            stack: stack.to_string(),
            environment: env.clone(),
            deployed_at: Utc::now(),
            template: template.clone(),
        };
        let data = serde_json::to_string_pretty(&record)?;
        crate::io::atomic_write(&self.record_path(stack, env), data.as_bytes())?;
        tracing::info!(
            stack,
            account = %env.account,
            region = %env.region,
            changes = diff.resources.len(),
            "deployed"
        );
        Ok(ChangeSet {
            stack: stack.to_string(),
            diff,
            applied: true,
        })
    }

    fn destroy(&self, stack: &str, env: &Environment) -> Result<ChangeSet> {
        let current = self.current(stack, env)?.ok_or_else(|| {
            TaskchainError::NotDeployed(format!("{stack} in {}/{}", env.account, env.region))
        })?;
        let diff = diff(&current.template, &Template::empty());
        crate::io::remove_if_exists(&self.record_path(stack, env))?;
        tracing::info!(stack, removed = diff.resources.len(), "destroyed");
        Ok(ChangeSet {
            stack: stack.to_string(),
            diff,
            applied: true,
        })
    }
}
