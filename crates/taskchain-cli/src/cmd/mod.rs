pub mod config;
pub mod deploy;
pub mod diff;
pub mod init;
pub mod schedule;
pub mod simulate;
pub mod synth;

use anyhow::Context;
use std::path::Path;
use taskchain_core::config::Config;
use taskchain_core::synth::{CloudFormation, Environment, Synthesizer, Template};
use taskchain_core::topology::Topology;

/// Account / region given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub account: Option<String>,
    pub region: Option<String>,
}

/// Everything a command needs: the config, the topology it defines, and the
/// environment it targets.
pub struct Stack {
    pub config: Config,
    pub topology: Topology,
    pub env: Environment,
}

impl Stack {
    pub fn load(root: &Path, overrides: &EnvOverrides) -> anyhow::Result<Self> {
        let mut config = Config::load_or_default(root).context("failed to load config")?;
        if let Some(account) = &overrides.account {
            config.environment.account = account.clone();
        }
        if let Some(region) = &overrides.region {
            config.environment.region = region.clone();
        }
        let topology = Topology::define(&config).context("invalid topology")?;
        let env = Environment::from_config(&config);
        Ok(Self {
            config,
            topology,
            env,
        })
    }

    pub fn name(&self) -> &str {
        &self.topology.stack_name
    }

    pub fn synthesize(&self) -> anyhow::Result<Template> {
        CloudFormation::new(self.env.clone())
            .synthesize(&self.topology)
            .context("synthesis failed")
    }
}
