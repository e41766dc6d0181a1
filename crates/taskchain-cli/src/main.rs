mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use cmd::EnvOverrides;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "taskchain",
    about = "Define, synthesize and deploy a chained ECS task pipeline",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .taskchain/ or .git/)
    #[arg(long, global = true, env = "TASKCHAIN_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Target account (overrides config)
    #[arg(long, global = true, env = "CDK_DEFAULT_ACCOUNT")]
    account: Option<String>,

    /// Target region (overrides config)
    #[arg(long, global = true, env = "CDK_DEFAULT_REGION")]
    region: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config into the current project
    Init,

    /// Render the stack template
    Synth {
        /// Directory the template is written to
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Print the template instead of writing it
        #[arg(long, conflicts_with = "output")]
        stdout: bool,
    },

    /// List the resources in the stack
    Ls,

    /// Compare the stack with what is deployed
    Diff {
        /// Exit non-zero when there are differences
        #[arg(long)]
        fail: bool,
    },

    /// Deploy the stack
    Deploy,

    /// Remove the deployed stack
    Destroy {
        /// Required; destroy does nothing without it
        #[arg(long)]
        force: bool,
    },

    /// Show upcoming fire times of scheduled rules
    Schedule {
        #[arg(long, default_value_t = 5)]
        count: usize,
    },

    /// Show which rules an event would trigger
    Simulate {
        /// JSON file holding the event
        #[arg(long, conflicts_with_all = ["stopped_cluster", "reason"])]
        event: Option<PathBuf>,
        /// Generate a "task stopped" event for this cluster name
        /// (default: the upstream cluster)
        #[arg(long)]
        stopped_cluster: Option<String>,
        /// Stop reason of the generated event (default: the configured one)
        #[arg(long)]
        reason: Option<String>,
    },

    /// Validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Deploy | Commands::Destroy { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let overrides = EnvOverrides {
        account: cli.account,
        region: cli.region,
    };

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Synth { output, stdout } => {
            cmd::synth::run(&root, &overrides, output.as_deref(), stdout, cli.json)
        }
        Commands::Ls => cmd::synth::list(&root, &overrides, cli.json),
        Commands::Diff { fail } => cmd::diff::run(&root, &overrides, fail, cli.json),
        Commands::Deploy => cmd::deploy::run(&root, &overrides, cli.json),
        Commands::Destroy { force } => cmd::deploy::destroy(&root, &overrides, force, cli.json),
        Commands::Schedule { count } => cmd::schedule::run(&root, &overrides, count, cli.json),
        Commands::Simulate {
            event,
            stopped_cluster,
            reason,
        } => {
            let source = match event {
                Some(path) => cmd::simulate::EventSource::File(path),
                None => cmd::simulate::EventSource::Stopped {
                    cluster: stopped_cluster,
                    reason,
                },
            };
            cmd::simulate::run(&root, &overrides, source, cli.json)
        }
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
