use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sharestack")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Bootstrap and run a multi-backend shared filesystem service", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: <config dir>/sharestack/sharestack.toml)
    #[arg(short, long, global = true, env = crate::paths::ENV_CONFIG)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the configuration artifact for the current settings
    Render,

    /// Show what provisioning would change, without changing anything
    Plan,

    /// Provision everything the service needs, in order
    Provision(ProvisionArgs),

    /// Start the enabled service processes
    Start(ServiceArgs),

    /// Stop the service processes
    Stop(ServiceArgs),

    /// Stop, then start the service processes
    Restart,

    /// Show the state of each service process
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ProvisionArgs {
    /// Don't ask before crossing into privileged steps
    #[arg(short, long)]
    pub yes: bool,

    /// Run only these stages (comma-separated: directories, network, keys,
    /// rootwrap, sudo, account, config, database)
    #[arg(long)]
    pub only: Option<String>,
}

#[derive(Parser)]
pub struct ServiceArgs {
    /// Service names (m-api, m-sch, m-shr, tls-proxy); all when omitted
    pub services: Vec<String>,
}
