use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use tracing::level_filters::LevelFilter;
use vaultkit_deploy::CONFIG_FILENAME;

#[derive(Parser)]
#[command(name = "vaultkit")]
#[command(
    author,
    version,
    about = "Deploy interdependent contracts in dependency order, idempotently"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "VAULTKIT_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to the pipeline configuration file, or to a directory containing `Vaultkit.toml`.
    #[arg(long, alias = "conf", env = "VAULTKIT_CONFIG", default_value = CONFIG_FILENAME, global = true)]
    pub config: PathBuf,

    /// Target network. Overrides the configuration file.
    #[arg(short, long, env = "VAULTKIT_NETWORK", global = true)]
    pub network: Option<String>,

    /// JSON-RPC endpoint of the target network. Overrides the configuration file.
    #[arg(long, alias = "rpc", env = "VAULTKIT_RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// A dotenv file with values for `env` arguments and private keys.
    ///
    /// Variables set in the process environment take precedence.
    #[arg(long, env = "VAULTKIT_ENV_FILE", global = true)]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy every unit without a record and run post-deploy actions.
    Deploy(DeployArgs),

    /// Print the order in which units would be deployed. Does not touch the chain.
    Plan {
        /// Only units matching these tags, and what they depend on.
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Show the deployment records of the network.
    Status,

    /// Print the ABI-encoded constructor arguments of a deployed unit.
    ///
    /// This is what block explorers ask for when verifying a contract.
    Args {
        /// Name of the unit.
        unit: String,
    },

    /// Generate shell completions.
    Completions {
        /// The shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// Only deploy units matching these tags, and what they depend on.
    #[arg(short, long, value_delimiter = ',', env = "VAULTKIT_TAGS")]
    pub tags: Vec<String>,

    /// Redeploy every scheduled unit, even those with a record.
    #[arg(long, env = "VAULTKIT_FORCE", conflicts_with = "force_unit")]
    pub force: bool,

    /// Redeploy only the named units. May be repeated.
    #[arg(long, value_delimiter = ',')]
    pub force_unit: Vec<String>,

    /// Print the run report as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}
