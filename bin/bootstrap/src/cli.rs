use std::path::PathBuf;

use anyhow::{Context, Result};
use bootstrap_deploy::{
    BOOTSTRAP_CONF_FILENAME, BootstrapConfig, ContractId, NetworkTarget, PipelineState,
};
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tracing::level_filters::LevelFilter;

/// Prefix of environment variables overriding `Bootstrap.toml` entries.
/// Nested keys use `__`, e.g. `BOOTSTRAP_PROTOCOL__ORACLE_MAX_STALE=60`.
const ENV_PREFIX: &str = "BOOTSTRAP_";

#[derive(Parser)]
#[command(name = "bootstrap")]
#[command(
    author,
    version,
    about = "Deploy the protocol contract, grant its admin and apply the initial protocol config"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "BOOTSTRAP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a configuration file, or a directory containing `Bootstrap.toml`.
    ///
    /// If not provided, `./Bootstrap.toml` is used when present.
    #[arg(short, long, env = "BOOTSTRAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// The network to bootstrap against: `testnet`, `local` or a GraphQL endpoint URL.
    #[arg(short, long)]
    pub network: Option<NetworkTarget>,

    /// Where progress is persisted between runs. Not used with `--network local`.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Seconds to wait for each transaction to be committed.
    #[arg(long, value_name = "SECS")]
    pub finality_timeout: Option<u64>,

    /// Path to the compiled contract bytecode.
    #[arg(long)]
    pub bytecode: Option<PathBuf>,

    /// Path to the contract ABI.
    #[arg(long)]
    pub abi: Option<PathBuf>,

    /// Deploy a new contract even if a checkpoint exists.
    #[arg(long, default_value_t = false, conflicts_with = "contract_id")]
    pub redeploy: bool,

    /// Continue against an already deployed contract instead of deploying.
    #[arg(long)]
    pub contract_id: Option<ContractId>,

    /// Last stage already completed on `--contract-id`.
    #[arg(long, requires = "contract_id", default_value_t = PipelineState::Deployed)]
    pub resume_state: PipelineState,

    /// Refuse one recovery phrase backing several roles.
    #[arg(long)]
    pub strict_roles: bool,

    /// Resolve identities, load the artifact and check the network without sending transactions.
    #[arg(long)]
    pub check: bool,

    /// Write the effective configuration to this file before running.
    #[arg(long)]
    pub save_config: Option<PathBuf>,
}

impl Cli {
    /// Configuration file to read, if any.
    ///
    /// An explicit `--config` must exist, either as a file or as a directory
    /// holding `Bootstrap.toml`. Without it, `./Bootstrap.toml` is optional.
    fn config_file(&self) -> Result<Option<PathBuf>> {
        let Some(path) = &self.config else {
            let default = PathBuf::from(BOOTSTRAP_CONF_FILENAME);
            return Ok(default.is_file().then_some(default));
        };

        let file = if path.is_dir() {
            path.join(BOOTSTRAP_CONF_FILENAME)
        } else {
            path.clone()
        };
        if !file.is_file() {
            anyhow::bail!("Configuration file not found: {}", file.display());
        }
        Ok(Some(file))
    }

    /// Build the effective configuration.
    ///
    /// Sources, later overriding earlier:
    /// 1. Default values
    /// 2. The configuration file (`--config`, else `./Bootstrap.toml` if present)
    /// 3. Environment variables with the `BOOTSTRAP_` prefix
    /// 4. Command line flags
    pub fn config(&self) -> Result<BootstrapConfig> {
        let file = self.config_file()?;

        let mut figment = Figment::from(Serialized::defaults(BootstrapConfig::default()));
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(file));
        }

        let mut config: BootstrapConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load configuration")?;

        if let Some(network) = &self.network {
            config.network = network.clone();
        }
        if let Some(checkpoint) = &self.checkpoint {
            config.checkpoint = checkpoint.clone();
        }
        if let Some(finality_timeout) = self.finality_timeout {
            config.finality_timeout_secs = finality_timeout;
        }
        if let Some(bytecode) = &self.bytecode {
            config.artifacts.bytecode = bytecode.clone();
        }
        if let Some(abi) = &self.abi {
            config.artifacts.abi = abi.clone();
        }
        config.strict_roles |= self.strict_roles;

        Ok(config)
    }
}
