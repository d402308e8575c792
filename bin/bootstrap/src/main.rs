//! bootstrap deploys the protocol contract on Fuel and brings it to a usable state:
//! owner bound at deploy time, admin registered, protocol configuration applied.

mod cli;
mod summary;

use std::{process::ExitCode, time::Duration};

use anyhow::Result;
use bootstrap_deploy::{
    BootstrapConfig, Bootstrapper, ContractArtifact, DeployError, GraphQlClient, IdentityResolver,
    LocalChain, NetworkClient, NetworkTarget, Role, RoleSecrets,
};
use clap::Parser;

use cli::Cli;

/// How long the pre-flight check waits for the node to answer.
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load `.env` first so env-backed flags and role secrets can come from it.
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let config = cli.config()?;

    if let Some(path) = &cli.save_config {
        config.save_to_file(path)?;
    }

    tracing::info!(
        network = %config.network,
        bytecode = %config.artifacts.bytecode.display(),
        abi = %config.artifacts.abi.display(),
        checkpoint = ?config.checkpoint_path(),
        "Bootstrapping protocol contract..."
    );

    let resolver = IdentityResolver::new(RoleSecrets::from_env())
        .derivation_path(config.derivation_path.clone())
        .strict_roles(config.strict_roles);

    let code = match &config.network {
        NetworkTarget::Local => {
            let chain = LocalChain::new().with_finality_timeout(config.finality_timeout());
            run(&cli, &config, resolver, &chain).await
        }
        NetworkTarget::Remote(url) => {
            let graphql = GraphQlClient::new(url.clone())?;
            if let Err(error) = graphql.wait_until_ready(PREFLIGHT_TIMEOUT).await {
                return Ok(halt(error));
            }
            run_remote(&cli, &config, resolver, url).await
        }
    };

    Ok(code)
}

#[cfg(feature = "fuel")]
async fn run_remote(
    cli: &Cli,
    config: &BootstrapConfig,
    resolver: IdentityResolver,
    url: &url::Url,
) -> ExitCode {
    match bootstrap_deploy::FuelClient::connect(url.clone()).await {
        Ok(client) => {
            let client = client.with_finality_timeout(config.finality_timeout());
            run(cli, config, resolver, &client).await
        }
        Err(error) => halt(error),
    }
}

#[cfg(not(feature = "fuel"))]
async fn run_remote(
    cli: &Cli,
    config: &BootstrapConfig,
    resolver: IdentityResolver,
    url: &url::Url,
) -> ExitCode {
    if cli.check {
        return check(config, &resolver);
    }
    halt(DeployError::Configuration(format!(
        "submitting transactions to {url} requires building with `--features fuel`"
    )))
}

async fn run<N: NetworkClient>(
    cli: &Cli,
    config: &BootstrapConfig,
    resolver: IdentityResolver,
    network: &N,
) -> ExitCode {
    if cli.check {
        return check(config, &resolver);
    }

    let mut bootstrapper =
        Bootstrapper::from_config(network, resolver, config).redeploy(cli.redeploy);

    if let Some(contract_id) = cli.contract_id {
        bootstrapper = bootstrapper.resume_from(contract_id, cli.resume_state);
    }

    match bootstrapper.run().await {
        Ok(report) => {
            println!("{}", summary::report_table(&report));
            ExitCode::SUCCESS
        }
        Err(failure) => {
            println!("{}", summary::failure_table(&failure));
            ExitCode::from(failure.exit_code())
        }
    }
}

/// Validate everything that does not need a transaction.
fn check(config: &BootstrapConfig, resolver: &IdentityResolver) -> ExitCode {
    let result = ContractArtifact::load(&config.artifacts).and_then(|artifact| {
        let identities = [Role::Deployer, Role::Owner, Role::Admin]
            .into_iter()
            .map(|role| resolver.resolve(role))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((artifact, identities))
    });

    match result {
        Ok((artifact, identities)) => {
            println!("{}", summary::check_table(&artifact, &identities));
            ExitCode::SUCCESS
        }
        Err(error) => halt(error),
    }
}

fn halt(error: DeployError) -> ExitCode {
    tracing::error!(error = %error, exit_code = error.exit_code(), "Bootstrap halted");
    ExitCode::from(error.exit_code())
}
