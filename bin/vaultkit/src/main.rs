//! vaultkit deploys a declared set of interdependent contracts, in dependency order, idempotently.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use comfy_table::{Table, presets::UTF8_FULL};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use cli::{Cli, Command, DeployArgs};
use vaultkit_deploy::{
    ArtifactStore, Environment, Force, NetworkContext, Pipeline, PipelineConfig, PipelineReport,
    RecordStore, RpcClient, RunOptions, abi,
};

/// Configuration keys that may be overridden with `VAULTKIT_`-prefixed variables.
const ENV_OVERRIDES: [&str; 5] = [
    "network",
    "rpc_url",
    "artifacts",
    "deployments",
    "confirmation_timeout_secs",
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    // Logs go to stderr; stdout carries command output only.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    if let Command::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "vaultkit", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;

    match &cli.command {
        Command::Deploy(args) => deploy(&cli, &config, args).await,
        Command::Plan { tags } => plan(&config, tags),
        Command::Status => status(&config),
        Command::Args { unit } => constructor_args(&config, unit),
        Command::Completions { .. } => Ok(()),
    }
}

/// Layer the configuration file, `VAULTKIT_` variables and command line flags.
///
/// Relative artifact and deployment paths are taken relative to the configuration file.
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let path = PipelineConfig::resolve_path(&cli.config)?;

    let mut figment = Figment::new()
        .merge(Toml::file(&path))
        .merge(Env::prefixed("VAULTKIT_").only(&ENV_OVERRIDES));
    if let Some(network) = &cli.network {
        figment = figment.merge(Serialized::default("network", network));
    }
    if let Some(rpc_url) = &cli.rpc_url {
        figment = figment.merge(Serialized::default("rpc_url", rpc_url));
    }

    let mut config: PipelineConfig = figment
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config.validate()?;

    let base = path.parent().unwrap_or(Path::new("."));
    config.artifacts = rooted(base, &config.artifacts);
    config.deployments = rooted(base, &config.deployments);

    tracing::info!(
        config_path = %path.display(),
        network = %config.network,
        units = config.units.len(),
        "Configuration loaded"
    );

    Ok(config)
}

fn rooted(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

async fn deploy(cli: &Cli, config: &PipelineConfig, args: &DeployArgs) -> Result<()> {
    let pipeline = Pipeline::new(config.units.clone())?;
    let env = Environment::load(cli.env_file.as_deref())?;
    let client = RpcClient::new(&config.rpc_url)?;

    let force = if args.force {
        Force::All
    } else if args.force_unit.is_empty() {
        Force::None
    } else {
        Force::units(args.force_unit.iter().cloned())
    };
    let options = RunOptions {
        tags: args.tags.clone(),
        force,
        confirmation_timeout: config.confirmation_timeout(),
    };

    let mut ctx = NetworkContext::establish(
        client,
        &config.network,
        &config.deployments,
        &config.accounts,
        &env,
    )
    .await?;

    let result = pipeline
        .run(&mut ctx, &env, &ArtifactStore::new(&config.artifacts), &options)
        .await;
    ctx.finish();

    let report = result?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
        );
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &PipelineReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Unit", "Status", "Address", "Actions"]);

    for unit in &report.units {
        let status = if unit.stale {
            format!("{} (stale)", unit.status)
        } else {
            unit.status.to_string()
        };
        let actions = unit
            .actions
            .iter()
            .map(|action| {
                let state = if action.submitted() { "submitted" } else { "skipped" };
                format!("{}: {}", action.name, state)
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            unit.name.clone(),
            status,
            unit.address.to_string(),
            actions,
        ]);
    }

    println!("{table}");
    println!(
        "{} transaction(s) submitted on {} (chain {})",
        report.transactions_submitted(),
        report.network,
        report.chain_id
    );
}

fn plan(config: &PipelineConfig, tags: &[String]) -> Result<()> {
    let pipeline = Pipeline::new(config.units.clone())?;
    let schedule = pipeline.plan(tags)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Unit", "Contract", "Depends on", "Actions"]);
    for (position, unit) in schedule.units().iter().enumerate() {
        table.add_row(vec![
            (position + 1).to_string(),
            unit.name.clone(),
            unit.contract_name().to_string(),
            unit.dependencies.join(", "),
            unit.actions.len().to_string(),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn status(config: &PipelineConfig) -> Result<()> {
    let store = RecordStore::open_read_only(&config.deployments, &config.network)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Unit", "Contract", "Address", "Block", "Transaction"]);

    // Declared units first, in declaration order, then records no unit declares anymore.
    let declared = config.units.iter().map(|unit| unit.name.as_str());
    let undeclared = store
        .records()
        .map(|record| record.name.as_str())
        .filter(|name| !config.units.iter().any(|unit| unit.name == *name));

    for name in declared.chain(undeclared) {
        let row = match store.get(name) {
            Some(record) => vec![
                record.name.clone(),
                record.contract_name.clone(),
                record.address.to_string(),
                record.block_number.to_string(),
                record.transaction_hash.to_string(),
            ],
            None => vec![
                name.to_string(),
                String::new(),
                "not deployed".to_string(),
                String::new(),
                String::new(),
            ],
        };
        table.add_row(row);
    }

    println!("{table}");
    println!("{} record(s) on {}", store.len(), store.network());
    store.close();
    Ok(())
}

fn constructor_args(config: &PipelineConfig, unit: &str) -> Result<()> {
    let store = RecordStore::open_read_only(&config.deployments, &config.network)?;
    let record = store
        .get(unit)
        .with_context(|| format!("No deployment record for {unit} on {}", config.network))?;

    let encoded = abi::encode_constructor_args(&record.abi, &record.args)
        .with_context(|| format!("Failed to encode constructor arguments of {unit}"))?;

    tracing::debug!(unit, address = %record.address, args = ?record.args, "Constructor arguments encoded");
    println!("{encoded}");
    Ok(())
}
