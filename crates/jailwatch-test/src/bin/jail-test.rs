//! Validator jailing/unjailing test runner.
//!
//! Drives a running local network: kills one validator's container, waits
//! for the chain to jail it, then unjails it again.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p jailwatch-test --bin jail-test
//! cargo run -p jailwatch-test --bin jail-test -- --config jailwatch.toml --scenario jail
//! CURRENT_HASH=ab12 JAIL_CHAIN_RPC=26657 cargo run -p jailwatch-test --bin jail-test
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use jailwatch_core::{ContainerFaultInjector, HarnessConfig, RpcStateClient, ScenarioInput};
use jailwatch_test::{JailTestHarness, Scenario};

const USAGE: &str = "\
usage: jail-test [--config <path>] [--nodes-info <path>] [--scenario <jail|unjail|full|staking>]

  --config      TOML configuration (defaults apply when omitted)
  --nodes-info  node descriptor written by network setup (default: nodes_info.json)
  --scenario    scenario to run (default: full)
  --help        print this message

environment:
  CURRENT_HASH    test-run identifier, prefix of the container names
  JAIL_CHAIN_RPC  Tendermint RPC port on 127.0.0.1
  RUST_LOG        log filter (default: info)";

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    nodes_info: Option<PathBuf>,
    scenario: Scenario,
}

/// Parses arguments; `Ok(None)` means `--help` was requested.
fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Option<Options>> {
    let mut options = Options::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--config" => options.config = Some(PathBuf::from(value("--config")?)),
            "--nodes-info" => options.nodes_info = Some(PathBuf::from(value("--nodes-info")?)),
            "--scenario" => options.scenario = value("--scenario")?.parse()?,
            "--help" | "-h" => return Ok(None),
            other => anyhow::bail!("unexpected argument {other:?}"),
        }
    }
    Ok(Some(options))
}

fn load_config(options: &Options) -> anyhow::Result<HarnessConfig> {
    let mut config = match &options.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    if let Some(path) = &options.nodes_info {
        config.scenario.nodes_info.clone_from(path);
    }
    Ok(config.with_env_overrides()?)
}

async fn run(options: Options) -> anyhow::Result<()> {
    let config = load_config(&options)?;
    tracing::info!(
        chain_rpc = %config.network.chain_rpc_url,
        client_rpc = %config.network.client_rpc_url,
        run_id = %config.fault.run_id,
        target = %config.fault.target_container(),
        timeout = ?config.polling.timeout,
        poll_interval = ?config.polling.poll_interval,
        "configuration loaded"
    );

    let input = ScenarioInput::load(&config.scenario.nodes_info)
        .with_context(|| format!("reading {}", config.scenario.nodes_info.display()))?;
    input.display_info();

    let state = RpcStateClient::new(&config.network, &config.scenario.wallet_passphrase)?;
    let faults = ContainerFaultInjector::from(config.fault.runtime);

    let harness = JailTestHarness::builder()
        .with_config(&config)
        .with_input(&input)
        .with_state_client(&state)
        .with_fault_injector(&faults)
        .build()?;

    harness.run(options.scenario).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("error: {e:#}\n\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match run(options).await {
        Ok(()) => {
            tracing::info!("all scenario steps passed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_defaults() {
        let options = parse_args(args(&[])).unwrap().unwrap();
        assert!(options.config.is_none());
        assert_eq!(options.scenario, Scenario::Full);
    }

    #[test]
    fn test_parse_all_flags() {
        let options = parse_args(args(&[
            "--config",
            "jw.toml",
            "--nodes-info",
            "/tmp/nodes.json",
            "--scenario",
            "unjail",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(options.config, Some(PathBuf::from("jw.toml")));
        assert_eq!(options.nodes_info, Some(PathBuf::from("/tmp/nodes.json")));
        assert_eq!(options.scenario, Scenario::Unjail);
    }

    #[test]
    fn test_parse_help() {
        assert!(parse_args(args(&["--help"])).unwrap().is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--scenario", "chaos"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
    }
}
