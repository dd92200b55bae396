//! Harness configuration.
//!
//! Validated at load time, with defaults that match the two-node jail
//! network. Durations are written as human-readable strings (`"1h"`,
//! `"10s"`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Environment variable carrying the test-run identifier (container prefix).
pub const RUN_ID_ENV: &str = "CURRENT_HASH";

/// Environment variable carrying the Tendermint RPC port.
pub const CHAIN_RPC_PORT_ENV: &str = "JAIL_CHAIN_RPC";

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Endpoints of the network under test.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Convergence polling budget.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Fault injection target and timing.
    #[serde(default)]
    pub fault: FaultConfig,

    /// Scenario parameters.
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl HarnessConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.polling.validate()?;
        self.fault.validate()?;
        self.scenario.validate()?;
        Ok(())
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| HarnessError::config(format!("failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text cannot be parsed or is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HarnessError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CURRENT_HASH` and `JAIL_CHAIN_RPC` from the process environment.
    ///
    /// # Errors
    /// Returns an error if an override is malformed.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(
            std::env::var(RUN_ID_ENV).ok(),
            std::env::var(CHAIN_RPC_PORT_ENV).ok(),
        )
    }

    /// Applies an explicit run ID and chain RPC port, then re-validates.
    ///
    /// # Errors
    /// Returns an error if the port is not a number or the result is invalid.
    pub fn with_overrides(mut self, run_id: Option<String>, rpc_port: Option<String>) -> Result<Self> {
        if let Some(run_id) = run_id.filter(|r| !r.is_empty()) {
            self.fault.run_id = run_id;
        }
        if let Some(port) = rpc_port.filter(|p| !p.is_empty()) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| HarnessError::config(format!("invalid {CHAIN_RPC_PORT_ENV}: {e}")))?;
            self.network.chain_rpc_url = format!("http://127.0.0.1:{port}");
        }
        self.validate()?;
        Ok(self)
    }
}

/// Endpoints of the network under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Tendermint RPC endpoint (validator set, chain status).
    #[serde(default = "default_chain_rpc_url")]
    pub chain_rpc_url: String,

    /// Wallet daemon JSON-RPC endpoint (staking, wallets).
    #[serde(default = "default_client_rpc_url")]
    pub client_rpc_url: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout", with = "humantime_duration")]
    pub request_timeout: Duration,
}

fn default_chain_rpc_url() -> String {
    "http://127.0.0.1:26657".to_string()
}

fn default_client_rpc_url() -> String {
    "http://127.0.0.1:26659".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_rpc_url: default_chain_rpc_url(),
            client_rpc_url: default_client_rpc_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("chain_rpc_url", &self.chain_rpc_url),
            ("client_rpc_url", &self.client_rpc_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(HarnessError::config(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(HarnessError::config("request_timeout must be positive"));
        }
        Ok(())
    }
}

/// Time budget of every convergence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Hard ceiling for one wait.
    #[serde(default = "default_poll_timeout", with = "humantime_duration")]
    pub timeout: Duration,

    /// Pause between two observations.
    #[serde(default = "default_poll_interval", with = "humantime_duration")]
    pub poll_interval: Duration,
}

fn default_poll_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout: default_poll_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl PollingConfig {
    /// Creates a polling budget.
    #[must_use]
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(HarnessError::config("polling.timeout must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(HarnessError::config("polling.poll_interval must be positive"));
        }
        if self.poll_interval > self.timeout {
            return Err(HarnessError::config(format!(
                "polling.poll_interval ({:?}) exceeds polling.timeout ({:?})",
                self.poll_interval, self.timeout
            )));
        }
        Ok(())
    }
}

/// Container runtime driven by the fault injector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker CLI.
    #[default]
    Docker,
    /// Podman CLI.
    Podman,
}

/// Which container to kill, and how long to wait before doing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Container runtime.
    #[serde(default)]
    pub runtime: RuntimeKind,

    /// Test-run identifier; prefix of every container name.
    #[serde(default = "default_run_id")]
    pub run_id: String,

    /// Logical node whose container is killed.
    #[serde(default = "default_target_node")]
    pub target_node: String,

    /// Compose instance number (the trailing `_1`).
    #[serde(default = "default_instance")]
    pub instance: u32,

    /// Fixed pause before the kill.
    #[serde(default = "default_grace_period", with = "humantime_duration")]
    pub grace_period: Duration,

    /// When set, wait for this many new blocks instead of `grace_period`.
    #[serde(default)]
    pub grace_blocks: Option<u64>,
}

fn default_run_id() -> String {
    "jail".to_string()
}

fn default_target_node() -> String {
    "chain1".to_string()
}

const fn default_instance() -> u32 {
    1
}

fn default_grace_period() -> Duration {
    Duration::from_secs(10)
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeKind::default(),
            run_id: default_run_id(),
            target_node: default_target_node(),
            instance: default_instance(),
            grace_period: default_grace_period(),
            grace_blocks: None,
        }
    }
}

impl FaultConfig {
    /// Container name of `node` for this run, e.g. `jail_chain1_1`.
    #[must_use]
    pub fn container_name(&self, node: &str) -> String {
        format!("{}_{}_{}", self.run_id, node, self.instance)
    }

    /// Container name of the fault target.
    #[must_use]
    pub fn target_container(&self) -> String {
        self.container_name(&self.target_node)
    }

    fn validate(&self) -> Result<()> {
        if self.run_id.is_empty() {
            return Err(HarnessError::config("fault.run_id cannot be empty"));
        }
        if self.target_node.is_empty() {
            return Err(HarnessError::config("fault.target_node cannot be empty"));
        }
        if self.grace_blocks == Some(0) {
            return Err(HarnessError::config("fault.grace_blocks must be at least 1"));
        }
        Ok(())
    }
}

/// Scenario parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Path of the node descriptor written by network setup.
    #[serde(default = "default_nodes_info")]
    pub nodes_info: PathBuf,

    /// Validator count of the healthy network.
    #[serde(default = "default_full_validator_count")]
    pub full_validator_count: usize,

    /// Descriptor index of the node that gets jailed.
    #[serde(default = "default_jailed_node")]
    pub jailed_node: usize,

    /// Passphrase used when restoring wallets.
    #[serde(default = "default_wallet_passphrase")]
    pub wallet_passphrase: String,
}

fn default_nodes_info() -> PathBuf {
    PathBuf::from("nodes_info.json")
}

const fn default_full_validator_count() -> usize {
    2
}

const fn default_jailed_node() -> usize {
    1
}

fn default_wallet_passphrase() -> String {
    "123456".to_string()
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            nodes_info: default_nodes_info(),
            full_validator_count: default_full_validator_count(),
            jailed_node: default_jailed_node(),
            wallet_passphrase: default_wallet_passphrase(),
        }
    }
}

impl ScenarioConfig {
    /// Validator count once the target node has been jailed.
    #[must_use]
    pub const fn degraded_validator_count(&self) -> usize {
        self.full_validator_count.saturating_sub(1)
    }

    fn validate(&self) -> Result<()> {
        if self.full_validator_count == 0 {
            return Err(HarnessError::config(
                "scenario.full_validator_count must be at least 1",
            ));
        }
        if self.jailed_node >= self.full_validator_count {
            return Err(HarnessError::config(format!(
                "scenario.jailed_node ({}) is outside the validator set of {}",
                self.jailed_node, self.full_validator_count
            )));
        }
        if self.wallet_passphrase.is_empty() {
            return Err(HarnessError::config("scenario.wallet_passphrase cannot be empty"));
        }
        Ok(())
    }
}

/// Serde adapter for `"1h 30m"`-style durations.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
