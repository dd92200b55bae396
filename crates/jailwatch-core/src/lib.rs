// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # jailwatch-core
//!
//! Data model and collaborator adapters for the jailwatch validator
//! jailing harness.
//!
//! - [`HarnessConfig`] for endpoints, polling budget and fault target
//! - [`ScenarioInput`] / [`NodeIdentity`] loaded from the network descriptor
//! - [`StateClient`] and [`FaultInjector`], the two external collaborators
//! - [`adapters`] with the live HTTP and container-runtime implementations
//!
//! ## Example
//!
//! ```rust,ignore
//! use jailwatch_core::{HarnessConfig, RpcStateClient, StateClient};
//!
//! let config = HarnessConfig::load("jailwatch.toml")?.with_env_overrides()?;
//! let client = RpcStateClient::new(&config.network, &config.scenario.wallet_passphrase)?;
//! println!("validators: {}", client.validator_count().await?);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod adapters;
pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use adapter::{
    FaultError, FaultInjector, FaultResult, StateClient, StateError, StateResult,
};
pub use adapters::{ContainerFaultInjector, ContainerRuntime, RpcStateClient};
pub use config::{
    FaultConfig, HarnessConfig, NetworkConfig, PollingConfig, RuntimeKind, ScenarioConfig,
};
pub use error::{HarnessError, Result};
pub use identity::{NodeIdentity, ScenarioInput};
pub use types::{
    ContainerHandle, ContainerSet, Outcome, RunId, StakingState, TransactionRecord, TxoPointer,
    ValidatorSetSnapshot,
};
