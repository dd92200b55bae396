// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # jailwatch-test
//!
//! Validator jailing and unjailing scenarios.
//!
//! This crate provides:
//! - **Convergence poller**: bounded "wait until the validator set looks like X"
//! - **Fault plan**: kill one node's container after a grace period
//! - **Scenario orchestrator**: jailing, unjailing, full and staking runs
//! - **Mocks**: an in-memory network for exercising all of the above
//!
//! ## Example
//!
//! ```rust,ignore
//! use jailwatch_core::{ContainerFaultInjector, HarnessConfig, RpcStateClient, ScenarioInput};
//! use jailwatch_test::{JailTestHarness, Scenario};
//!
//! let config = HarnessConfig::load("jailwatch.toml")?.with_env_overrides()?;
//! let input = ScenarioInput::load(&config.scenario.nodes_info)?;
//! let state = RpcStateClient::new(&config.network, &config.scenario.wallet_passphrase)?;
//! let faults = ContainerFaultInjector::from(config.fault.runtime);
//!
//! JailTestHarness::builder()
//!     .with_config(&config)
//!     .with_input(&input)
//!     .with_state_client(&state)
//!     .with_fault_injector(&faults)
//!     .build()?
//!     .run(Scenario::Full)
//!     .await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fault;
pub mod harness;
pub mod mock;
pub mod poller;
pub mod wallet;

pub use error::{Result, TestError};
pub use fault::{FaultPlan, GracePeriod};
pub use harness::{JailTestHarness, JailTestHarnessBuilder, Scenario};
pub use mock::{MockCounters, MockFaultInjector, MockNetwork, MockStateClient};
pub use poller::{ConvergencePoller, ConvergenceTarget, Deadline, validator_count};
