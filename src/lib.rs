//! jailwatch: validator jailing and unjailing integration-test harness.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jailwatch::prelude::*;
//!
//! // Re-exports from sub-crates for convenience
//! ```

pub use jailwatch_core as core;
pub use jailwatch_test as scenario;

/// Prelude module for common imports.
pub mod prelude {
    pub use jailwatch_core::{
        ContainerFaultInjector, FaultInjector, HarnessConfig, NodeIdentity, Outcome,
        PollingConfig, RpcStateClient, ScenarioInput, StateClient, ValidatorSetSnapshot,
    };
    pub use jailwatch_test::{ConvergencePoller, JailTestHarness, Scenario, TestError};
}
