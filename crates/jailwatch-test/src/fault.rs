//! Fault plan: take one validator node offline.
//!
//! The plan names the target container, checks it is running, waits out
//! a grace period and kills it. Whether the kill took effect is observed
//! later through the validator set, never by waiting on the kill itself.

use std::fmt;
use std::time::Duration;

use jailwatch_core::{ContainerHandle, FaultConfig, FaultInjector, PollingConfig};

use crate::error::{Result, TestError};
use crate::poller::ConvergencePoller;

/// Pause between "full set observed" and the kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracePeriod {
    /// Sleep for a fixed duration.
    Fixed(Duration),
    /// Wait until the chain has produced this many new blocks.
    Blocks(u64),
}

impl fmt::Display for GracePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(d) => write!(f, "{d:?}"),
            Self::Blocks(n) => write!(f, "{n} blocks"),
        }
    }
}

/// Which container to kill, and how long to wait first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultPlan {
    target: String,
    grace: GracePeriod,
}

impl FaultPlan {
    /// Creates a plan for the named container.
    #[must_use]
    pub fn new(target: impl Into<String>, grace: GracePeriod) -> Self {
        Self {
            target: target.into(),
            grace,
        }
    }

    /// Builds the plan from configuration; `grace_blocks` wins over `grace_period`.
    #[must_use]
    pub fn from_config(config: &FaultConfig) -> Self {
        let grace = config
            .grace_blocks
            .map_or(GracePeriod::Fixed(config.grace_period), GracePeriod::Blocks);
        Self::new(config.target_container(), grace)
    }

    /// Name of the target container.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Finds the target among the running containers.
    ///
    /// # Errors
    /// Returns [`TestError::Assertion`] if it is not running.
    pub async fn locate(&self, faults: &dyn FaultInjector) -> Result<ContainerHandle> {
        let running = faults.list_running().await?;
        match running.get(&self.target) {
            Some(handle) => {
                tracing::info!(container = %handle, "fault target is running");
                Ok(handle.clone())
            }
            None => Err(TestError::assertion(format!(
                "container {} is not running (running: {})",
                self.target,
                running.names().collect::<Vec<_>>().join(", ")
            ))),
        }
    }

    /// Waits out the grace period.
    pub async fn wait_grace(&self, poller: &ConvergencePoller<'_>, polling: PollingConfig) -> Result<()> {
        tracing::info!(grace = %self.grace, "waiting before fault injection");
        match self.grace {
            GracePeriod::Fixed(duration) => tokio::time::sleep(duration).await,
            GracePeriod::Blocks(blocks) => {
                poller.await_blocks(blocks, polling).await?;
            }
        }
        Ok(())
    }

    /// Locates the target, waits out the grace period and kills it.
    ///
    /// Returns the handle of the killed container.
    pub async fn inject(
        &self,
        faults: &dyn FaultInjector,
        poller: &ConvergencePoller<'_>,
        polling: PollingConfig,
    ) -> Result<ContainerHandle> {
        let handle = self.locate(faults).await?;
        self.wait_grace(poller, polling).await?;
        faults.kill(&handle).await?;
        tracing::warn!(container = %handle, "fault injected");
        Ok(handle)
    }

    /// Asserts the target no longer shows up as running.
    ///
    /// # Errors
    /// Returns [`TestError::Assertion`] if the kill did not take effect.
    pub async fn verify_removed(&self, faults: &dyn FaultInjector) -> Result<()> {
        if faults.list_running().await?.contains(&self.target) {
            return Err(TestError::assertion(format!(
                "container {} still running after kill",
                self.target
            )));
        }
        tracing::info!(container = %self.target, "fault target is gone");
        Ok(())
    }
}
