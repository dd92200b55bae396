//! Scenario orchestrator.
//!
//! Sequences fault injection, wallet recovery, unjail retries and
//! convergence waits into the jailing and unjailing scenarios. Every step
//! runs strictly after the previous one returned; the only suspension
//! points are the sleeps between poll iterations.

use std::fmt;
use std::str::FromStr;

use tracing::Instrument;

use jailwatch_core::{
    FaultInjector, HarnessConfig, HarnessError, NodeIdentity, RunId, ScenarioInput, StateClient,
};

use crate::error::{Result, TestError};
use crate::fault::FaultPlan;
use crate::poller::{ConvergencePoller, Deadline};
use crate::wallet;

/// Which scenario to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scenario {
    /// Take a validator offline and wait for it to be jailed.
    Jail,
    /// Unjail a previously jailed validator.
    Unjail,
    /// Jailing followed by unjailing.
    #[default]
    Full,
    /// Withdraw and re-deposit stake between node wallets.
    Staking,
}

impl Scenario {
    /// Scenario name as accepted on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Jail => "jail",
            Self::Unjail => "unjail",
            Self::Full => "full",
            Self::Staking => "staking",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = HarnessError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "jail" => Ok(Self::Jail),
            "unjail" => Ok(Self::Unjail),
            "full" => Ok(Self::Full),
            "staking" => Ok(Self::Staking),
            other => Err(HarnessError::config(format!(
                "unknown scenario {other:?} (expected jail, unjail, full or staking)"
            ))),
        }
    }
}

/// Drives the scenarios against one network.
///
/// Configuration and node identities are borrowed for the whole run and
/// never mutated.
pub struct JailTestHarness<'a> {
    config: &'a HarnessConfig,
    input: &'a ScenarioInput,
    state: &'a dyn StateClient,
    faults: &'a dyn FaultInjector,
    run_id: RunId,
}

impl<'a> JailTestHarness<'a> {
    /// Creates a new harness builder.
    #[must_use]
    pub fn builder() -> JailTestHarnessBuilder<'a> {
        JailTestHarnessBuilder::default()
    }

    /// Identifier attached to this harness's log span.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    fn poller(&self) -> ConvergencePoller<'a> {
        ConvergencePoller::new(self.state)
    }

    fn jailed_node(&self) -> Result<&'a NodeIdentity> {
        Ok(self.input.node(self.config.scenario.jailed_node)?)
    }

    /// Runs `scenario` inside a span carrying the run ID.
    pub async fn run(&self, scenario: Scenario) -> Result<()> {
        let span = tracing::info_span!("scenario", run_id = %self.run_id, scenario = %scenario);
        async {
            tracing::info!("scenario started");
            let result = match scenario {
                Scenario::Jail => self.run_jailing().await,
                Scenario::Unjail => self.run_unjailing().await,
                Scenario::Full => self.run_full().await,
                Scenario::Staking => self.run_staking().await,
            };
            match &result {
                Ok(()) => tracing::info!("scenario passed"),
                Err(e) => tracing::error!(error = %e, "scenario failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Jailing: full set, kill the target, degraded set, target gone.
    pub async fn run_jailing(&self) -> Result<()> {
        let polling = self.config.polling;
        let full = self.config.scenario.full_validator_count;
        let degraded = self.config.scenario.degraded_validator_count();
        let poller = self.poller();
        let plan = FaultPlan::from_config(&self.config.fault);

        tracing::info!(validators = full, "awaiting full validator set");
        poller.await_validator_count(full, polling).await?;

        tracing::info!(container = plan.target(), "injecting fault");
        plan.inject(self.faults, &poller, polling).await?;

        tracing::info!(validators = degraded, "awaiting jailing");
        poller.await_validator_count(degraded, polling).await?;

        plan.verify_removed(self.faults).await?;
        tracing::info!("jailing test passed");
        Ok(())
    }

    /// Restores and prepares every node wallet.
    pub async fn prepare_wallets(&self) -> Result<()> {
        wallet::prepare_wallets(self.state, self.input).await
    }

    /// Unjailing: degraded set, prepare wallets, then re-submit `unjail`
    /// every tick until the punishment is gone.
    pub async fn run_unjailing(&self) -> Result<()> {
        let polling = self.config.polling;
        let degraded = self.config.scenario.degraded_validator_count();
        let poller = self.poller();
        let node = self.jailed_node()?;

        tracing::info!(validators = degraded, "confirming jailed validator set");
        poller.await_validator_count(degraded, polling).await?;

        self.prepare_wallets().await?;

        let description = format!("punishment of {} to clear", node.staking_address);
        if polling.timeout.is_zero() {
            return Err(TestError::timeout(description, polling.timeout));
        }

        let deadline = Deadline::start(polling.timeout);
        loop {
            let Some(remaining) = deadline.remaining() else {
                return Err(TestError::timeout(description, deadline.elapsed()));
            };
            let validators = poller.snapshot().await?;

            match self.state.unjail(&node.label, &node.staking_address).await {
                Ok(outcome) => {
                    tracing::info!(address = %node.staking_address, %outcome, "unjail submitted");
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        remaining_secs = remaining.as_secs(),
                        address = %node.staking_address,
                        error = %e,
                        "unjail not delivered"
                    );
                }
                Err(e) => return Err(e.into()),
            }

            let punishment = match self.state.staking_state(&node.label, &node.staking_address).await {
                Ok(state) => state.punishment,
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        remaining_secs = remaining.as_secs(),
                        address = %node.staking_address,
                        error = %e,
                        "staking state not reachable yet"
                    );
                    tokio::time::sleep(polling.poll_interval).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            tracing::info!(
                remaining_secs = remaining.as_secs(),
                validators = validators.count,
                punishment = ?punishment,
                address = %node.staking_address,
                "polling punishment state"
            );

            if punishment.is_none() {
                tracing::info!(address = %node.staking_address, "unjailed");
                return Ok(());
            }
            tokio::time::sleep(polling.poll_interval).await;
        }
    }

    /// Jailing, then unjailing.
    pub async fn run_full(&self) -> Result<()> {
        self.run_jailing().await?;
        self.run_unjailing().await
    }

    /// Staking rotation between node 0 and node 1.
    pub async fn run_staking(&self) -> Result<()> {
        self.prepare_wallets().await?;
        let source = self.input.node(0)?;
        self.state.sync_wallet(&source.label).await?;
        wallet::rotate_stake(self.state, self.input).await?;
        Ok(())
    }
}

/// Builder for [`JailTestHarness`].
#[derive(Default)]
pub struct JailTestHarnessBuilder<'a> {
    config: Option<&'a HarnessConfig>,
    input: Option<&'a ScenarioInput>,
    state: Option<&'a dyn StateClient>,
    faults: Option<&'a dyn FaultInjector>,
    run_id: Option<RunId>,
}

impl<'a> JailTestHarnessBuilder<'a> {
    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: &'a HarnessConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the node identities.
    #[must_use]
    pub fn with_input(mut self, input: &'a ScenarioInput) -> Self {
        self.input = Some(input);
        self
    }

    /// Sets the chain state endpoint.
    #[must_use]
    pub fn with_state_client(mut self, state: &'a dyn StateClient) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the container runtime.
    #[must_use]
    pub fn with_fault_injector(mut self, faults: &'a dyn FaultInjector) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Uses a fixed run ID instead of a random one.
    #[must_use]
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Builds the harness.
    ///
    /// # Errors
    /// Returns an error if a collaborator is missing or the jailed node is
    /// not listed in the descriptor.
    pub fn build(self) -> Result<JailTestHarness<'a>> {
        let missing = |what: &str| TestError::Harness(HarnessError::config(format!("harness needs {what}")));
        let config = self.config.ok_or_else(|| missing("a configuration"))?;
        let input = self.input.ok_or_else(|| missing("node identities"))?;
        let state = self.state.ok_or_else(|| missing("a state client"))?;
        let faults = self.faults.ok_or_else(|| missing("a fault injector"))?;

        input.node(config.scenario.jailed_node)?;

        Ok(JailTestHarness {
            config,
            input,
            state,
            faults,
            run_id: self.run_id.unwrap_or_default(),
        })
    }
}
