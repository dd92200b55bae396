//! Bounded "wait until the chain shows X" polling.
//!
//! The network offers no subscription primitive we can use, so every wait
//! is a fixed-interval poll against a monotonic deadline. Time is read
//! from `tokio::time`, which lets tests compress hour-long budgets with a
//! paused clock.

use std::time::Duration;

use tokio::time::Instant;

use jailwatch_core::{PollingConfig, StateClient, ValidatorSetSnapshot};

use crate::error::{Result, TestError};

/// Remaining budget after `elapsed`, or `None` once `elapsed` exceeds `timeout`.
#[must_use]
pub fn remaining_at(timeout: Duration, elapsed: Duration) -> Option<Duration> {
    timeout.checked_sub(elapsed)
}

/// Monotonic time budget of one polling loop.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Starts the clock now.
    #[must_use]
    pub fn start(timeout: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout,
        }
    }

    /// Time since the clock started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Remaining budget, or `None` once it is exhausted.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        remaining_at(self.timeout, self.elapsed())
    }

    /// The configured budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// What to wait for, and for how long.
pub struct ConvergenceTarget<P> {
    description: String,
    predicate: P,
    timeout: Duration,
    poll_interval: Duration,
}

impl<P> ConvergenceTarget<P>
where
    P: Fn(&ValidatorSetSnapshot) -> bool,
{
    /// Creates a target from a predicate and a polling budget.
    pub fn new(description: impl Into<String>, predicate: P, polling: PollingConfig) -> Self {
        Self {
            description: description.into(),
            predicate,
            timeout: polling.timeout,
            poll_interval: polling.poll_interval,
        }
    }

    /// Human-readable target, used in logs and timeout errors.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Evaluates the predicate.
    pub fn is_met(&self, snapshot: &ValidatorSetSnapshot) -> bool {
        (self.predicate)(snapshot)
    }
}

/// Target: the active validator set has exactly `expected` members.
pub fn validator_count(
    expected: usize,
    polling: PollingConfig,
) -> ConvergenceTarget<impl Fn(&ValidatorSetSnapshot) -> bool> {
    ConvergenceTarget::new(
        format!("validator count == {expected}"),
        move |snapshot: &ValidatorSetSnapshot| snapshot.count == expected,
        polling,
    )
}

/// Polls the state client until a [`ConvergenceTarget`] is met.
pub struct ConvergencePoller<'a> {
    client: &'a dyn StateClient,
}

impl<'a> ConvergencePoller<'a> {
    /// Creates a poller reading from `client`.
    #[must_use]
    pub fn new(client: &'a dyn StateClient) -> Self {
        Self { client }
    }

    /// Fetches the current validator set.
    ///
    /// An unreachable endpoint yields an empty snapshot so the caller keeps
    /// polling; any other error is fatal.
    pub async fn snapshot(&self) -> Result<ValidatorSetSnapshot> {
        match self.client.validator_count().await {
            Ok(count) => Ok(ValidatorSetSnapshot::new(count)),
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "validator set not reachable yet");
                Ok(ValidatorSetSnapshot::unreachable())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Blocks until `target` holds, or fails once its timeout is exceeded.
    ///
    /// # Errors
    /// Returns [`TestError::Timeout`] when the budget runs out, and any
    /// non-transient state endpoint error as-is.
    pub async fn await_condition<P>(&self, target: &ConvergenceTarget<P>) -> Result<ValidatorSetSnapshot>
    where
        P: Fn(&ValidatorSetSnapshot) -> bool,
    {
        if target.timeout.is_zero() {
            return Err(TestError::timeout(&target.description, Duration::ZERO));
        }

        let deadline = Deadline::start(target.timeout);
        loop {
            let elapsed = deadline.elapsed();
            let snapshot = self.snapshot().await?;

            let Some(remaining) = remaining_at(target.timeout, elapsed) else {
                tracing::error!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    observed = snapshot.count,
                    target = %target.description,
                    "convergence timed out"
                );
                return Err(TestError::timeout(&target.description, elapsed));
            };

            tracing::info!(
                remaining_secs = remaining.as_secs(),
                observed = snapshot.count,
                target = %target.description,
                "polling validator set"
            );

            if target.is_met(&snapshot) {
                tracing::info!(target = %target.description, "validators ready");
                return Ok(snapshot);
            }

            tokio::time::sleep(target.poll_interval).await;
        }
    }

    /// Shorthand for [`validator_count`] + [`Self::await_condition`].
    pub async fn await_validator_count(
        &self,
        expected: usize,
        polling: PollingConfig,
    ) -> Result<ValidatorSetSnapshot> {
        self.await_condition(&validator_count(expected, polling)).await
    }

    /// Reads the chain height; `None` while the endpoint is unreachable.
    async fn block_height(&self) -> Result<Option<u64>> {
        match self.client.latest_block_height().await {
            Ok(height) => Ok(Some(height)),
            Err(e) if e.is_transient() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocks until the chain height has advanced by `blocks`.
    ///
    /// The starting height is the first one successfully read.
    ///
    /// # Errors
    /// Returns [`TestError::Timeout`] when the budget runs out first.
    pub async fn await_blocks(&self, blocks: u64, polling: PollingConfig) -> Result<u64> {
        let description = format!("{blocks} new blocks");
        let deadline = Deadline::start(polling.timeout);
        let mut target_height = None;

        loop {
            let height = self.block_height().await?;
            let Some(remaining) = deadline.remaining() else {
                return Err(TestError::timeout(description, deadline.elapsed()));
            };
            match height {
                Some(height) => {
                    let target = *target_height.get_or_insert(height.saturating_add(blocks));
                    tracing::info!(
                        remaining_secs = remaining.as_secs(),
                        observed = height,
                        target,
                        "waiting for blocks"
                    );
                    if height >= target {
                        return Ok(height);
                    }
                }
                None => tracing::warn!(
                    remaining_secs = remaining.as_secs(),
                    target = %description,
                    "chain height not reachable yet"
                ),
            }
            tokio::time::sleep(polling.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCounters, MockNetwork};
    use jailwatch_core::FaultInjector;

    fn budget(timeout_secs: u64, interval_secs: u64) -> PollingConfig {
        PollingConfig::new(
            Duration::from_secs(timeout_secs),
            Duration::from_secs(interval_secs),
        )
    }

    /// Kills `name` so the validator set shrinks after `lag` more queries.
    async fn kill(network: &MockNetwork, name: &str) {
        let injector = network.fault_injector();
        let running = injector.list_running().await.unwrap();
        injector.kill(running.get(name).unwrap()).await.unwrap();
    }

    #[test]
    fn test_remaining_at_boundary() {
        let t = Duration::from_secs(10);
        assert_eq!(remaining_at(t, Duration::from_secs(4)), Some(Duration::from_secs(6)));
        assert_eq!(remaining_at(t, t), Some(Duration::ZERO));
        assert_eq!(remaining_at(t, Duration::from_millis(10_001)), None);
    }

    #[test]
    fn test_validator_count_target() {
        let target = validator_count(2, budget(60, 1));
        assert_eq!(target.description(), "validator count == 2");
        assert!(target.is_met(&ValidatorSetSnapshot::new(2)));
        assert!(!target.is_met(&ValidatorSetSnapshot::new(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1", "jail_chain1_1"]);
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let snapshot = poller.await_validator_count(2, budget(3600, 10)).await.unwrap();
        assert_eq!(snapshot.count, 2);
        assert_eq!(MockCounters::get(&network.counters().validator_queries), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_never_fetches() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1"]);
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let err = poller.await_validator_count(1, budget(0, 10)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(MockCounters::get(&network.counters().validator_queries), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_endpoint_keeps_polling() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1", "jail_chain1_1"]).unreachable_for(3);
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let start = Instant::now();
        let snapshot = poller.await_validator_count(2, budget(3600, 10)).await.unwrap();
        assert_eq!(snapshot.count, 2);
        assert_eq!(MockCounters::get(&network.counters().validator_queries), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_endpoint_counts_as_zero() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1"]).unreachable_for(1);
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        // A zero-validator target is satisfied by the neutral snapshot.
        let snapshot = poller.await_validator_count(0, budget(60, 1)).await.unwrap();
        assert_eq!(snapshot, ValidatorSetSnapshot::unreachable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_query_aborts() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1"]).fatal_validator_query();
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let err = poller.await_validator_count(1, budget(3600, 10)).await.unwrap_err();
        assert!(matches!(err, TestError::State(_)));
        assert_eq!(MockCounters::get(&network.counters().validator_queries), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_once_after_budget() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1", "jail_chain1_1"]);
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let start = Instant::now();
        let err = poller.await_validator_count(1, budget(30, 10)).await.unwrap_err();
        assert!(err.is_timeout());
        // Fetches at 0s, 10s, 20s, 30s are evaluated; the one at 40s fails.
        assert_eq!(MockCounters::get(&network.counters().validator_queries), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_fetch_at_exact_budget() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1", "jail_chain1_1"]).jail_lag(3);
        kill(&network, "jail_chain1_1").await;
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        // Fourth fetch (t = 30s) is the first to see the drop.
        let snapshot = poller.await_validator_count(1, budget(30, 10)).await.unwrap();
        assert_eq!(snapshot.count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_blocks() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1"]).blocks_per_query(1);
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let height = poller.await_blocks(3, budget(60, 1)).await.unwrap();
        assert!(height >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_blocks_survives_unreachable_status() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1"])
            .blocks_per_query(1)
            .status_unreachable_for(2);
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let start = Instant::now();
        let height = poller.await_blocks(2, budget(3600, 1)).await.unwrap();
        // Two failed reads, then heights 1, 2, 3.
        assert_eq!(height, 3);
        assert_eq!(MockCounters::get(&network.counters().height_queries), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_blocks_fatal_status_aborts() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1"]).fatal_status();
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let err = poller.await_blocks(2, budget(3600, 1)).await.unwrap_err();
        assert!(matches!(err, TestError::State(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_blocks_times_out_on_stalled_chain() {
        let network = MockNetwork::with_nodes(&["jail_chain0_1"]).blocks_per_query(0);
        let client = network.state_client();
        let poller = ConvergencePoller::new(&client);

        let err = poller.await_blocks(1, budget(5, 1)).await.unwrap_err();
        assert!(err.is_timeout());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::mock::MockNetwork;
    use jailwatch_core::FaultInjector;
    use proptest::prelude::*;

    proptest! {
        /// remaining_at is None exactly when elapsed exceeds the timeout.
        #[test]
        fn remaining_none_iff_elapsed_exceeds(timeout in 0u64..100_000, elapsed in 0u64..100_000) {
            let r = remaining_at(Duration::from_millis(timeout), Duration::from_millis(elapsed));
            prop_assert_eq!(r.is_none(), elapsed > timeout);
            if let Some(r) = r {
                prop_assert_eq!(r.as_millis() as u64, timeout - elapsed);
            }
        }

        /// Success iff the predicate first holds on a fetch made at or before the timeout.
        #[test]
        fn converges_iff_first_match_within_budget(
            interval in 1u64..20,
            budget_ticks in 1u64..15,
            lag in 0u32..20,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();

            let result = runtime.block_on(async {
                let network = MockNetwork::with_nodes(&["n0", "n1"]).jail_lag(lag);
                let injector = network.fault_injector();
                let running = injector.list_running().await.unwrap();
                injector.kill(running.get("n1").unwrap()).await.unwrap();

                let client = network.state_client();
                let polling = PollingConfig::new(
                    Duration::from_secs(interval * budget_ticks),
                    Duration::from_secs(interval),
                );
                ConvergencePoller::new(&client).await_validator_count(1, polling).await
            });

            // Fetch number `lag` (0-based) happens at lag * interval seconds.
            let first_match_at = u64::from(lag) * interval;
            let budget = interval * budget_ticks;
            prop_assert_eq!(result.is_ok(), first_match_at <= budget);
            if let Err(e) = result {
                prop_assert!(e.is_timeout());
            }
        }
    }
}
