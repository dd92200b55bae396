//! Scripted in-memory network for exercising scenarios without a chain.
//!
//! A [`MockNetwork`] holds one shared state. Its [`MockStateClient`] and
//! [`MockFaultInjector`] both see it, so killing a container eventually
//! shrinks the validator set the state client reports, as on a real
//! network.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use jailwatch_core::{
    ContainerHandle, ContainerSet, FaultError, FaultInjector, FaultResult, Outcome, StakingState,
    StateClient, StateError, StateResult, TransactionRecord, TxoPointer,
};

/// Mutable state of the simulated network.
#[derive(Debug, Default)]
struct NetworkState {
    validators: usize,
    /// Next N validator queries fail with a connection error.
    unreachable_polls: u32,
    /// Validator queries fail with a non-transient error.
    fatal_validator_query: bool,
    /// Queries still reporting the old count after a kill.
    pending_drop: Option<u32>,
    jail_lag: u32,
    stale_listing: bool,
    containers: ContainerSet,
    /// Address -> unjail submissions still to be refused.
    punishments: HashMap<String, u32>,
    existing_wallets: HashSet<String>,
    height: u64,
    blocks_per_query: u64,
    /// Next N height queries fail with a connection error.
    unreachable_status: u32,
    fatal_status: bool,
    /// Next N unjail submissions fail with a connection error.
    unreachable_unjails: u32,
    fatal_unjail: bool,
    /// Next N staking state queries fail with a connection error.
    unreachable_staking: u32,
    transactions: HashMap<String, Vec<TransactionRecord>>,
    deposits: Vec<(String, String, Vec<TxoPointer>)>,
    withdrawals: Vec<(String, String, String)>,
}

/// Call counters.
#[derive(Debug, Default)]
pub struct MockCounters {
    /// `validator_count` calls.
    pub validator_queries: AtomicU32,
    /// `latest_block_height` calls.
    pub height_queries: AtomicU32,
    /// `staking_state` calls.
    pub staking_queries: AtomicU32,
    /// `unjail` calls.
    pub unjail_calls: AtomicU32,
    /// `restore_wallet` calls.
    pub restore_calls: AtomicU32,
    /// `create_staking_address` calls.
    pub address_calls: AtomicU32,
    /// `unlock_sync` calls.
    pub unlock_calls: AtomicU32,
    /// `sync_wallet` calls.
    pub sync_calls: AtomicU32,
    /// `list_running` calls.
    pub list_calls: AtomicU32,
    /// `kill` calls.
    pub kills: AtomicU32,
}

impl MockCounters {
    /// Reads a counter.
    #[must_use]
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

/// Shared simulated network.
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
    counters: Arc<MockCounters>,
}

impl MockNetwork {
    /// Network with one running container and one validator per name.
    #[must_use]
    pub fn with_nodes(container_names: &[&str]) -> Self {
        let network = Self::default();
        {
            let mut state = network.state.lock();
            state.validators = container_names.len();
            state.blocks_per_query = 1;
            for (i, name) in container_names.iter().enumerate() {
                state
                    .containers
                    .insert(ContainerHandle::new(format!("c0ffee{i:02}"), *name));
            }
        }
        network
    }

    /// The first `polls` validator queries fail as unreachable.
    #[must_use]
    pub fn unreachable_for(self, polls: u32) -> Self {
        self.state.lock().unreachable_polls = polls;
        self
    }

    /// Validator queries fail with a non-transient error.
    #[must_use]
    pub fn fatal_validator_query(self) -> Self {
        self.state.lock().fatal_validator_query = true;
        self
    }

    /// The first `polls` height queries fail as unreachable.
    #[must_use]
    pub fn status_unreachable_for(self, polls: u32) -> Self {
        self.state.lock().unreachable_status = polls;
        self
    }

    /// Height queries fail with a non-transient error.
    #[must_use]
    pub fn fatal_status(self) -> Self {
        self.state.lock().fatal_status = true;
        self
    }

    /// The first `calls` unjail submissions fail as unreachable.
    #[must_use]
    pub fn unjail_unreachable_for(self, calls: u32) -> Self {
        self.state.lock().unreachable_unjails = calls;
        self
    }

    /// Unjail submissions fail with a non-transient error.
    #[must_use]
    pub fn fatal_unjail(self) -> Self {
        self.state.lock().fatal_unjail = true;
        self
    }

    /// The first `polls` staking state queries fail as unreachable.
    #[must_use]
    pub fn staking_unreachable_for(self, polls: u32) -> Self {
        self.state.lock().unreachable_staking = polls;
        self
    }

    /// After a kill, `polls` more validator queries report the old count.
    #[must_use]
    pub fn jail_lag(self, polls: u32) -> Self {
        self.state.lock().jail_lag = polls;
        self
    }

    /// Kills stop the node, but the container keeps showing up as running.
    #[must_use]
    pub fn stale_listing(self) -> Self {
        self.state.lock().stale_listing = true;
        self
    }

    /// Marks `address` as jailed; the first `rejections` unjails are refused.
    #[must_use]
    pub fn jailed(self, address: &str, rejections: u32) -> Self {
        self.state
            .lock()
            .punishments
            .insert(address.to_string(), rejections);
        self
    }

    /// Wallet `label` already exists on the wallet daemon.
    #[must_use]
    pub fn existing_wallet(self, label: &str) -> Self {
        self.state.lock().existing_wallets.insert(label.to_string());
        self
    }

    /// Transaction history of wallet `label`.
    #[must_use]
    pub fn transactions(self, label: &str, records: Vec<TransactionRecord>) -> Self {
        self.state
            .lock()
            .transactions
            .insert(label.to_string(), records);
        self
    }

    /// Chain height advances by `blocks` on every height query.
    #[must_use]
    pub fn blocks_per_query(self, blocks: u64) -> Self {
        self.state.lock().blocks_per_query = blocks;
        self
    }

    /// State client view of this network.
    #[must_use]
    pub fn state_client(&self) -> MockStateClient {
        MockStateClient {
            network: self.clone(),
        }
    }

    /// Fault injector view of this network.
    #[must_use]
    pub fn fault_injector(&self) -> MockFaultInjector {
        MockFaultInjector {
            network: self.clone(),
        }
    }

    /// Call counters.
    #[must_use]
    pub fn counters(&self) -> &MockCounters {
        &self.counters
    }

    /// Current validator count, without counting as a query.
    #[must_use]
    pub fn validators(&self) -> usize {
        self.state.lock().validators
    }

    /// Returns true if `address` is still jailed.
    #[must_use]
    pub fn is_jailed(&self, address: &str) -> bool {
        self.state.lock().punishments.contains_key(address)
    }

    /// Recorded deposits as `(wallet, to_address, inputs)`.
    #[must_use]
    pub fn deposits(&self) -> Vec<(String, String, Vec<TxoPointer>)> {
        self.state.lock().deposits.clone()
    }

    /// Recorded withdrawals as `(wallet, from_address, to_address)`.
    #[must_use]
    pub fn withdrawals(&self) -> Vec<(String, String, String)> {
        self.state.lock().withdrawals.clone()
    }
}

/// [`StateClient`] over a [`MockNetwork`].
#[derive(Clone)]
pub struct MockStateClient {
    network: MockNetwork,
}

#[async_trait]
impl StateClient for MockStateClient {
    async fn validator_count(&self) -> StateResult<usize> {
        self.network
            .counters
            .validator_queries
            .fetch_add(1, Ordering::SeqCst);
        let mut state = self.network.state.lock();

        if state.fatal_validator_query {
            return Err(StateError::protocol("validators: missing validator list"));
        }
        if state.unreachable_polls > 0 {
            state.unreachable_polls -= 1;
            return Err(StateError::unreachable("connection refused"));
        }

        let pending = state.pending_drop;
        match pending {
            Some(0) => {
                state.validators = state.validators.saturating_sub(1);
                state.pending_drop = None;
            }
            Some(n) => state.pending_drop = Some(n - 1),
            None => {}
        }
        Ok(state.validators)
    }

    async fn latest_block_height(&self) -> StateResult<u64> {
        self.network
            .counters
            .height_queries
            .fetch_add(1, Ordering::SeqCst);
        let mut state = self.network.state.lock();
        if state.fatal_status {
            return Err(StateError::protocol("status: missing latest_block_height"));
        }
        if state.unreachable_status > 0 {
            state.unreachable_status -= 1;
            return Err(StateError::unreachable("connection refused"));
        }
        state.height += state.blocks_per_query;
        Ok(state.height)
    }

    async fn staking_state(&self, _wallet: &str, address: &str) -> StateResult<StakingState> {
        self.network
            .counters
            .staking_queries
            .fetch_add(1, Ordering::SeqCst);
        let mut state = self.network.state.lock();
        if state.unreachable_staking > 0 {
            state.unreachable_staking -= 1;
            return Err(StateError::unreachable("connection refused"));
        }
        let punishment = state
            .punishments
            .contains_key(address)
            .then(|| json!({ "kind": "NonLive" }));
        Ok(StakingState {
            punishment,
            extra: serde_json::Map::new(),
        })
    }

    async fn unjail(&self, _wallet: &str, address: &str) -> StateResult<Outcome> {
        self.network
            .counters
            .unjail_calls
            .fetch_add(1, Ordering::SeqCst);
        let mut state = self.network.state.lock();
        if state.fatal_unjail {
            return Err(StateError::Http("502 Bad Gateway".to_string()));
        }
        if state.unreachable_unjails > 0 {
            state.unreachable_unjails -= 1;
            return Err(StateError::unreachable("connection refused"));
        }
        let Some(left) = state.punishments.get(address).copied() else {
            return Ok(Outcome::Rejected("account is not jailed".to_string()));
        };
        if left == 0 {
            state.punishments.remove(address);
            Ok(Outcome::Applied)
        } else {
            state.punishments.insert(address.to_string(), left - 1);
            Ok(Outcome::Rejected("account still in jail period".to_string()))
        }
    }

    async fn restore_wallet(&self, wallet: &str, _mnemonic: &str) -> StateResult<Outcome> {
        self.network
            .counters
            .restore_calls
            .fetch_add(1, Ordering::SeqCst);
        let mut state = self.network.state.lock();
        if state.existing_wallets.insert(wallet.to_string()) {
            Ok(Outcome::Applied)
        } else {
            Ok(Outcome::AlreadyExists)
        }
    }

    async fn create_staking_address(&self, wallet: &str) -> StateResult<Outcome> {
        self.network
            .counters
            .address_calls
            .fetch_add(1, Ordering::SeqCst);
        if self.network.state.lock().existing_wallets.contains(wallet) {
            Ok(Outcome::Applied)
        } else {
            Err(StateError::rpc(-32602, format!("wallet {wallet} not found")))
        }
    }

    async fn unlock_sync(&self, _wallet: &str) -> StateResult<Outcome> {
        self.network
            .counters
            .unlock_calls
            .fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::Applied)
    }

    async fn sync_wallet(&self, _wallet: &str) -> StateResult<()> {
        self.network
            .counters
            .sync_calls
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transactions(
        &self,
        wallet: &str,
        offset: usize,
        limit: usize,
    ) -> StateResult<Vec<TransactionRecord>> {
        let state = self.network.state.lock();
        Ok(state
            .transactions
            .get(wallet)
            .map(|records| records.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn deposit_stake(
        &self,
        wallet: &str,
        to_address: &str,
        inputs: &[TxoPointer],
    ) -> StateResult<String> {
        self.network.state.lock().deposits.push((
            wallet.to_string(),
            to_address.to_string(),
            inputs.to_vec(),
        ));
        Ok("deposit-txid".to_string())
    }

    async fn withdraw_all_unbonded(
        &self,
        wallet: &str,
        from_address: &str,
        to_address: &str,
    ) -> StateResult<String> {
        self.network.state.lock().withdrawals.push((
            wallet.to_string(),
            from_address.to_string(),
            to_address.to_string(),
        ));
        Ok("withdraw-txid".to_string())
    }
}

/// [`FaultInjector`] over a [`MockNetwork`].
#[derive(Clone)]
pub struct MockFaultInjector {
    network: MockNetwork,
}

#[async_trait]
impl FaultInjector for MockFaultInjector {
    async fn list_running(&self) -> FaultResult<ContainerSet> {
        self.network
            .counters
            .list_calls
            .fetch_add(1, Ordering::SeqCst);
        Ok(self.network.state.lock().containers.clone())
    }

    async fn kill(&self, handle: &ContainerHandle) -> FaultResult<()> {
        self.network.counters.kills.fetch_add(1, Ordering::SeqCst);
        let mut state = self.network.state.lock();
        if state.containers.get(&handle.name) != Some(handle) {
            return Err(FaultError::NotFound(handle.name.clone()));
        }
        if !state.stale_listing {
            state.containers.remove(&handle.name);
        }
        state.pending_drop = Some(state.jail_lag);
        Ok(())
    }
}
