//! Collaborator contracts: the chain state endpoint and the container runtime.
//!
//! Scenarios only ever talk to the network through these two traits, so
//! they can run against the live RPC/docker adapters in [`crate::adapters`]
//! or against scripted doubles in tests.

use async_trait::async_trait;

use crate::types::{ContainerHandle, ContainerSet, Outcome, StakingState, TransactionRecord, TxoPointer};

// =============================================================================
// StateError
// =============================================================================

/// Error type for chain state endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Endpoint could not be reached (connection refused, timed out).
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("http error: {0}")]
    Http(String),

    /// Response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StateError {
    /// Creates an unreachable error.
    #[must_use]
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a JSON-RPC error.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Returns true if the error means "network not reachable yet".
    ///
    /// This is the only error class a polling loop may absorb.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    /// Returns true if the node rejected the request because the target
    /// (wallet, address) already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Rpc { message, .. } => message.to_ascii_lowercase().contains("already exist"),
            _ => false,
        }
    }
}

/// Result type for state endpoint operations.
pub type StateResult<T> = std::result::Result<T, StateError>;

// =============================================================================
// StateClient
// =============================================================================

/// Read and write access to the blockchain under test.
///
/// Wallets are addressed by label (`a`, `b`, ...); the client owns any
/// session material (encryption keys) those labels map to.
#[async_trait]
pub trait StateClient: Send + Sync {
    /// Size of the active validator set.
    ///
    /// Connection failures surface as [`StateError::Unreachable`]; the
    /// poller maps them to an empty snapshot.
    async fn validator_count(&self) -> StateResult<usize>;

    /// Height of the latest committed block.
    async fn latest_block_height(&self) -> StateResult<u64>;

    /// Staking and punishment state of `address`, queried through `wallet`.
    async fn staking_state(&self, wallet: &str, address: &str) -> StateResult<StakingState>;

    /// Submits an unjail transaction for `address`.
    ///
    /// Node-side refusals come back as [`Outcome::Rejected`], not as errors.
    async fn unjail(&self, wallet: &str, address: &str) -> StateResult<Outcome>;

    /// Restores wallet `wallet` from `mnemonic`.
    async fn restore_wallet(&self, wallet: &str, mnemonic: &str) -> StateResult<Outcome>;

    /// Derives a new staking address in `wallet`.
    async fn create_staking_address(&self, wallet: &str) -> StateResult<Outcome>;

    /// Enables background sync for `wallet`.
    async fn unlock_sync(&self, wallet: &str) -> StateResult<Outcome>;

    /// Runs one blocking sync of `wallet` against the chain.
    async fn sync_wallet(&self, wallet: &str) -> StateResult<()>;

    /// Transaction history of `wallet`.
    async fn transactions(
        &self,
        wallet: &str,
        offset: usize,
        limit: usize,
    ) -> StateResult<Vec<TransactionRecord>>;

    /// Deposits `inputs` into the staking account `to_address`.
    async fn deposit_stake(
        &self,
        wallet: &str,
        to_address: &str,
        inputs: &[TxoPointer],
    ) -> StateResult<String>;

    /// Withdraws all unbonded stake of `from_address` to `to_address`.
    async fn withdraw_all_unbonded(
        &self,
        wallet: &str,
        from_address: &str,
        to_address: &str,
    ) -> StateResult<String>;
}

// =============================================================================
// FaultError
// =============================================================================

/// Error type for container runtime operations.
///
/// Every variant is fatal: a broken runtime means a broken test environment.
#[derive(Debug, thiserror::Error)]
pub enum FaultError {
    /// Runtime command exited unsuccessfully.
    #[error("{command} failed: {stderr}")]
    CommandFailed {
        /// The command line that ran.
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Container not found.
    #[error("container not found: {0}")]
    NotFound(String),

    /// Runtime output could not be parsed.
    #[error("unparseable runtime output: {0}")]
    Parse(String),

    /// I/O error (runtime binary missing, spawn failure).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for container runtime operations.
pub type FaultResult<T> = std::result::Result<T, FaultError>;

// =============================================================================
// FaultInjector
// =============================================================================

/// Enumerates and terminates simulated node instances.
#[async_trait]
pub trait FaultInjector: Send + Sync {
    /// Running containers keyed by name.
    async fn list_running(&self) -> FaultResult<ContainerSet>;

    /// Forcibly terminates `handle`.
    ///
    /// Returns once the runtime accepted the request; the instance may
    /// still be shutting down.
    async fn kill(&self, handle: &ContainerHandle) -> FaultResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unreachable_is_transient() {
        assert!(StateError::unreachable("connection refused").is_transient());
        assert!(!StateError::rpc(-32000, "boom").is_transient());
        assert!(!StateError::protocol("missing result").is_transient());
        assert!(!StateError::Http("502".into()).is_transient());
    }

    #[test]
    fn test_already_exists_classification() {
        let err = StateError::rpc(-32602, "Invalid input: Wallet with name (a) already exists");
        assert!(err.is_already_exists());

        let err = StateError::rpc(-32602, "Already Exists");
        assert!(err.is_already_exists());

        assert!(!StateError::rpc(-32000, "Tx validation failed").is_already_exists());
        assert!(!StateError::protocol("already exists").is_already_exists());
    }

    #[test]
    fn test_rpc_error_display() {
        let err = StateError::rpc(-32000, "account is jailed");
        assert_eq!(err.to_string(), "rpc error -32000: account is jailed");
    }

    #[test]
    fn test_fault_error_display() {
        let err = FaultError::CommandFailed {
            command: "docker kill abc".into(),
            stderr: "No such container: abc".into(),
        };
        assert!(err.to_string().contains("docker kill abc failed"));
        assert!(FaultError::NotFound("jail_chain1_1".into())
            .to_string()
            .contains("jail_chain1_1"));
    }
}
