//! Read-only projections of live external state.
//!
//! Nothing in this module is cached between checks: every snapshot is
//! re-fetched from the chain or the container runtime each time a
//! scenario looks at it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one harness run, attached to every log span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Creates a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Size of the active validator set at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorSetSnapshot {
    /// Number of active validators.
    pub count: usize,
}

impl ValidatorSetSnapshot {
    /// Snapshot with the given validator count.
    #[must_use]
    pub const fn new(count: usize) -> Self {
        Self { count }
    }

    /// Snapshot used when the endpoint could not be reached.
    #[must_use]
    pub const fn unreachable() -> Self {
        Self { count: 0 }
    }
}

/// Staking and punishment state of one staking address.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StakingState {
    /// Punishment record; `None` means the address is not jailed.
    #[serde(default)]
    pub punishment: Option<serde_json::Value>,

    /// Remaining fields as returned by the node (bonded, unbonded, nonce, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StakingState {
    /// Returns true while the address is still punished.
    #[must_use]
    pub const fn is_jailed(&self) -> bool {
        self.punishment.is_some()
    }
}

/// Result of an idempotent mutation against the chain or wallet.
///
/// Fatal causes are carried by the `Err` arm of the surrounding `Result`;
/// every variant here is a state the harness may continue from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The request was accepted.
    Applied,
    /// The target already existed (wallet restored, address created).
    AlreadyExists,
    /// The node rejected the request, e.g. still inside a lock-out window.
    Rejected(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

/// Opaque handle to one running container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Runtime-assigned container ID.
    pub id: String,
    /// Container name.
    pub name: String,
}

impl ContainerHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Running containers keyed by container name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSet {
    containers: BTreeMap<String, ContainerHandle>,
}

impl ContainerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a container, replacing any previous entry with the same name.
    pub fn insert(&mut self, handle: ContainerHandle) {
        self.containers.insert(handle.name.clone(), handle);
    }

    /// Removes a container by name.
    pub fn remove(&mut self, name: &str) -> Option<ContainerHandle> {
        self.containers.remove(name)
    }

    /// Returns true if a container with this name is running.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    /// Looks up a container by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ContainerHandle> {
        self.containers.get(name)
    }

    /// Names of all running containers, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.containers.keys().map(String::as_str)
    }

    /// Number of running containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Returns true if nothing is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

impl FromIterator<ContainerHandle> for ContainerSet {
    fn from_iter<I: IntoIterator<Item = ContainerHandle>>(iter: I) -> Self {
        let mut set = Self::new();
        for handle in iter {
            set.insert(handle);
        }
        set
    }
}

/// One entry of a wallet's transaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction ID (hex).
    pub transaction_id: String,

    /// Remaining fields (kind, value, block height, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Pointer to one output of a transaction, used as a staking deposit input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxoPointer {
    /// Transaction ID (hex).
    pub id: String,
    /// Output index.
    pub index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn test_unreachable_snapshot_is_zero() {
        assert_eq!(ValidatorSetSnapshot::unreachable().count, 0);
        assert_eq!(ValidatorSetSnapshot::new(3).count, 3);
    }

    #[test]
    fn test_staking_state_null_punishment() {
        let state: StakingState = serde_json::from_str(
            r#"{"address":"0xabc","bonded":"100","punishment":null}"#,
        )
        .unwrap();
        assert!(!state.is_jailed());
        assert_eq!(state.extra["bonded"], "100");
    }

    #[test]
    fn test_staking_state_missing_punishment() {
        let state: StakingState = serde_json::from_str(r#"{"nonce":3}"#).unwrap();
        assert!(!state.is_jailed());
    }

    #[test]
    fn test_staking_state_jailed() {
        let state: StakingState = serde_json::from_str(
            r#"{"punishment":{"kind":"NonLive","jailed_until":1590000000}}"#,
        )
        .unwrap();
        assert!(state.is_jailed());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Applied.to_string(), "applied");
        assert_eq!(Outcome::AlreadyExists.to_string(), "already exists");
        assert!(
            Outcome::Rejected("still jailed".into())
                .to_string()
                .contains("still jailed")
        );
    }

    #[test]
    fn test_container_set_lookup() {
        let set: ContainerSet = vec![
            ContainerHandle::new("bbb", "jail_chain1_1"),
            ContainerHandle::new("aaa", "jail_chain0_1"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
        assert!(set.contains("jail_chain1_1"));
        assert!(!set.contains("jail_chain2_1"));
        assert_eq!(set.get("jail_chain1_1").map(|h| h.id.as_str()), Some("bbb"));
        assert_eq!(
            set.names().collect::<Vec<_>>(),
            vec!["jail_chain0_1", "jail_chain1_1"]
        );
    }

    #[test]
    fn test_transaction_record_parse() {
        let record: TransactionRecord = serde_json::from_str(
            r#"{"transaction_id":"deadbeef","kind":"Incoming","block_height":"7"}"#,
        )
        .unwrap();
        assert_eq!(record.transaction_id, "deadbeef");
        assert_eq!(record.extra["kind"], "Incoming");
    }
}
