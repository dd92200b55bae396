//! Node identities loaded from the network-setup descriptor.
//!
//! The descriptor is read exactly once at startup. Identities are never
//! mutated afterwards; scenarios borrow them from [`ScenarioInput`].

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::{HarnessError, Result};

/// Raw descriptor as written by network setup (`nodes_info.json`).
#[derive(Debug, Deserialize)]
struct Descriptor {
    nodes: Vec<NodeRecord>,
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    staking: Vec<String>,
    #[serde(default)]
    transfer: Vec<String>,
    mnemonic: String,
}

/// Addresses and recovery phrase of one validator node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    /// Wallet label used against the wallet daemon (`a`, `b`, ...).
    pub label: String,
    /// Primary staking address (the validator's bonded account).
    pub staking_address: String,
    /// Alternate staking address.
    pub alternate_staking_address: String,
    /// First transfer address, if the descriptor lists one.
    pub transfer_address: Option<String>,
    /// Mnemonic recovery phrase.
    pub mnemonic: String,
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "wallet={}", self.label)?;
        writeln!(f, "  staking= {}", self.staking_address)?;
        writeln!(f, "  staking1= {}", self.alternate_staking_address)?;
        if let Some(transfer) = &self.transfer_address {
            writeln!(f, "  transfer= {transfer}")?;
        }
        write!(f, "  mnemonics= {}", self.mnemonic)
    }
}

/// All node identities of the network under test, in descriptor order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioInput {
    nodes: Vec<NodeIdentity>,
}

impl ScenarioInput {
    /// Loads and validates the descriptor at `path`.
    ///
    /// # Errors
    /// Returns an error if the file is missing or its structure is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::descriptor(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parses a descriptor from its JSON text.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or a node is incomplete.
    pub fn from_json(content: &str) -> Result<Self> {
        let descriptor: Descriptor = serde_json::from_str(content)
            .map_err(|e| HarnessError::descriptor(format!("failed to parse descriptor: {e}")))?;

        if descriptor.nodes.is_empty() {
            return Err(HarnessError::descriptor("descriptor lists no nodes"));
        }

        let nodes = descriptor
            .nodes
            .into_iter()
            .enumerate()
            .map(|(index, record)| NodeIdentity::from_record(index, record))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { nodes })
    }

    /// Builds input directly from identities.
    #[must_use]
    pub fn from_nodes(nodes: Vec<NodeIdentity>) -> Self {
        Self { nodes }
    }

    /// Returns the identity at `index`.
    ///
    /// # Errors
    /// Returns an error if the descriptor has fewer nodes.
    pub fn node(&self, index: usize) -> Result<&NodeIdentity> {
        self.nodes.get(index).ok_or_else(|| {
            HarnessError::descriptor(format!(
                "node {index} requested but descriptor lists {} nodes",
                self.nodes.len()
            ))
        })
    }

    /// All identities in descriptor order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeIdentity] {
        &self.nodes
    }

    /// Logs every identity unchanged.
    pub fn display_info(&self) {
        for identity in &self.nodes {
            tracing::info!("{identity}");
        }
    }
}

impl NodeIdentity {
    fn from_record(index: usize, record: NodeRecord) -> Result<Self> {
        let mut staking = record.staking.into_iter();
        let (Some(staking_address), Some(alternate_staking_address)) =
            (staking.next(), staking.next())
        else {
            return Err(HarnessError::descriptor(format!(
                "node {index} needs a primary and an alternate staking address"
            )));
        };

        if record.mnemonic.trim().is_empty() {
            return Err(HarnessError::descriptor(format!(
                "node {index} has an empty mnemonic"
            )));
        }

        Ok(Self {
            label: wallet_label(index)?,
            staking_address,
            alternate_staking_address,
            transfer_address: record.transfer.into_iter().next(),
            mnemonic: record.mnemonic,
        })
    }
}

/// Wallet label for the node at `index`: `a`, `b`, `c`, ...
fn wallet_label(index: usize) -> Result<String> {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map(|i| char::from(b'a' + i).to_string())
        .ok_or_else(|| HarnessError::descriptor(format!("too many nodes: {}", index + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_NODES: &str = r#"{
        "nodes": [
            {
                "staking": ["0x3a10000000000000000000000000000000000001", "0x3a10000000000000000000000000000000000002"],
                "transfer": ["dcro1aaaa"],
                "mnemonic": "ordinary mandate edit father snack mesh history identify print borrow skate unhappy"
            },
            {
                "staking": ["0x4b20000000000000000000000000000000000001", "0x4b20000000000000000000000000000000000002"],
                "mnemonic": "lunar fatal ribbon drip cargo cannon swear clever brisk feature vacuum rebuild"
            }
        ]
    }"#;

    #[test]
    fn test_parse_two_nodes() {
        let input = ScenarioInput::from_json(TWO_NODES).unwrap();
        assert_eq!(input.nodes().len(), 2);

        let node0 = input.node(0).unwrap();
        assert_eq!(node0.label, "a");
        assert_eq!(
            node0.staking_address,
            "0x3a10000000000000000000000000000000000001"
        );
        assert_eq!(node0.transfer_address.as_deref(), Some("dcro1aaaa"));

        let node1 = input.node(1).unwrap();
        assert_eq!(node1.label, "b");
        assert!(node1.transfer_address.is_none());
    }

    #[test]
    fn test_display_echoes_identity_unchanged() {
        let input = ScenarioInput::from_json(TWO_NODES).unwrap();
        for node in input.nodes() {
            let shown = node.to_string();
            assert!(shown.contains(&node.staking_address));
            assert!(shown.contains(&node.alternate_staking_address));
            assert!(shown.contains(&node.mnemonic));
        }
        let node0 = input.node(0).unwrap().to_string();
        assert!(node0.contains("transfer= dcro1aaaa"));
    }

    #[test]
    fn test_missing_alternate_staking_address() {
        let json = r#"{"nodes":[{"staking":["0x01"],"mnemonic":"one two"}]}"#;
        let err = ScenarioInput::from_json(json).unwrap_err();
        assert!(err.to_string().contains("alternate staking address"));
    }

    #[test]
    fn test_empty_mnemonic() {
        let json = r#"{"nodes":[{"staking":["0x01","0x02"],"mnemonic":"  "}]}"#;
        assert!(ScenarioInput::from_json(json).is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(ScenarioInput::from_json(r#"{"nodes": 3}"#).is_err());
        assert!(ScenarioInput::from_json(r#"{"nodes": []}"#).is_err());
        assert!(ScenarioInput::from_json("").is_err());
    }

    #[test]
    fn test_node_out_of_range() {
        let input = ScenarioInput::from_json(TWO_NODES).unwrap();
        let err = input.node(2).unwrap_err();
        assert!(err.to_string().contains("lists 2 nodes"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_NODES.as_bytes()).unwrap();

        let input = ScenarioInput::load(file.path()).unwrap();
        assert_eq!(input, ScenarioInput::from_json(TWO_NODES).unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ScenarioInput::load("/nonexistent/nodes_info.json").unwrap_err();
        assert!(matches!(err, HarnessError::Descriptor(_)));
    }

    #[test]
    fn test_wallet_labels() {
        assert_eq!(wallet_label(0).unwrap(), "a");
        assert_eq!(wallet_label(2).unwrap(), "c");
        assert_eq!(wallet_label(25).unwrap(), "z");
        assert!(wallet_label(26).is_err());
    }
}
