//! Wallet preparation and the staking rotation scenario.

use std::time::Duration;

use jailwatch_core::{Outcome, ScenarioInput, StateClient, StateResult, TxoPointer};

use crate::error::{Result, TestError};

/// Staking addresses created per wallet.
pub const ADDRESSES_PER_WALLET: usize = 2;

/// Pause after a wallet sync, before reading its history.
pub const SYNC_SETTLE: Duration = Duration::from_secs(2);

/// Accepts `Applied` and `AlreadyExists`; anything else aborts the run.
fn tolerate_existing(step: &str, wallet: &str, result: StateResult<Outcome>) -> Result<()> {
    match result? {
        Outcome::Applied => {
            tracing::debug!(step, wallet, "applied");
            Ok(())
        }
        Outcome::AlreadyExists => {
            tracing::info!(step, wallet, "already exists, ignoring");
            Ok(())
        }
        Outcome::Rejected(reason) => Err(TestError::assertion(format!(
            "{step} for wallet {wallet} rejected: {reason}"
        ))),
    }
}

/// Restores every node wallet, unlocks its sync and creates its staking
/// addresses. Safe to run against wallets that already exist.
pub async fn prepare_wallets(client: &dyn StateClient, input: &ScenarioInput) -> Result<()> {
    tracing::info!(wallets = input.nodes().len(), "restoring wallets");
    for node in input.nodes() {
        let result = client.restore_wallet(&node.label, &node.mnemonic).await;
        tolerate_existing("restore", &node.label, result)?;
    }

    for node in input.nodes() {
        let result = client.unlock_sync(&node.label).await;
        tolerate_existing("unlock sync", &node.label, result)?;
    }

    for node in input.nodes() {
        for _ in 0..ADDRESSES_PER_WALLET {
            let result = client.create_staking_address(&node.label).await;
            tolerate_existing("create staking address", &node.label, result)?;
        }
    }

    tracing::info!("wallets ready");
    Ok(())
}

/// Moves node 0's unbonded stake to its transfer address, then deposits
/// the resulting output into node 1's alternate staking address.
///
/// # Errors
/// Returns [`TestError::Assertion`] if node 0 has no transfer address or
/// its wallet history does not hold exactly one transaction.
pub async fn rotate_stake(client: &dyn StateClient, input: &ScenarioInput) -> Result<String> {
    let source = input.node(0)?;
    let destination = input.node(1)?;
    let transfer = source.transfer_address.as_deref().ok_or_else(|| {
        TestError::assertion(format!("wallet {} has no transfer address", source.label))
    })?;

    let withdraw_txid = client
        .withdraw_all_unbonded(&source.label, &source.alternate_staking_address, transfer)
        .await?;
    tracing::info!(
        wallet = %source.label,
        from = %source.alternate_staking_address,
        to = transfer,
        txid = %withdraw_txid,
        "withdrew unbonded stake"
    );

    client.sync_wallet(&source.label).await?;
    tokio::time::sleep(SYNC_SETTLE).await;

    let history = client.transactions(&source.label, 0, 1).await?;
    let [record] = history.as_slice() else {
        return Err(TestError::assertion(format!(
            "expected 1 transaction in wallet {}, found {}",
            source.label,
            history.len()
        )));
    };

    let inputs = [TxoPointer {
        id: record.transaction_id.clone(),
        index: 0,
    }];
    let deposit_txid = client
        .deposit_stake(&source.label, &destination.alternate_staking_address, &inputs)
        .await?;
    tracing::info!(
        wallet = %source.label,
        to = %destination.alternate_staking_address,
        txid = %deposit_txid,
        "deposited stake"
    );
    Ok(deposit_txid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCounters, MockNetwork};
    use jailwatch_core::{NodeIdentity, TransactionRecord};

    fn input() -> ScenarioInput {
        ScenarioInput::from_nodes(
            ["a", "b"]
                .iter()
                .map(|label| NodeIdentity {
                    label: (*label).to_string(),
                    staking_address: format!("0x{label}0"),
                    alternate_staking_address: format!("0x{label}1"),
                    transfer_address: Some(format!("dcro1{label}")),
                    mnemonic: format!("mnemonic of {label}"),
                })
                .collect(),
        )
    }

    fn record(id: &str) -> TransactionRecord {
        TransactionRecord {
            transaction_id: id.to_string(),
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_prepare_fresh_wallets() {
        let network = MockNetwork::default();
        prepare_wallets(&network.state_client(), &input()).await.unwrap();

        let counters = network.counters();
        assert_eq!(MockCounters::get(&counters.restore_calls), 2);
        assert_eq!(MockCounters::get(&counters.unlock_calls), 2);
        assert_eq!(MockCounters::get(&counters.address_calls), 4);
    }

    #[tokio::test]
    async fn test_prepare_existing_wallet_is_ignored() {
        let network = MockNetwork::default().existing_wallet("a");
        let client = network.state_client();

        prepare_wallets(&client, &input()).await.unwrap();
        // Second run: every wallet exists now.
        prepare_wallets(&client, &input()).await.unwrap();
        assert_eq!(MockCounters::get(&network.counters().restore_calls), 4);
    }

    #[test]
    fn test_rejection_is_fatal() {
        let err = tolerate_existing("restore", "a", Ok(Outcome::Rejected("bad mnemonic".into())))
            .unwrap_err();
        assert!(err.to_string().contains("bad mnemonic"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotate_stake() {
        let network = MockNetwork::default().transactions("a", vec![record("feed01")]);
        let txid = rotate_stake(&network.state_client(), &input()).await.unwrap();

        assert_eq!(txid, "deposit-txid");
        assert_eq!(
            network.withdrawals(),
            vec![("a".to_string(), "0xa1".to_string(), "dcro1a".to_string())]
        );
        let deposits = network.deposits();
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].1, "0xb1");
        assert_eq!(
            deposits[0].2,
            vec![TxoPointer {
                id: "feed01".into(),
                index: 0
            }]
        );
        assert_eq!(MockCounters::get(&network.counters().sync_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotate_stake_empty_history() {
        let network = MockNetwork::default();
        let err = rotate_stake(&network.state_client(), &input()).await.unwrap_err();
        assert!(matches!(err, TestError::Assertion(_)));
        assert!(network.deposits().is_empty());
    }

    #[tokio::test]
    async fn test_rotate_stake_needs_transfer_address() {
        let mut nodes = input().nodes().to_vec();
        nodes[0].transfer_address = None;
        let network = MockNetwork::default();

        let err = rotate_stake(&network.state_client(), &ScenarioInput::from_nodes(nodes))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("transfer address"));
        assert!(network.withdrawals().is_empty());
    }
}
