//! HTTP adapter for the chain under test.
//!
//! Two endpoints are involved:
//! - the Tendermint RPC (`GET /validators`, `GET /status`), and
//! - the wallet daemon's JSON-RPC API (wallets, staking transactions).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::adapter::{StateClient, StateError, StateResult};
use crate::config::NetworkConfig;
use crate::types::{Outcome, StakingState, TransactionRecord, TxoPointer};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// [`StateClient`] backed by the Tendermint RPC and the wallet JSON-RPC API.
pub struct RpcStateClient {
    chain_rpc_url: String,
    client_rpc_url: String,
    passphrase: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    /// Wallet label -> encryption key, filled by restore / getEncKey.
    enckeys: RwLock<HashMap<String, String>>,
}

impl std::fmt::Debug for RpcStateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcStateClient")
            .field("chain_rpc_url", &self.chain_rpc_url)
            .field("client_rpc_url", &self.client_rpc_url)
            .field("http", &"reqwest::Client")
            .finish_non_exhaustive()
    }
}

impl RpcStateClient {
    /// Creates a client for the endpoints in `network`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(network: &NetworkConfig, passphrase: impl Into<String>) -> StateResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(network.request_timeout)
            .build()
            .map_err(|e| StateError::protocol(format!("failed to build http client: {e}")))?;

        Ok(Self {
            chain_rpc_url: network.chain_rpc_url.trim_end_matches('/').to_string(),
            client_rpc_url: network.client_rpc_url.clone(),
            passphrase: passphrase.into(),
            http,
            next_id: AtomicU64::new(1),
            enckeys: RwLock::new(HashMap::new()),
        })
    }

    /// `GET` a Tendermint route and return its `result` member.
    async fn tendermint_get(&self, route: &str) -> StateResult<Value> {
        let url = format!("{}/{route}", self.chain_rpc_url);
        let response = self.http.get(&url).send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StateError::Http(format!("GET {url} returned {status}")));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| StateError::protocol(format!("invalid JSON from {url}: {e}")))?;

        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(StateError::protocol(format!("{route}: response has no result"))),
        }
    }

    /// Calls a wallet JSON-RPC method; `Ok(None)` when the result is null.
    async fn call_raw(&self, method: &str, params: Value) -> StateResult<Option<Value>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        tracing::debug!(method, id, "json-rpc call");

        let response = self
            .http
            .post(&self.client_rpc_url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        // Error objects may arrive with a non-2xx status, so parse first.
        let parsed: JsonRpcResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(StateError::Http(format!("{method} returned {status}: {body}")));
            }
            Err(e) => {
                return Err(StateError::protocol(format!("{method}: invalid response: {e}")));
            }
        };

        if let Some(error) = parsed.error {
            return Err(StateError::rpc(error.code, error.message));
        }

        Ok(parsed.result.filter(|v| !v.is_null()))
    }

    /// Calls a wallet JSON-RPC method and decodes a non-null result.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> StateResult<T> {
        let result = self
            .call_raw(method, params)
            .await?
            .ok_or_else(|| StateError::protocol(format!("{method}: null result")))?;
        serde_json::from_value(result)
            .map_err(|e| StateError::protocol(format!("{method}: unexpected result: {e}")))
    }

    fn cached_enckey(&self, wallet: &str) -> Option<String> {
        self.enckeys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(wallet)
            .cloned()
    }

    fn store_enckey(&self, wallet: &str, enckey: String) {
        self.enckeys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(wallet.to_string(), enckey);
    }

    fn create_request(&self, wallet: &str) -> Value {
        json!({ "name": wallet, "passphrase": self.passphrase })
    }

    /// `{name, enckey}` request for `wallet`, fetching the key on first use.
    async fn wallet_request(&self, wallet: &str) -> StateResult<Value> {
        let enckey = match self.cached_enckey(wallet) {
            Some(enckey) => enckey,
            None => {
                let enckey: String = self
                    .call("wallet_getEncKey", json!([self.create_request(wallet)]))
                    .await?;
                self.store_enckey(wallet, enckey.clone());
                enckey
            }
        };
        Ok(json!({ "name": wallet, "enckey": enckey }))
    }
}

/// Connection failures and timeouts are "not reachable yet"; the rest is fatal.
fn transport_error(err: reqwest::Error) -> StateError {
    if err.is_connect() || err.is_timeout() {
        StateError::unreachable(err.to_string())
    } else {
        StateError::Http(err.to_string())
    }
}

fn parse_validator_count(result: &Value) -> StateResult<usize> {
    result
        .get("validators")
        .and_then(Value::as_array)
        .map(Vec::len)
        .ok_or_else(|| StateError::protocol("validators: missing validator list"))
}

fn parse_block_height(result: &Value) -> StateResult<u64> {
    let height = result
        .get("sync_info")
        .and_then(|info| info.get("latest_block_height"))
        .ok_or_else(|| StateError::protocol("status: missing latest_block_height"))?;

    // Tendermint encodes 64-bit integers as strings.
    match height {
        Value::String(s) => s
            .parse()
            .map_err(|e| StateError::protocol(format!("status: bad block height {s:?}: {e}"))),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| StateError::protocol(format!("status: bad block height {n}"))),
        other => Err(StateError::protocol(format!(
            "status: bad block height {other}"
        ))),
    }
}

/// Maps "already exists" refusals to [`Outcome::AlreadyExists`].
fn idempotent(result: StateResult<Option<Value>>) -> StateResult<Outcome> {
    match result {
        Ok(_) => Ok(Outcome::Applied),
        Err(e) if e.is_already_exists() => Ok(Outcome::AlreadyExists),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl StateClient for RpcStateClient {
    async fn validator_count(&self) -> StateResult<usize> {
        let result = self.tendermint_get("validators").await?;
        parse_validator_count(&result)
    }

    async fn latest_block_height(&self) -> StateResult<u64> {
        let result = self.tendermint_get("status").await?;
        parse_block_height(&result)
    }

    async fn staking_state(&self, wallet: &str, address: &str) -> StateResult<StakingState> {
        self.call("staking_state", json!([wallet, address])).await
    }

    async fn unjail(&self, wallet: &str, address: &str) -> StateResult<Outcome> {
        let request = self.wallet_request(wallet).await?;
        match self.call_raw("staking_unjail", json!([request, address])).await {
            Ok(txid) => {
                tracing::debug!(address, txid = ?txid, "unjail submitted");
                Ok(Outcome::Applied)
            }
            Err(StateError::Rpc { message, .. }) => Ok(Outcome::Rejected(message)),
            Err(e) => Err(e),
        }
    }

    async fn restore_wallet(&self, wallet: &str, mnemonic: &str) -> StateResult<Outcome> {
        let result = self
            .call_raw(
                "wallet_restore",
                json!([self.create_request(wallet), mnemonic]),
            )
            .await;

        match result {
            Ok(Some(Value::String(enckey))) => {
                self.store_enckey(wallet, enckey);
                Ok(Outcome::Applied)
            }
            Ok(other) => Err(StateError::protocol(format!(
                "wallet_restore: expected an encryption key, got {other:?}"
            ))),
            Err(e) if e.is_already_exists() => {
                // Prime the key cache so later wallet calls work.
                self.wallet_request(wallet).await?;
                Ok(Outcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_staking_address(&self, wallet: &str) -> StateResult<Outcome> {
        let request = self.wallet_request(wallet).await?;
        idempotent(
            self.call_raw("wallet_createStakingAddress", json!([request]))
                .await,
        )
    }

    async fn unlock_sync(&self, wallet: &str) -> StateResult<Outcome> {
        let request = self.wallet_request(wallet).await?;
        idempotent(self.call_raw("sync_unlockWallet", json!([request])).await)
    }

    async fn sync_wallet(&self, wallet: &str) -> StateResult<()> {
        let request = self.wallet_request(wallet).await?;
        self.call_raw("sync", json!([request])).await.map(|_| ())
    }

    async fn transactions(
        &self,
        wallet: &str,
        offset: usize,
        limit: usize,
    ) -> StateResult<Vec<TransactionRecord>> {
        let request = self.wallet_request(wallet).await?;
        self.call("wallet_transactions", json!([request, offset, limit, false]))
            .await
    }

    async fn deposit_stake(
        &self,
        wallet: &str,
        to_address: &str,
        inputs: &[TxoPointer],
    ) -> StateResult<String> {
        let request = self.wallet_request(wallet).await?;
        self.call("staking_depositStake", json!([request, to_address, inputs]))
            .await
    }

    async fn withdraw_all_unbonded(
        &self,
        wallet: &str,
        from_address: &str,
        to_address: &str,
    ) -> StateResult<String> {
        let request = self.wallet_request(wallet).await?;
        self.call(
            "staking_withdrawAllUnbondedStake",
            json!([request, from_address, to_address, Vec::<String>::new()]),
        )
        .await
    }
}
