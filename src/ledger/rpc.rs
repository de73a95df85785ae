use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ledger::{Address, LedgerClient, SubmissionError, TxHash, Wei};

/// Gas used by a plain value transfer to an externally owned account.
const TRANSFER_GAS: u64 = 21_000;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Ethereum JSON-RPC transfer client.
///
/// Builds a legacy transfer (`nonce`, `gasPrice`, fixed 21000 gas, `chainId`)
/// from the faucet's sender account. When a signer endpoint is configured the
/// transaction is signed there with `eth_signTransaction` and broadcast with
/// `eth_sendRawTransaction`; otherwise the node signs it via
/// `eth_sendTransaction`.
#[derive(Clone)]
pub struct JsonRpcLedger {
    http: reqwest::Client,
    node_url: String,
    signer_url: Option<String>,
    sender: Address,
    chain_id: u64,
    next_nonce: Arc<Mutex<Option<u64>>>,
    request_ids: Arc<AtomicU64>,
}

impl fmt::Debug for JsonRpcLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcLedger")
            .field("node_url", &self.node_url)
            .field("signer_url", &self.signer_url)
            .field("sender", &self.sender)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl JsonRpcLedger {
    pub fn new(node_url: impl Into<String>, sender: Address, chain_id: u64, request_timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(JsonRpcLedger {
            http,
            node_url: node_url.into(),
            signer_url: None,
            sender,
            chain_id,
            next_nonce: Arc::new(Mutex::new(None)),
            request_ids: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn with_signer(mut self, signer_url: impl Into<String>) -> Self {
        self.signer_url = Some(signer_url.into());
        self
    }

    async fn call(&self, url: &str, method: &str, params: Value) -> Result<Value, SubmissionError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_ids.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self.http.post(url).json(&request).send().await.map_err(|e| SubmissionError::NetworkUnreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubmissionError::NetworkUnreachable(format!("{} returned HTTP {}", method, status)));
        }

        let body: RpcResponse = response.json().await.map_err(|e| SubmissionError::Internal(format!("malformed {} response: {}", method, e)))?;
        if let Some(error) = body.error {
            return Err(classify_rpc_error(error));
        }
        body.result.ok_or_else(|| SubmissionError::Internal(format!("{} returned neither result nor error", method)))
    }

    async fn pending_nonce(&self) -> Result<u64, SubmissionError> {
        let count = self.call(&self.node_url, "eth_getTransactionCount", json!([self.sender.to_wire(), "pending"])).await?;
        let count = parse_quantity(&count, "eth_getTransactionCount")?;
        u64::try_from(count).map_err(|_| SubmissionError::Internal("nonce does not fit in 64 bits".to_string()))
    }

    /// Hands out the next nonce. Concurrent transfers each get a distinct
    /// value even before the node has seen the earlier ones.
    async fn reserve_nonce(&self) -> Result<NonceReservation, SubmissionError> {
        let on_chain = self.pending_nonce().await?;

        let nonce = {
            let mut next_nonce = lock_cache(&self.next_nonce);
            let nonce = match *next_nonce {
                Some(cached) if cached > on_chain => cached,
                _ => on_chain,
            };
            *next_nonce = Some(nonce + 1);
            nonce
        };

        Ok(NonceReservation {
            nonce,
            cache: Arc::clone(&self.next_nonce),
            settled: false,
        })
    }

    async fn send_transfer(&self, destination: &Address, amount: Wei, nonce: u64) -> Result<TxHash, SubmissionError> {
        let gas_price = self.call(&self.node_url, "eth_gasPrice", json!([])).await?;
        let gas_price = parse_quantity(&gas_price, "eth_gasPrice")?;

        let transaction = json!({
            "from": self.sender.to_wire(),
            "to": destination.to_wire(),
            "value": amount.to_quantity(),
            "gas": format!("{:#x}", TRANSFER_GAS),
            "gasPrice": format!("{:#x}", gas_price),
            "nonce": format!("{:#x}", nonce),
            "chainId": format!("{:#x}", self.chain_id),
        });

        let hash = match &self.signer_url {
            Some(signer_url) => {
                let signed = self.call(signer_url, "eth_signTransaction", json!([transaction])).await?;
                let raw = raw_transaction(&signed)?;
                self.call(&self.node_url, "eth_sendRawTransaction", json!([raw])).await?
            }
            None => self.call(&self.node_url, "eth_sendTransaction", json!([transaction])).await?,
        };

        hash.as_str().map(TxHash::new).ok_or_else(|| SubmissionError::Internal(format!("transaction hash is not a string: {}", hash)))
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    #[tracing::instrument(skip_all, fields(destination = %destination))]
    async fn submit(&self, destination: &Address, amount: Wei) -> Result<TxHash, SubmissionError> {
        let reservation = self.reserve_nonce().await?;
        tracing::debug!("Submitting transfer of {} with nonce {}", amount, reservation.nonce);

        let result = self.send_transfer(destination, amount, reservation.nonce).await;
        match &result {
            Ok(_) => reservation.settle(),
            Err(e) => tracing::warn!("Transfer with nonce {} failed: {}", reservation.nonce, e),
        }
        result
    }
}

/// A nonce taken from the local cache for one transfer.
///
/// Unless the transfer is settled, dropping the reservation forgets the
/// cached next nonce so the following transfer re-reads it from the node.
/// This covers failed sends and futures cancelled mid-flight (e.g. by a
/// caller's timeout), either of which may leave the nonce unused.
struct NonceReservation {
    nonce: u64,
    cache: Arc<Mutex<Option<u64>>>,
    settled: bool,
}

impl NonceReservation {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for NonceReservation {
    fn drop(&mut self) {
        if !self.settled {
            lock_cache(&self.cache).take();
        }
    }
}

fn lock_cache(cache: &Mutex<Option<u64>>) -> MutexGuard<'_, Option<u64>> {
    // A poisoned lock still holds a valid number.
    cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn classify_rpc_error(error: RpcErrorBody) -> SubmissionError {
    let message = error.message.to_lowercase();
    if message.contains("insufficient funds") {
        SubmissionError::InsufficientFunds
    } else if message.contains("invalid address") || message.contains("invalid recipient") {
        SubmissionError::InvalidRecipient
    } else {
        SubmissionError::Rejected(format!("{} (code {})", error.message, error.code))
    }
}

fn parse_quantity(value: &Value, method: &str) -> Result<u128, SubmissionError> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix("0x"))
        .and_then(|digits| u128::from_str_radix(digits, 16).ok())
        .ok_or_else(|| SubmissionError::Internal(format!("{} returned an invalid quantity: {}", method, value)))
}

/// Signers answer either `{"raw": "0x..", "tx": {..}}` (geth, Clef) or the
/// raw hex string directly.
fn raw_transaction(signed: &Value) -> Result<String, SubmissionError> {
    signed
        .get("raw")
        .unwrap_or(signed)
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SubmissionError::Internal(format!("signer returned no raw transaction: {}", signed)))
}
