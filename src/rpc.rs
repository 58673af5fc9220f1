// src/rpc.rs
//! Receipt lookups that move ledger entries from pending to confirmed

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::farming::FarmingError;
use crate::ledger::{TransactionLedger, TransactionReceipt};

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: String,
    id: u64,
    method: String,
    params: Vec<Value>,
}

pub struct ReceiptClient {
    client: Client,
    rpc_url: String,
}

impl ReceiptClient {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            client: Client::new(),
            rpc_url: rpc_url.to_string(),
        }
    }

    /// `Ok(None)` while the transaction is not yet mined
    pub async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, FarmingError> {
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: 1,
            method: "eth_getTransactionReceipt".to_string(),
            params: vec![Value::String(hash.to_string())],
        };

        let response = self.client
            .post(&self.rpc_url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| FarmingError::RpcError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            return Err(FarmingError::RpcError(format!("HTTP {}", response.status())));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| FarmingError::RpcError(format!("Failed to parse response: {}", e)))?;

        parse_receipt_response(&json)
    }

    /// Look up receipts for `hashes`, skipping the ones that fail or are still pending
    pub async fn fetch_receipts(&self, hashes: &[String]) -> Vec<(String, TransactionReceipt)> {
        let mut found = Vec::new();
        for hash in hashes {
            match self.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => found.push((hash.clone(), receipt)),
                Ok(None) => log::debug!("Transaction {} not mined yet", hash),
                Err(e) => log::warn!("Receipt lookup for {} failed: {}", hash, e),
            }
        }
        found
    }
}

/// Finalize the ledger entries `receipts` belong to. Returns true when the ledger changed.
pub fn apply_receipts(
    ledger: &mut TransactionLedger,
    chain_id: u64,
    receipts: Vec<(String, TransactionReceipt)>,
    now_ms: i64,
) -> bool {
    let mut changed = false;
    for (hash, receipt) in receipts {
        changed |= ledger.finalize_transaction(chain_id, &hash, receipt, now_ms);
    }
    changed
}

fn hex_quantity(value: &Value, field: &str) -> Result<u64, FarmingError> {
    let text = value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| FarmingError::RpcError(format!("receipt is missing {}", field)))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16)
        .map_err(|e| FarmingError::RpcError(format!("receipt {} '{}': {}", field, text, e)))
}

fn parse_receipt_response(json: &Value) -> Result<Option<TransactionReceipt>, FarmingError> {
    if let Some(error) = json.get("error") {
        return Err(FarmingError::RpcError(format!("{:?}", error)));
    }

    let result = match json.get("result") {
        Some(Value::Null) | None => return Ok(None),
        Some(result) => result,
    };

    let string_field = |field: &str| -> Result<String, FarmingError> {
        result
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| FarmingError::RpcError(format!("receipt is missing {}", field)))
    };

    Ok(Some(TransactionReceipt {
        transaction_hash: string_field("transactionHash")?,
        block_hash: string_field("blockHash")?,
        block_number: hex_quantity(result, "blockNumber")?,
        status: hex_quantity(result, "status").ok(),
    }))
}
