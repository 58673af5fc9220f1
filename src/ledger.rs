// src/ledger.rs
//! Session transaction ledger, keyed by chain id and then by hash.

use crate::context::WalletContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transactions older than this can no longer satisfy a pending confirmation
pub const RECENT_WINDOW_MS: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: u64,
    /// 1 on success, 0 on revert
    pub status: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    pub from: String,
    pub summary: Option<String>,
    /// Epoch millis
    pub added_time: i64,
    pub confirmed_time: Option<i64>,
    pub receipt: Option<TransactionReceipt>,
}

impl TransactionRecord {
    pub fn is_confirmed(&self) -> bool {
        self.receipt.is_some()
    }

    pub fn is_recent(&self, now_ms: i64) -> bool {
        now_ms - self.added_time < RECENT_WINDOW_MS
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionLedger {
    chains: HashMap<u64, HashMap<String, TransactionRecord>>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly sent transaction. Returns false if the hash is already known.
    pub fn add_transaction(
        &mut self,
        ctx: &WalletContext,
        hash: &str,
        summary: Option<String>,
        now_ms: i64,
    ) -> bool {
        let txs = self.chains.entry(ctx.chain_id).or_default();
        if txs.contains_key(hash) {
            log::warn!("Transaction {} already tracked on chain {}", hash, ctx.chain_id);
            return false;
        }
        txs.insert(
            hash.to_string(),
            TransactionRecord {
                hash: hash.to_string(),
                from: ctx.account.clone(),
                summary,
                added_time: now_ms,
                confirmed_time: None,
                receipt: None,
            },
        );
        true
    }

    /// Attach a receipt. Unknown or already confirmed hashes are left alone.
    pub fn finalize_transaction(
        &mut self,
        chain_id: u64,
        hash: &str,
        receipt: TransactionReceipt,
        now_ms: i64,
    ) -> bool {
        let Some(tx) = self.chains.get_mut(&chain_id).and_then(|txs| txs.get_mut(hash)) else {
            return false;
        };
        if tx.receipt.is_some() {
            return false;
        }
        log::info!("Transaction {} confirmed in block {}", hash, receipt.block_number);
        tx.receipt = Some(receipt);
        tx.confirmed_time = Some(now_ms);
        true
    }

    pub fn get(&self, chain_id: u64, hash: &str) -> Option<&TransactionRecord> {
        self.chains.get(&chain_id).and_then(|txs| txs.get(hash))
    }

    pub fn transactions(&self, chain_id: u64) -> Vec<&TransactionRecord> {
        self.chains
            .get(&chain_id)
            .map(|txs| txs.values().collect())
            .unwrap_or_default()
    }

    /// Transactions added within the last 24 hours, newest first
    pub fn recent_transactions(&self, chain_id: u64, now_ms: i64) -> Vec<&TransactionRecord> {
        let mut txs: Vec<&TransactionRecord> = self
            .transactions(chain_id)
            .into_iter()
            .filter(|tx| tx.is_recent(now_ms))
            .collect();
        txs.sort_by(|a, b| b.added_time.cmp(&a.added_time));
        txs
    }

    pub fn confirmed_hashes(&self, chain_id: u64, now_ms: i64) -> Vec<&str> {
        self.recent_transactions(chain_id, now_ms)
            .into_iter()
            .filter(|tx| tx.is_confirmed())
            .map(|tx| tx.hash.as_str())
            .collect()
    }

    pub fn pending_hashes(&self, chain_id: u64, now_ms: i64) -> Vec<String> {
        self.recent_transactions(chain_id, now_ms)
            .into_iter()
            .filter(|tx| !tx.is_confirmed())
            .map(|tx| tx.hash.clone())
            .collect()
    }

    /// True when `hash` was added within the window and carries a receipt
    pub fn is_recently_confirmed(&self, chain_id: u64, hash: &str, now_ms: i64) -> bool {
        self.get(chain_id, hash)
            .map(|tx| tx.is_recent(now_ms) && tx.is_confirmed())
            .unwrap_or(false)
    }
}
