pub mod chains;

use serde::{Deserialize, Serialize};

use chains::SupportedChainId;

/// Endpoints and identity the dashboard runs against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// GraphQL endpoint serving farming deposits
    pub subgraph_url: String,
    /// JSON-RPC node used to look up transaction receipts
    pub rpc_url: String,
    /// Wallet bridge that signs and sends farming actions
    pub bridge_url: String,
    pub chain_id: u64,
    /// Connected account, if any
    pub account: Option<String>,
    /// How often pending transactions are checked for a receipt
    pub receipt_poll_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            subgraph_url: "https://api.thegraph.com/subgraphs/name/iliaazhel/farming-test".to_string(),
            rpc_url: "https://rpc.gnosischain.com".to_string(),
            bridge_url: "http://127.0.0.1:7777".to_string(),
            chain_id: SupportedChainId::Polygon as u64,
            account: None,
            receipt_poll_ms: 4_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            subgraph_url: std::env::var("FARMING_SUBGRAPH_URL")
                .unwrap_or(defaults.subgraph_url),
            rpc_url: std::env::var("FARMING_RPC_URL")
                .unwrap_or(defaults.rpc_url),
            bridge_url: std::env::var("FARMING_BRIDGE_URL")
                .unwrap_or(defaults.bridge_url),
            chain_id: std::env::var("FARMING_CHAIN_ID")
                .ok()
                .and_then(|v| parse_chain_id(&v))
                .unwrap_or(defaults.chain_id),
            account: std::env::var("FARMING_ACCOUNT").ok().filter(|a| !a.is_empty()),
            receipt_poll_ms: std::env::var("FARMING_RECEIPT_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.receipt_poll_ms),
        }
    }

    /// Check the configuration points at a supported chain with usable endpoints
    pub fn is_valid(&self) -> bool {
        SupportedChainId::from_u64(self.chain_id).is_some()
            && !self.subgraph_url.is_empty()
            && !self.rpc_url.is_empty()
            && !self.bridge_url.is_empty()
            && self.receipt_poll_ms > 0
    }
}

// Accepts "100" as well as "0x64"
fn parse_chain_id(value: &str) -> Option<u64> {
    match value.strip_prefix("0x") {
        Some(hex_digits) => u64::from_str_radix(hex_digits, 16).ok(),
        None => value.parse().ok(),
    }
}
