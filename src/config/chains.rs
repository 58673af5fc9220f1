// src/config/chains.rs
//! Supported chains and their explorer metadata

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedChainId {
    Polygon = 0x64,
}

pub const ALL_SUPPORTED_CHAIN_IDS: &[SupportedChainId] = &[SupportedChainId::Polygon];

#[derive(Debug, Clone, PartialEq)]
pub struct ChainInfo {
    pub explorer: &'static str,
    pub label: &'static str,
}

impl ChainInfo {
    /// Explorer page for a transaction hash
    pub fn explorer_tx_url(&self, hash: &str) -> String {
        format!("{}tx/{}", self.explorer, hash)
    }
}

impl SupportedChainId {
    pub fn from_u64(chain_id: u64) -> Option<Self> {
        ALL_SUPPORTED_CHAIN_IDS
            .iter()
            .copied()
            .find(|c| *c as u64 == chain_id)
    }

    pub fn info(&self) -> ChainInfo {
        match self {
            SupportedChainId::Polygon => ChainInfo {
                explorer: "https://polygonscan.com/",
                label: "XDAI",
            },
        }
    }
}
