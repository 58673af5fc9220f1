// src/context.rs
use crate::config::chains::{ChainInfo, SupportedChainId};
use crate::farming::FarmingError;

/// Connected account and chain, passed to every operation that needs them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletContext {
    pub account: String,
    pub chain_id: u64,
}

impl WalletContext {
    pub fn new(account: &str, chain_id: u64) -> Result<Self, FarmingError> {
        if SupportedChainId::from_u64(chain_id).is_none() {
            return Err(FarmingError::InvalidContext(format!("unsupported chain id {}", chain_id)));
        }

        let digits = account
            .strip_prefix("0x")
            .ok_or_else(|| FarmingError::InvalidContext(format!("account {} is missing 0x prefix", account)))?;
        let bytes = hex::decode(digits)
            .map_err(|e| FarmingError::InvalidContext(format!("account {}: {}", account, e)))?;
        if bytes.len() != 20 {
            return Err(FarmingError::InvalidContext(format!(
                "account {} is {} bytes, expected 20",
                account,
                bytes.len()
            )));
        }

        Ok(Self {
            account: format!("0x{}", digits.to_lowercase()),
            chain_id,
        })
    }

    pub fn chain_info(&self) -> Option<ChainInfo> {
        SupportedChainId::from_u64(self.chain_id).map(|c| c.info())
    }
}
