// src/farming/submitter.rs
//! Sending claim and withdraw actions to the wallet

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::context::WalletContext;
use crate::farming::types::{ActionKind, FarmingError, PositionId, SubmissionOutcome};

/// Initiates farming actions. Implementations never error: any failure to get
/// a transaction onto the network is reported as `SubmissionOutcome::Failed`.
#[async_trait]
pub trait ActionSubmitter: Send + Sync {
    async fn submit_claim(&self, ctx: &WalletContext, position_id: &PositionId) -> SubmissionOutcome;

    async fn submit_withdraw(&self, ctx: &WalletContext, position_id: &PositionId) -> SubmissionOutcome;
}

pub async fn submit_action(
    submitter: &dyn ActionSubmitter,
    ctx: &WalletContext,
    kind: ActionKind,
    position_id: &PositionId,
) -> SubmissionOutcome {
    match kind {
        ActionKind::ClaimReward => submitter.submit_claim(ctx, position_id).await,
        ActionKind::Withdraw => submitter.submit_withdraw(ctx, position_id).await,
    }
}

/// Requests sent to the wallet bridge
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "method")]
pub enum StakerRequest {
    /// Exit farming and collect rewards for a position
    ClaimReward {
        token_id: String,
        account: String,
        chain_id: u64,
    },

    /// Return the position NFT from the farming contract to its owner
    WithdrawToken {
        token_id: String,
        account: String,
        chain_id: u64,
    },
}

impl StakerRequest {
    pub fn new(kind: ActionKind, ctx: &WalletContext, position_id: &PositionId) -> Self {
        let token_id = position_id.to_string();
        let account = ctx.account.clone();
        let chain_id = ctx.chain_id;
        match kind {
            ActionKind::ClaimReward => StakerRequest::ClaimReward { token_id, account, chain_id },
            ActionKind::Withdraw => StakerRequest::WithdrawToken { token_id, account, chain_id },
        }
    }
}

/// Responses from the wallet bridge
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum StakerResponse {
    /// Transaction signed and broadcast
    TransactionSent {
        hash: String,
    },

    /// User rejected the request
    Rejected {
        reason: String,
    },

    Error {
        message: String,
    },
}

impl StakerResponse {
    pub fn into_outcome(self) -> SubmissionOutcome {
        match self {
            StakerResponse::TransactionSent { hash } if !hash.is_empty() => SubmissionOutcome::Sent { hash },
            StakerResponse::TransactionSent { .. } => {
                log::warn!("Bridge returned an empty transaction hash");
                SubmissionOutcome::Failed
            }
            StakerResponse::Rejected { reason } => {
                log::info!("Farming action rejected by user: {}", reason);
                SubmissionOutcome::Failed
            }
            StakerResponse::Error { message } => {
                log::error!("Wallet bridge error: {}", message);
                SubmissionOutcome::Failed
            }
        }
    }
}

/// Forwards actions to an external signer over HTTP; the signer owns contract
/// call encoding and key material.
pub struct BridgeSubmitter {
    bridge_url: String,
    http_client: HttpClient,
}

impl BridgeSubmitter {
    pub fn new(bridge_url: &str) -> Self {
        Self {
            bridge_url: bridge_url.to_string(),
            http_client: HttpClient::new(),
        }
    }

    async fn send(&self, request: &StakerRequest) -> Result<StakerResponse, FarmingError> {
        let response = self.http_client
            .post(&self.bridge_url)
            .json(request)
            .send()
            .await
            .map_err(|e| FarmingError::SubmissionError(format!("bridge unreachable: {}", e)))?;

        response
            .json::<StakerResponse>()
            .await
            .map_err(|e| FarmingError::SubmissionError(format!("invalid bridge response: {}", e)))
    }

    async fn submit(&self, kind: ActionKind, ctx: &WalletContext, position_id: &PositionId) -> SubmissionOutcome {
        let request = StakerRequest::new(kind, ctx, position_id);
        log::info!("Submitting {} for position {}", kind, position_id);

        match self.send(&request).await {
            Ok(response) => response.into_outcome(),
            Err(e) => {
                log::error!("{} for position {} failed: {}", kind, position_id, e);
                SubmissionOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl ActionSubmitter for BridgeSubmitter {
    async fn submit_claim(&self, ctx: &WalletContext, position_id: &PositionId) -> SubmissionOutcome {
        self.submit(ActionKind::ClaimReward, ctx, position_id).await
    }

    async fn submit_withdraw(&self, ctx: &WalletContext, position_id: &PositionId) -> SubmissionOutcome {
        self.submit(ActionKind::Withdraw, ctx, position_id).await
    }
}
