// src/farming/types.rs
//! Farming position types

use serde::Deserialize;
use std::fmt;

/// Opaque token identifier of a farming position (the NFT token id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PositionId {
    fn from(id: u64) -> Self {
        PositionId(id.to_string())
    }
}

impl From<&str> for PositionId {
    fn from(id: &str) -> Self {
        PositionId(id.to_string())
    }
}

/// Token symbols of the pool a position provides liquidity to
#[derive(Debug, Clone, PartialEq)]
pub struct PoolTokens {
    pub token0: String,
    pub token1: String,
}

/// One staked (or previously staked) position
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    /// Participates in an incentive right now
    pub is_actively_staked: bool,
    /// Custody has been transferred to the farming contract
    pub is_held_by_contract: bool,
    pub earned_primary: f64,
    pub earned_bonus: f64,
    /// Incentive end, unix seconds
    pub incentive_end_time: i64,
    pub has_ended: bool,
    pub pool: PoolTokens,
    pub reward_token: String,
    pub bonus_reward_token: String,
}

impl Position {
    /// Rewards may be collected once the incentive end time has passed
    pub fn is_claimable(&self, now_ms: i64) -> bool {
        now_ms >= self.incentive_end_time.saturating_mul(1000)
    }
}

/// Wire shape of a position as delivered by the subgraph.
///
/// Every field is optional here so that malformed records are rejected
/// in one place, by `TryFrom<RawPosition> for Position`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    pub token_id: Option<String>,
    pub staked_in_incentive: Option<bool>,
    pub transfered: Option<bool>,
    pub earned: Option<serde_json::Value>,
    pub bonus_earned: Option<serde_json::Value>,
    pub end_time: Option<serde_json::Value>,
    pub ended: Option<bool>,
    pub pool: Option<RawPool>,
    pub reward_token: Option<RawToken>,
    pub bonus_reward_token: Option<RawToken>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPool {
    pub token0: Option<RawToken>,
    pub token1: Option<RawToken>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawToken {
    pub symbol: Option<String>,
}

/// Latest end time whose millisecond value still fits an `i64`
const MAX_END_TIME_SECS: i64 = i64::MAX / 1000;

// Subgraphs serialize big numbers as strings, so numeric fields accept both.
fn number_field(value: Option<serde_json::Value>, field: &str) -> Result<f64, FarmingError> {
    let number = match value {
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| FarmingError::InvalidPosition(format!("{} is not a finite number", field)))?,
        Some(serde_json::Value::String(s)) => s
            .parse::<f64>()
            .map_err(|e| FarmingError::InvalidPosition(format!("{} '{}': {}", field, s, e)))?,
        Some(other) => {
            return Err(FarmingError::InvalidPosition(format!("{} has unexpected type: {}", field, other)))
        }
        None => return Err(FarmingError::InvalidPosition(format!("missing {}", field))),
    };

    if !number.is_finite() {
        return Err(FarmingError::InvalidPosition(format!("{} is not a finite number", field)));
    }
    Ok(number)
}

fn end_time_field(value: Option<serde_json::Value>) -> Result<i64, FarmingError> {
    let secs = number_field(value, "endTime")?;
    if secs < 0.0 || secs.fract() != 0.0 {
        return Err(FarmingError::InvalidPosition(format!(
            "endTime {} is not a whole number of seconds",
            secs
        )));
    }

    // Saturates for huge values, which the range check then rejects
    let whole = secs as i64;
    if whole > MAX_END_TIME_SECS {
        return Err(FarmingError::InvalidPosition(format!("endTime {} is out of range", secs)));
    }
    Ok(whole)
}

fn symbol_field(token: Option<RawToken>, field: &str) -> Result<String, FarmingError> {
    token
        .and_then(|t| t.symbol)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| FarmingError::InvalidPosition(format!("missing {} symbol", field)))
}

impl TryFrom<RawPosition> for Position {
    type Error = FarmingError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        let id = raw
            .token_id
            .filter(|id| !id.is_empty())
            .map(PositionId)
            .ok_or_else(|| FarmingError::InvalidPosition("missing tokenId".to_string()))?;

        let is_actively_staked = raw
            .staked_in_incentive
            .ok_or_else(|| FarmingError::InvalidPosition(format!("{}: missing stakedInIncentive", id)))?;
        let is_held_by_contract = raw
            .transfered
            .ok_or_else(|| FarmingError::InvalidPosition(format!("{}: missing transfered", id)))?;

        if is_actively_staked && !is_held_by_contract {
            return Err(FarmingError::InvalidPosition(format!(
                "{}: staked in an incentive but not held by the farming contract",
                id
            )));
        }

        let pool = raw
            .pool
            .ok_or_else(|| FarmingError::InvalidPosition(format!("{}: missing pool", id)))?;

        Ok(Position {
            earned_primary: number_field(raw.earned, "earned")?,
            earned_bonus: number_field(raw.bonus_earned, "bonusEarned")?,
            incentive_end_time: end_time_field(raw.end_time)?,
            has_ended: raw.ended.unwrap_or(false),
            pool: PoolTokens {
                token0: symbol_field(pool.token0, "token0")?,
                token1: symbol_field(pool.token1, "token1")?,
            },
            reward_token: symbol_field(raw.reward_token, "rewardToken")?,
            bonus_reward_token: symbol_field(raw.bonus_reward_token, "bonusRewardToken")?,
            id,
            is_actively_staked,
            is_held_by_contract,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ClaimReward,
    Withdraw,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::ClaimReward => write!(f, "Claim reward"),
            ActionKind::Withdraw => write!(f, "Withdraw"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionPhase {
    #[default]
    None,
    Pending,
    Done,
}

/// Result handed back by the action submitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Sent { hash: String },
    /// The "failed" sentinel: the action never reached the network
    Failed,
}

impl SubmissionOutcome {
    pub fn hash(&self) -> Option<&str> {
        match self {
            SubmissionOutcome::Sent { hash } => Some(hash),
            SubmissionOutcome::Failed => None,
        }
    }
}

/// An in-flight user action against exactly one position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub position_id: Option<PositionId>,
    pub phase: ActionPhase,
    pub submission: Option<SubmissionOutcome>,
}

impl ActionRequest {
    pub fn idle(kind: ActionKind) -> Self {
        Self {
            kind,
            position_id: None,
            phase: ActionPhase::None,
            submission: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.phase == ActionPhase::Pending
    }

    /// Hash to watch for, once the submitter produced one
    pub fn tracked_hash(&self) -> Option<&str> {
        self.submission.as_ref().and_then(|s| s.hash())
    }
}

/// A confirmed effect folded into the local snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionPatch {
    RewardClaimed(PositionId),
    Withdrawn(PositionId),
}

impl PositionPatch {
    pub fn for_action(kind: ActionKind, id: PositionId) -> Self {
        match kind {
            ActionKind::ClaimReward => PositionPatch::RewardClaimed(id),
            ActionKind::Withdraw => PositionPatch::Withdrawn(id),
        }
    }

    pub fn position_id(&self) -> &PositionId {
        match self {
            PositionPatch::RewardClaimed(id) | PositionPatch::Withdrawn(id) => id,
        }
    }
}

#[derive(Debug)]
pub enum FarmingError {
    InvalidPosition(String),
    InvalidContext(String),
    SubgraphError(String),
    RpcError(String),
    SubmissionError(String),
}

impl fmt::Display for FarmingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FarmingError::InvalidPosition(msg) => write!(f, "Invalid position: {}", msg),
            FarmingError::InvalidContext(msg) => write!(f, "Invalid wallet context: {}", msg),
            FarmingError::SubgraphError(msg) => write!(f, "Subgraph error: {}", msg),
            FarmingError::RpcError(msg) => write!(f, "RPC error: {}", msg),
            FarmingError::SubmissionError(msg) => write!(f, "Submission error: {}", msg),
        }
    }
}

impl std::error::Error for FarmingError {}
