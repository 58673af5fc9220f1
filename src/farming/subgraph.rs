// src/farming/subgraph.rs
//! Position data source backed by the farming subgraph

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::WalletContext;
use crate::farming::types::{FarmingError, Position, RawPosition};

type Result<T> = std::result::Result<T, FarmingError>;

/// Supplies the full list of a user's positions on demand
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch_positions(&self, ctx: &WalletContext) -> Result<Vec<Position>>;
}

const DEPOSITS_QUERY: &str = r#"
query deposits($owner: String!) {
  deposits(where: { owner: $owner }) {
    tokenId: id
    stakedInIncentive
    transfered: onFarmingCenter
    earned
    bonusEarned
    endTime
    ended
    pool { token0 { symbol } token1 { symbol } }
    rewardToken { symbol }
    bonusRewardToken { symbol }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<DepositsData>,
    errors: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct DepositsData {
    deposits: Vec<RawPosition>,
}

pub struct SubgraphClient {
    subgraph_url: String,
    http_client: HttpClient,
}

impl SubgraphClient {
    pub fn new(subgraph_url: &str) -> Self {
        Self {
            subgraph_url: subgraph_url.to_string(),
            http_client: HttpClient::new(),
        }
    }

    async fn query(&self, owner: &str) -> Result<Value> {
        let request = json!({
            "query": DEPOSITS_QUERY,
            "variables": { "owner": owner }
        });

        let response = self.http_client
            .post(&self.subgraph_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FarmingError::SubgraphError(e.to_string()))?;

        response
            .json::<Value>()
            .await
            .map_err(|e| FarmingError::SubgraphError(format!("invalid response body: {}", e)))
    }
}

/// Decode a GraphQL response, rejecting the whole batch if any record is malformed
pub fn parse_deposits(body: Value) -> Result<Vec<Position>> {
    let response: GraphResponse = serde_json::from_value(body)
        .map_err(|e| FarmingError::SubgraphError(format!("unexpected response shape: {}", e)))?;

    if let Some(errors) = response.errors.filter(|errors| !errors.is_empty()) {
        return Err(FarmingError::SubgraphError(format!("query failed: {:?}", errors)));
    }

    let data = response
        .data
        .ok_or_else(|| FarmingError::SubgraphError("response has no data".to_string()))?;

    data.deposits
        .into_iter()
        .map(Position::try_from)
        .collect()
}

#[async_trait]
impl PositionSource for SubgraphClient {
    async fn fetch_positions(&self, ctx: &WalletContext) -> Result<Vec<Position>> {
        log::info!("Fetching farming positions for {}", ctx.account);
        let body = self.query(&ctx.account).await?;
        let positions = parse_deposits(body)?;
        log::info!("Loaded {} farming positions", positions.len());
        Ok(positions)
    }
}
