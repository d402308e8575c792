//! Read-only helpers for a Fuel node GraphQL endpoint.

use std::time::Duration;

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{DeployError, types::ContractId};

/// Default timeout for GraphQL requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between polling attempts when waiting for readiness.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const CHAIN_INFO_QUERY: &str =
    "query { chain { name latestBlock { height } consensusParameters { chainId } } }";

const CONTRACT_QUERY: &str = "query($id: ContractId!) { contract(id: $id) { id } }";

/// Basic facts about the chain behind an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub name: String,
    pub chain_id: u64,
    pub latest_height: u64,
}

/// Thin GraphQL client used for preflight checks and contract lookups.
#[derive(Debug, Clone)]
pub struct GraphQlClient {
    url: Url,
    client: reqwest::Client,
}

impl GraphQlClient {
    pub fn new(url: Url) -> Result<Self, DeployError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Run a query and deserialize its `data` object.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, DeployError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "query": query,
                "variables": variables,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        parse_response(body)
    }

    /// Fetch chain name, id and height.
    pub async fn chain_info(&self) -> Result<ChainInfo, DeployError> {
        let data: ChainData = self.query(CHAIN_INFO_QUERY, Value::Null).await?;
        Ok(ChainInfo {
            name: data.chain.name,
            chain_id: data.chain.consensus_parameters.chain_id,
            latest_height: data.chain.latest_block.height,
        })
    }

    /// Whether a contract with `id` is deployed.
    pub async fn contract_exists(&self, id: ContractId) -> Result<bool, DeployError> {
        let data: ContractData = self
            .query(CONTRACT_QUERY, serde_json::json!({ "id": id.to_string() }))
            .await?;
        Ok(data.contract.is_some())
    }

    /// Poll [`chain_info`](Self::chain_info) until the node answers or `timeout` elapses.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<ChainInfo, DeployError> {
        let start = std::time::Instant::now();

        loop {
            match self.chain_info().await {
                Ok(info) => {
                    tracing::info!(
                        url = %self.url,
                        chain = %info.name,
                        chain_id = info.chain_id,
                        height = info.latest_height,
                        "Node reachable"
                    );
                    return Ok(info);
                }
                Err(e) if start.elapsed() + DEFAULT_POLL_INTERVAL > timeout => {
                    return Err(DeployError::Network(format!(
                        "{} not reachable after {}s: {e}",
                        self.url,
                        timeout.as_secs()
                    )));
                }
                Err(e) => {
                    tracing::trace!(
                        error = %e,
                        url = %self.url,
                        "Readiness check failed, retrying..."
                    );
                }
            }

            tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        }
    }
}

/// Split a GraphQL response into its data or its first error.
fn parse_response<T: DeserializeOwned>(body: Value) -> Result<T, DeployError> {
    if let Some(message) = body
        .get("errors")
        .and_then(|errors| errors.as_array())
        .and_then(|errors| errors.first())
    {
        return Err(DeployError::Network(format!(
            "GraphQL error: {}",
            message
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        )));
    }

    let data = body
        .get("data")
        .cloned()
        .ok_or_else(|| DeployError::Network("No data in GraphQL response".to_string()))?;

    serde_json::from_value(data)
        .map_err(|e| DeployError::Network(format!("Failed to deserialize GraphQL data: {e}")))
}

#[derive(Deserialize)]
struct ChainData {
    chain: Chain,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chain {
    name: String,
    latest_block: LatestBlock,
    consensus_parameters: ConsensusParameters,
}

#[derive(Deserialize)]
struct LatestBlock {
    #[serde(deserialize_with = "u64_from_string")]
    height: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsensusParameters {
    #[serde(deserialize_with = "u64_from_string")]
    chain_id: u64,
}

#[derive(Debug, Deserialize)]
struct ContractData {
    contract: Option<Value>,
}

/// Fuel's GraphQL schema encodes `U32`/`U64` scalars as strings.
fn u64_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
