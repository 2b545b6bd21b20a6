//! Crypto 工具（CoinGecko）
//!
//! 价格、热门币、市场数据。币名先过纠错（"btc" → "bitcoin"）；
//! CoinGecko 对未知 id 返回空对象而非 404，需显式判空。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::query::QueryContext;
use crate::tools::{get_json, str_or, ActionSpec, QueryOptimizer, RetryPolicy, Tool, ToolError};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

pub struct CryptoTool {
    client: reqwest::Client,
    retry: RetryPolicy,
    optimizer: Arc<QueryOptimizer>,
}

impl CryptoTool {
    pub fn new(timeout_secs: u64, retry: RetryPolicy, optimizer: Arc<QueryOptimizer>) -> Self {
        Self {
            client: crate::tools::http_client(timeout_secs),
            retry,
            optimizer,
        }
    }

    async fn fetch(&self, path: &str, query: Vec<(&str, String)>) -> Result<Value, ToolError> {
        let url = format!("{}/{}", BASE_URL, path);
        self.retry
            .call(|| async { get_json(&self.client, &url, &query).await })
            .await
    }

    async fn get_price(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let coin_id = str_or(params, "coin_id", "bitcoin");
        let vs_currency = str_or(params, "vs_currency", "usd");

        let (corrected, correction_note) = self
            .optimizer
            .correct_query(coin_id, QueryContext::Crypto)
            .await;

        let data = self
            .fetch(
                "simple/price",
                vec![
                    ("ids", corrected.clone()),
                    ("vs_currencies", vs_currency.to_string()),
                    ("include_24hr_change", "true".to_string()),
                    ("include_market_cap", "true".to_string()),
                    ("include_24hr_vol", "true".to_string()),
                ],
            )
            .await?;

        let Some(coin_data) = data.get(&corrected).filter(|v| v.is_object()) else {
            return Err(ToolError::Rejected(QueryOptimizer::not_found_reason(
                "crypto", coin_id,
            )));
        };

        let change = coin_data[&format!("{}_24h_change", vs_currency)]
            .as_f64()
            .unwrap_or(0.0);
        let mut result = json!({
            "coin": corrected,
            "currency": vs_currency.to_uppercase(),
            "price": coin_data[vs_currency],
            "market_cap": coin_data[&format!("{}_market_cap", vs_currency)],
            "24h_volume": coin_data[&format!("{}_24h_vol", vs_currency)],
            "24h_change": format!("{:.2}%", change),
        });
        if let Some(note) = correction_note {
            result["correction_note"] = Value::String(note);
        }
        Ok(result)
    }

    async fn get_trending(&self) -> Result<Value, ToolError> {
        let data = self.fetch("search/trending", vec![]).await?;

        let coins: Vec<Value> = data["coins"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(7)
                    .map(|item| {
                        let coin = &item["item"];
                        json!({
                            "name": coin["name"],
                            "symbol": coin["symbol"],
                            "market_cap_rank": coin["market_cap_rank"],
                            "price_btc": coin["price_btc"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({ "trending_coins": coins }))
    }

    async fn get_market_data(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let coin_id = str_or(params, "coin_id", "bitcoin");
        let vs_currency = str_or(params, "vs_currency", "usd");

        let (corrected, correction_note) = self
            .optimizer
            .correct_query(coin_id, QueryContext::Crypto)
            .await;

        let data = self
            .fetch(
                "coins/markets",
                vec![
                    ("vs_currency", vs_currency.to_string()),
                    ("ids", corrected.clone()),
                ],
            )
            .await?;

        let Some(market) = data.as_array().and_then(|a| a.first()) else {
            return Err(ToolError::Rejected(QueryOptimizer::not_found_reason(
                "crypto", coin_id,
            )));
        };

        let mut result = json!({
            "coin": corrected,
            "currency": vs_currency.to_uppercase(),
            "current_price": market["current_price"],
            "market_cap": market["market_cap"],
            "market_cap_rank": market["market_cap_rank"],
            "high_24h": market["high_24h"],
            "low_24h": market["low_24h"],
            "total_volume": market["total_volume"],
            "circulating_supply": market["circulating_supply"],
        });
        if let Some(note) = correction_note {
            result["correction_note"] = Value::String(note);
        }
        Ok(result)
    }
}

#[async_trait]
impl Tool for CryptoTool {
    fn name(&self) -> &str {
        "crypto"
    }

    fn description(&self) -> &str {
        "Get cryptocurrency prices and market data"
    }

    fn actions(&self) -> &'static [ActionSpec] {
        const ACTIONS: &[ActionSpec] = &[
            ActionSpec {
                name: "get_price",
                params: &["coin_id", "vs_currency"],
            },
            ActionSpec {
                name: "get_trending",
                params: &[],
            },
            ActionSpec {
                name: "get_market_data",
                params: &["coin_id", "vs_currency"],
            },
        ];
        ACTIONS
    }

    async fn invoke(&self, action: &str, params: Map<String, Value>) -> Result<Value, ToolError> {
        match action {
            "get_price" => self.get_price(&params).await,
            "get_trending" => self.get_trending().await,
            "get_market_data" => self.get_market_data(&params).await,
            other => Err(ToolError::Rejected(format!("Unsupported action '{other}'"))),
        }
    }
}
