//! Countries 工具（REST Countries）
//!
//! 按名称 / 区域 / 代码查询国家信息。名称查询先过通用纠错。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::query::QueryContext;
use crate::tools::{
    get_json, required_str, ActionSpec, QueryOptimizer, RetryPolicy, Tool, ToolError,
};

const BASE_URL: &str = "https://restcountries.com/v3.1";

pub struct CountriesTool {
    client: reqwest::Client,
    retry: RetryPolicy,
    optimizer: Arc<QueryOptimizer>,
}

impl CountriesTool {
    pub fn new(timeout_secs: u64, retry: RetryPolicy, optimizer: Arc<QueryOptimizer>) -> Self {
        Self {
            client: crate::tools::http_client(timeout_secs),
            retry,
            optimizer,
        }
    }

    async fn fetch(&self, path: String) -> Result<Value, ToolError> {
        let url = format!("{}/{}", BASE_URL, path);
        self.retry
            .call(|| async { get_json(&self.client, &url, &[]).await })
            .await
    }

    /// 国家对象 → 摘要载荷
    fn summarize(country: &Value) -> Value {
        json!({
            "name": country["name"]["common"],
            "official_name": country["name"]["official"],
            "capital": country["capital"][0],
            "region": country["region"],
            "subregion": country["subregion"],
            "population": country["population"],
            "area": format!("{} km²", country["area"]),
            "languages": country["languages"]
                .as_object()
                .map(|m| m.values().cloned().collect::<Vec<_>>())
                .unwrap_or_default(),
            "currencies": country["currencies"]
                .as_object()
                .map(|m| m.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default(),
            "timezones": country["timezones"],
            "flag": country["flag"],
        })
    }

    async fn get_country_by_name(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let name = required_str(params, "name")?;
        let (corrected, correction_note) =
            self.optimizer.correct_query(name, QueryContext::General).await;

        let data = match self.fetch(format!("name/{}", corrected)).await {
            Ok(data) => data,
            Err(ToolError::Status { status: 404, .. }) => {
                return Err(ToolError::Rejected(format!(
                    "Country '{}' not found. Please check the spelling.",
                    name
                )))
            }
            Err(e) => return Err(e),
        };

        let country = data
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| ToolError::InvalidResponse("empty country list".into()))?;

        let mut result = Self::summarize(country);
        if let Some(note) = correction_note {
            result["correction_note"] = Value::String(note);
        }
        Ok(result)
    }

    async fn get_countries_by_region(
        &self,
        params: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let region = required_str(params, "region")?;

        let data = match self.fetch(format!("region/{}", region)).await {
            Ok(data) => data,
            Err(ToolError::Status { status: 404, .. }) => {
                return Err(ToolError::Rejected(format!(
                    "Region '{}' not found. Valid regions: Africa, Americas, Asia, Europe, Oceania.",
                    region
                )))
            }
            Err(e) => return Err(e),
        };

        let mut countries: Vec<Value> = data
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|c| {
                        json!({
                            "name": c["name"]["common"],
                            "capital": c["capital"][0],
                            "population": c["population"],
                            "flag": c["flag"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        // 人口降序
        countries.sort_by_key(|c| std::cmp::Reverse(c["population"].as_u64().unwrap_or(0)));

        Ok(json!({
            "region": region,
            "count": countries.len(),
            "countries": countries,
        }))
    }

    async fn get_country_by_code(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let code = required_str(params, "code")?;

        let data = match self.fetch(format!("alpha/{}", code)).await {
            Ok(data) => data,
            Err(ToolError::Status { status: 404 | 400, .. }) => {
                return Err(ToolError::Rejected(format!(
                    "Country code '{}' not found",
                    code
                )))
            }
            Err(e) => return Err(e),
        };

        // alpha 端点可能返回对象或单元素数组
        let country = data
            .as_array()
            .and_then(|a| a.first())
            .unwrap_or(&data);
        Ok(Self::summarize(country))
    }
}

#[async_trait]
impl Tool for CountriesTool {
    fn name(&self) -> &str {
        "countries"
    }

    fn description(&self) -> &str {
        "Get country information and data"
    }

    fn actions(&self) -> &'static [ActionSpec] {
        const ACTIONS: &[ActionSpec] = &[
            ActionSpec {
                name: "get_country_by_name",
                params: &["name"],
            },
            ActionSpec {
                name: "get_countries_by_region",
                params: &["region"],
            },
            ActionSpec {
                name: "get_country_by_code",
                params: &["code"],
            },
        ];
        ACTIONS
    }

    async fn invoke(&self, action: &str, params: Map<String, Value>) -> Result<Value, ToolError> {
        match action {
            "get_country_by_name" => self.get_country_by_name(&params).await,
            "get_countries_by_region" => self.get_countries_by_region(&params).await,
            "get_country_by_code" => self.get_country_by_code(&params).await,
            other => Err(ToolError::Rejected(format!("Unsupported action '{other}'"))),
        }
    }
}
