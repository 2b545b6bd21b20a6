//! News 工具（NewsAPI）
//!
//! get_top_headlines 在「只给 country 且 0 结果」时附带 suggestion
//! （country 参数经常查空，提示改用 search_news），由聚合层透出。
//! search_news 缺省回溯 7 天。

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use serde_json::{json, Map, Value};

use crate::tools::{
    get_json, required_str, str_or, u64_or, ActionSpec, RetryPolicy, Tool, ToolError,
};

const BASE_URL: &str = "https://newsapi.org/v2";

pub struct NewsTool {
    client: reqwest::Client,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl NewsTool {
    pub fn new(timeout_secs: u64, api_key: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            client: crate::tools::http_client(timeout_secs),
            api_key,
            retry,
        }
    }

    fn key(&self) -> Result<&str, ToolError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ToolError::Rejected("NEWS_API_KEY is not configured".to_string()))
    }

    fn format_articles(data: &Value, limit: usize) -> Vec<Value> {
        data["articles"]
            .as_array()
            .map(|articles| {
                articles
                    .iter()
                    .take(limit)
                    .map(|a| {
                        json!({
                            "title": a["title"],
                            "description": a["description"],
                            "source": a["source"]["name"],
                            "author": a["author"],
                            "published_at": a["publishedAt"],
                            "url": a["url"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn get_top_headlines(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let key = self.key()?.to_string();
        let query = params.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let category = params.get("category").and_then(|v| v.as_str());
        let country = str_or(params, "country", "us");
        let limit = u64_or(params, "limit", 5);

        let mut request = vec![("apiKey", key), ("pageSize", limit.to_string())];
        if !query.is_empty() {
            request.push(("q", query.to_string()));
        } else {
            // country 与 q 不能同用
            request.push(("country", country.to_string()));
        }
        if let Some(category) = category {
            request.push(("category", category.to_string()));
        }

        let url = format!("{}/top-headlines", BASE_URL);
        let data = self
            .retry
            .call(|| async { get_json(&self.client, &url, &request).await })
            .await?;

        let total = data["totalResults"].as_u64().unwrap_or(0);
        let mut result = json!({
            "total_results": total,
            "query": if query.is_empty() { Value::Null } else { Value::String(query.to_string()) },
            "articles": Self::format_articles(&data, limit as usize),
        });
        if total == 0 && query.is_empty() {
            result["suggestion"] = Value::String(format!(
                "No headlines found for country '{}'. Try using search_news with a specific \
                 query about the country instead.",
                country
            ));
        }
        Ok(result)
    }

    async fn search_news(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let key = self.key()?.to_string();
        let query = required_str(params, "query")?;
        let language = str_or(params, "language", "en");
        let limit = u64_or(params, "limit", 5);
        let default_from = (Local::now() - ChronoDuration::days(7))
            .format("%Y-%m-%d")
            .to_string();
        let from_date = str_or(params, "from_date", &default_from);

        let url = format!("{}/everything", BASE_URL);
        let request = vec![
            ("apiKey", key),
            ("q", query.to_string()),
            ("from", from_date.to_string()),
            ("language", language.to_string()),
            ("sortBy", "relevancy".to_string()),
            ("pageSize", limit.to_string()),
        ];
        let data = self
            .retry
            .call(|| async { get_json(&self.client, &url, &request).await })
            .await?;

        Ok(json!({
            "total_results": data["totalResults"],
            "query": query,
            "articles": Self::format_articles(&data, limit as usize),
        }))
    }
}

#[async_trait]
impl Tool for NewsTool {
    fn name(&self) -> &str {
        "news"
    }

    fn description(&self) -> &str {
        "Get latest news articles and headlines"
    }

    fn actions(&self) -> &'static [ActionSpec] {
        const ACTIONS: &[ActionSpec] = &[
            ActionSpec {
                name: "get_top_headlines",
                params: &["query", "category", "country", "limit"],
            },
            ActionSpec {
                name: "search_news",
                params: &["query", "from_date", "language", "limit"],
            },
        ];
        ACTIONS
    }

    async fn invoke(&self, action: &str, params: Map<String, Value>) -> Result<Value, ToolError> {
        match action {
            "get_top_headlines" => self.get_top_headlines(&params).await,
            "search_news" => self.search_news(&params).await,
            other => Err(ToolError::Rejected(format!("Unsupported action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_rejected() {
        let t = NewsTool::new(5, None, RetryPolicy::default());
        let err = t.invoke("get_top_headlines", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("NEWS_API_KEY"));
    }

    #[tokio::test]
    async fn search_requires_query() {
        let t = NewsTool::new(5, Some("key".into()), RetryPolicy::default());
        let err = t.invoke("search_news", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("'query'"));
    }
}
