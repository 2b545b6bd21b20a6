//! Wikipedia 工具
//!
//! search 用 opensearch 端点（返回 [query, titles, descriptions, urls] 四元组），
//! get_summary 用 REST v1 的 page/summary。search 的首条结果标题是
//! get_summary 依赖注入的来源（见 executor::rules 的默认规则表）。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::{
    get_json, required_str, u64_or, ActionSpec, RetryPolicy, Tool, ToolError,
};

const SEARCH_URL: &str = "https://en.wikipedia.org/w/api.php";
const REST_URL: &str = "https://en.wikipedia.org/api/rest_v1";

pub struct WikipediaTool {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl WikipediaTool {
    pub fn new(timeout_secs: u64, retry: RetryPolicy) -> Self {
        Self {
            client: crate::tools::http_client(timeout_secs),
            retry,
        }
    }

    async fn search(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let query = required_str(params, "query")?;
        let limit = u64_or(params, "limit", 5);

        let request = vec![
            ("action", "opensearch".to_string()),
            ("search", query.to_string()),
            ("limit", limit.to_string()),
            ("format", "json".to_string()),
        ];
        let data = self
            .retry
            .call(|| async { get_json(&self.client, SEARCH_URL, &request).await })
            .await?;

        // opensearch 返回 [query, [titles], [descriptions], [urls]]
        let arr = data
            .as_array()
            .filter(|a| a.len() >= 4)
            .ok_or_else(|| ToolError::InvalidResponse("unexpected opensearch shape".into()))?;
        let titles = arr[1].as_array().cloned().unwrap_or_default();
        let descriptions = arr[2].as_array().cloned().unwrap_or_default();
        let urls = arr[3].as_array().cloned().unwrap_or_default();

        let results: Vec<Value> = titles
            .iter()
            .enumerate()
            .map(|(i, title)| {
                json!({
                    "title": title,
                    "description": descriptions.get(i).cloned().unwrap_or(Value::Null),
                    "url": urls.get(i).cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        Ok(json!({
            "query": query,
            "results": results,
        }))
    }

    async fn get_summary(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let title = required_str(params, "title")?;
        let url = format!("{}/page/summary/{}", REST_URL, title.replace(' ', "_"));

        let data = match self
            .retry
            .call(|| async { get_json(&self.client, &url, &[]).await })
            .await
        {
            Ok(data) => data,
            Err(ToolError::Status { status: 404, .. }) => {
                return Err(ToolError::Rejected(format!("Article '{}' not found", title)))
            }
            Err(e) => return Err(e),
        };

        Ok(json!({
            "title": data["title"],
            "extract": data["extract"],
            "url": data["content_urls"]["desktop"]["page"],
            "thumbnail": data["thumbnail"]["source"],
        }))
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "Search articles and get article summaries"
    }

    fn actions(&self) -> &'static [ActionSpec] {
        const ACTIONS: &[ActionSpec] = &[
            ActionSpec {
                name: "search",
                params: &["query", "limit"],
            },
            ActionSpec {
                name: "get_summary",
                params: &["title"],
            },
        ];
        ACTIONS
    }

    async fn invoke(&self, action: &str, params: Map<String, Value>) -> Result<Value, ToolError> {
        match action {
            "search" => self.search(&params).await,
            "get_summary" => self.get_summary(&params).await,
            other => Err(ToolError::Rejected(format!("Unsupported action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_requires_query() {
        let t = WikipediaTool::new(5, RetryPolicy::default());
        let err = t.invoke("search", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("'query'"));
    }

    #[tokio::test]
    async fn summary_requires_title() {
        let t = WikipediaTool::new(5, RetryPolicy::default());
        let err = t.invoke("get_summary", Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("'title'"));
    }
}
