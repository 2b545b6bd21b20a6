//! GitHub 工具
//!
//! 仓库搜索、仓库详情、贡献者。空 query 直接拒绝（Planner 偶尔会漏填），
//! 错误文案提示可用的兜底查询写法。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::{
    get_json, required_str, str_or, u64_or, ActionSpec, RetryPolicy, Tool, ToolError,
};

const BASE_URL: &str = "https://api.github.com";

pub struct GitHubTool {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GitHubTool {
    pub fn new(timeout_secs: u64, retry: RetryPolicy) -> Self {
        Self {
            client: crate::tools::http_client(timeout_secs),
            retry,
        }
    }

    async fn fetch(&self, url: &str, query: Vec<(&str, String)>) -> Result<Value, ToolError> {
        self.retry
            .call(|| async { get_json(&self.client, url, &query).await })
            .await
    }

    async fn search_repositories(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default();
        if query.is_empty() {
            return Err(ToolError::Rejected(
                "Query parameter cannot be empty. For top repositories, use a query like \
                 'stars:>1000' or specify a language/topic."
                    .to_string(),
            ));
        }
        let limit = u64_or(params, "limit", 5);
        let sort = str_or(params, "sort", "stars");

        let url = format!("{}/search/repositories", BASE_URL);
        let data = self
            .fetch(
                &url,
                vec![
                    ("q", query.to_string()),
                    ("sort", sort.to_string()),
                    ("order", "desc".to_string()),
                    ("per_page", limit.to_string()),
                ],
            )
            .await?;

        let repositories: Vec<Value> = data["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(limit as usize)
                    .map(|item| {
                        json!({
                            "name": item["full_name"],
                            "description": item["description"],
                            "stars": item["stargazers_count"],
                            "forks": item["forks_count"],
                            "language": item["language"],
                            "url": item["html_url"],
                            "topics": item["topics"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "query": query,
            "total_count": data["total_count"],
            "repositories": repositories,
        }))
    }

    async fn get_repository(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let owner = required_str(params, "owner")?;
        let repo = required_str(params, "repo")?;

        let url = format!("{}/repos/{}/{}", BASE_URL, owner, repo);
        let data = match self.fetch(&url, vec![]).await {
            Ok(data) => data,
            Err(ToolError::Status { status: 404, .. }) => {
                return Err(ToolError::Rejected(format!(
                    "Repository '{}/{}' not found",
                    owner, repo
                )))
            }
            Err(e) => return Err(e),
        };

        Ok(json!({
            "name": data["full_name"],
            "description": data["description"],
            "stars": data["stargazers_count"],
            "forks": data["forks_count"],
            "watchers": data["watchers_count"],
            "language": data["language"],
            "created_at": data["created_at"],
            "updated_at": data["updated_at"],
            "topics": data["topics"],
            "url": data["html_url"],
        }))
    }

    async fn get_contributors(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let owner = required_str(params, "owner")?;
        let repo = required_str(params, "repo")?;
        let limit = u64_or(params, "limit", 10);

        let url = format!("{}/repos/{}/{}/contributors", BASE_URL, owner, repo);
        let data = match self
            .fetch(&url, vec![("per_page", limit.to_string())])
            .await
        {
            Ok(data) => data,
            Err(ToolError::Status { status: 404, .. }) => {
                return Err(ToolError::Rejected(format!(
                    "Repository '{}/{}' not found",
                    owner, repo
                )))
            }
            Err(e) => return Err(e),
        };

        let contributors: Vec<Value> = data
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(limit as usize)
                    .map(|item| {
                        json!({
                            "login": item["login"],
                            "contributions": item["contributions"],
                            "url": item["html_url"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "repository": format!("{}/{}", owner, repo),
            "contributors": contributors,
        }))
    }
}

#[async_trait]
impl Tool for GitHubTool {
    fn name(&self) -> &str {
        "github"
    }

    fn description(&self) -> &str {
        "Search repositories, get stars, contributors"
    }

    fn actions(&self) -> &'static [ActionSpec] {
        const ACTIONS: &[ActionSpec] = &[
            ActionSpec {
                name: "search_repositories",
                params: &["query", "limit", "sort"],
            },
            ActionSpec {
                name: "get_repository",
                params: &["owner", "repo"],
            },
            ActionSpec {
                name: "get_contributors",
                params: &["owner", "repo", "limit"],
            },
        ];
        ACTIONS
    }

    async fn invoke(&self, action: &str, params: Map<String, Value>) -> Result<Value, ToolError> {
        match action {
            "search_repositories" => self.search_repositories(&params).await,
            "get_repository" => self.get_repository(&params).await,
            "get_contributors" => self.get_contributors(&params).await,
            other => Err(ToolError::Rejected(format!("Unsupported action '{other}'"))),
        }
    }
}
