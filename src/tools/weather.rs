//! Weather 工具（OpenWeatherMap）
//!
//! 出网段包在 RetryPolicy 里；城市名先过查询纠错（"Bengalore" → "Bangalore"），
//! 纠正过的查询会在载荷里带 correction_note。404 转为带原因的业务拒绝，不重试。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::query::QueryContext;
use crate::tools::{
    get_json, required_str, str_or, u64_or, ActionSpec, QueryOptimizer, RetryPolicy, Tool,
    ToolError,
};

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

pub struct WeatherTool {
    client: reqwest::Client,
    api_key: Option<String>,
    retry: RetryPolicy,
    optimizer: Arc<QueryOptimizer>,
}

impl WeatherTool {
    pub fn new(
        timeout_secs: u64,
        api_key: Option<String>,
        retry: RetryPolicy,
        optimizer: Arc<QueryOptimizer>,
    ) -> Self {
        Self {
            client: crate::tools::http_client(timeout_secs),
            api_key,
            retry,
            optimizer,
        }
    }

    fn key(&self) -> Result<&str, ToolError> {
        self.api_key.as_deref().ok_or_else(|| {
            ToolError::Rejected("OPENWEATHERMAP_API_KEY is not configured".to_string())
        })
    }

    fn temp_unit(units: &str) -> &'static str {
        match units {
            "metric" => "°C",
            "imperial" => "°F",
            _ => "K",
        }
    }

    async fn fetch(&self, path: &str, query: Vec<(&str, String)>) -> Result<Value, ToolError> {
        let url = format!("{}/{}", BASE_URL, path);
        self.retry
            .call(|| async { get_json(&self.client, &url, &query).await })
            .await
    }

    async fn get_current_weather(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let key = self.key()?.to_string();
        let city = required_str(params, "city")?;
        let units = str_or(params, "units", "metric");

        let (corrected, correction_note) =
            self.optimizer.correct_query(city, QueryContext::City).await;

        let query = vec![
            ("q", corrected.clone()),
            ("appid", key),
            ("units", units.to_string()),
        ];
        let data = match self.fetch("weather", query).await {
            Ok(data) => data,
            Err(ToolError::Status { status: 404, .. }) => {
                return Err(ToolError::Rejected(QueryOptimizer::not_found_reason(
                    "weather", city,
                )))
            }
            Err(e) => return Err(e),
        };

        let unit = Self::temp_unit(units);
        let mut result = json!({
            "city": data["name"],
            "country": data["sys"]["country"],
            "temperature": format!("{}{}", data["main"]["temp"], unit),
            "feels_like": format!("{}{}", data["main"]["feels_like"], unit),
            "humidity": format!("{}%", data["main"]["humidity"]),
            "description": data["weather"][0]["description"],
            "wind_speed": format!("{} m/s", data["wind"]["speed"]),
            "coordinates": {
                "lat": data["coord"]["lat"],
                "lon": data["coord"]["lon"],
            },
        });
        if let Some(note) = correction_note {
            result["correction_note"] = Value::String(note);
        }
        Ok(result)
    }

    async fn get_forecast(&self, params: &Map<String, Value>) -> Result<Value, ToolError> {
        let key = self.key()?.to_string();
        let city = required_str(params, "city")?;
        let units = str_or(params, "units", "metric");
        let days = u64_or(params, "days", 3).clamp(1, 5) as usize;

        let (corrected, correction_note) =
            self.optimizer.correct_query(city, QueryContext::City).await;

        let query = vec![
            ("q", corrected.clone()),
            ("appid", key),
            ("units", units.to_string()),
            ("cnt", ((days * 8).min(40)).to_string()),
        ];
        let data = match self.fetch("forecast", query).await {
            Ok(data) => data,
            Err(ToolError::Status { status: 404, .. }) => {
                return Err(ToolError::Rejected(QueryOptimizer::not_found_reason(
                    "weather", city,
                )))
            }
            Err(e) => return Err(e),
        };

        let unit = Self::temp_unit(units);
        // 预报接口每 3 小时一条，按天取一条
        let forecast: Vec<Value> = data["list"]
            .as_array()
            .map(|list| {
                list.iter()
                    .step_by(8)
                    .take(days)
                    .map(|item| {
                        json!({
                            "date": item["dt_txt"],
                            "temperature": format!("{}{}", item["main"]["temp"], unit),
                            "description": item["weather"][0]["description"],
                            "humidity": format!("{}%", item["main"]["humidity"]),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut result = json!({
            "city": data["city"]["name"],
            "country": data["city"]["country"],
            "forecast": forecast,
        });
        if let Some(note) = correction_note {
            result["correction_note"] = Value::String(note);
        }
        Ok(result)
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Get current weather and forecasts"
    }

    fn actions(&self) -> &'static [ActionSpec] {
        const ACTIONS: &[ActionSpec] = &[
            ActionSpec {
                name: "get_current_weather",
                params: &["city", "units"],
            },
            ActionSpec {
                name: "get_forecast",
                params: &["city", "days", "units"],
            },
        ];
        ACTIONS
    }

    async fn invoke(&self, action: &str, params: Map<String, Value>) -> Result<Value, ToolError> {
        match action {
            "get_current_weather" => self.get_current_weather(&params).await,
            "get_forecast" => self.get_forecast(&params).await,
            other => Err(ToolError::Rejected(format!("Unsupported action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    fn tool(api_key: Option<String>) -> WeatherTool {
        let llm = Arc::new(MockLlmClient::new());
        WeatherTool::new(
            5,
            api_key,
            RetryPolicy::default(),
            Arc::new(QueryOptimizer::new(llm, false)),
        )
    }

    #[tokio::test]
    async fn missing_api_key_is_a_rejection_not_a_panic() {
        let t = tool(None);
        let params = match json!({"city": "London"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let err = t.invoke("get_current_weather", params).await.unwrap_err();
        assert!(matches!(err, ToolError::Rejected(_)));
        assert!(err.to_string().contains("OPENWEATHERMAP_API_KEY"));
    }

    #[tokio::test]
    async fn missing_city_is_rejected() {
        let t = tool(Some("key".into()));
        let err = t
            .invoke("get_current_weather", Map::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'city'"));
    }

    #[test]
    fn unit_suffix_matches_units() {
        assert_eq!(WeatherTool::temp_unit("metric"), "°C");
        assert_eq!(WeatherTool::temp_unit("imperial"), "°F");
        assert_eq!(WeatherTool::temp_unit("standard"), "K");
    }
}
