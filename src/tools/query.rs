//! 查询纠错
//!
//! 远程服务对拼写很敏感（"Bengalore" 查不到天气，"btc" 不是 CoinGecko id）。
//! 在出网前用 LLM 做一次上下文相关的纠正；纠正过则产出 correction_note，
//! 由聚合层透出给最终报告。明显无效的输入（乱码、过短）直接短路，不浪费 LLM 调用。

use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{LlmClient, Message};

/// 纠错上下文：决定 LLM 的纠正方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryContext {
    City,
    Crypto,
    General,
}

impl QueryContext {
    fn guidance(&self) -> &'static str {
        match self {
            QueryContext::City => {
                "This is a city name. Correct to standard city spelling (e.g., 'Bengalore' -> 'Bangalore', 'Londn' -> 'London')."
            }
            QueryContext::Crypto => {
                "This is a cryptocurrency name. Correct to standard CoinGecko ID format (e.g., 'btc' -> 'bitcoin', 'btcoin' -> 'bitcoin')."
            }
            QueryContext::General => {
                "This could be any type of query. Intelligently correct typos and variations based on common patterns."
            }
        }
    }

    fn min_length(&self) -> usize {
        match self {
            QueryContext::Crypto => 2,
            _ => 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Correction {
    corrected: String,
    #[serde(default)]
    note: Option<String>,
}

/// 查询纠错器：持有 LLM 客户端，装配时注入需要它的工具
pub struct QueryOptimizer {
    llm: Arc<dyn LlmClient>,
    enabled: bool,
}

impl QueryOptimizer {
    pub fn new(llm: Arc<dyn LlmClient>, enabled: bool) -> Self {
        Self { llm, enabled }
    }

    /// 输入是否明显无效（乱码、过短、几乎没有字母数字）
    pub fn is_likely_invalid(query: &str, min_length: usize) -> bool {
        let query = query.trim();
        if query.len() < min_length {
            return true;
        }

        let lower = query.to_lowercase();
        let has_digits = query.chars().any(|c| c.is_ascii_digit());
        let has_letters = query.chars().any(|c| c.is_alphabetic());
        if query.len() < 8 && has_digits && has_letters && (lower.contains("xyz") || lower.contains("abc")) {
            return true;
        }

        query.chars().filter(|c| c.is_alphanumeric()).count() < min_length
    }

    /// 纠正查询；返回 (corrected, note)。未纠正或纠错失败时返回原查询、note 为 None。
    pub async fn correct_query(&self, query: &str, context: QueryContext) -> (String, Option<String>) {
        let query = query.trim().to_string();

        if !self.enabled || Self::is_likely_invalid(&query, context.min_length()) {
            return (query, None);
        }

        let system = format!(
            "You are an intelligent query correction assistant. Your job is to correct misspelled \
             or non-standard queries to their proper, commonly recognized form.\n\n\
             Context: {}\n\n\
             Rules:\n\
             1. If the input is a valid query (even if slightly misspelled), correct it to the standard spelling/format\n\
             2. If the input is clearly invalid (random characters, gibberish), return the original unchanged\n\
             3. Return ONLY a JSON object with \"corrected\" (the corrected query) and \"note\" \
             (brief explanation, or null if no correction needed)\n\n\
             Examples:\n\
             - \"Bengalore\" -> {{\"corrected\": \"Bangalore\", \"note\": \"Corrected 'Bengalore' to 'Bangalore'\"}}\n\
             - \"btc\" -> {{\"corrected\": \"bitcoin\", \"note\": \"Corrected 'btc' to 'bitcoin'\"}}\n\
             - \"Tokyo\" -> {{\"corrected\": \"Tokyo\", \"note\": null}}",
            context.guidance()
        );
        let user = format!("Correct this query if it's misspelled or non-standard: {}", query);

        let messages = vec![Message::system(system), Message::user(user)];
        let output = match self.llm.complete(&messages).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "query correction failed, using original");
                return (query, None);
            }
        };

        match serde_json::from_str::<Correction>(extract_json(&output)) {
            Ok(c) if !c.corrected.trim().is_empty()
                && c.corrected.to_lowercase() != query.to_lowercase() =>
            {
                tracing::info!(from = %query, to = %c.corrected, "query corrected");
                (c.corrected, c.note)
            }
            Ok(_) => (query, None),
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "unparseable correction output");
                (query, None)
            }
        }
    }

    /// 针对「查无此项」生成带原因的错误文案
    pub fn not_found_reason(tool: &str, query: &str) -> String {
        match tool {
            "weather" => {
                if Self::is_likely_invalid(query, 3) {
                    format!(
                        "No weather data found for '{}'. Reason: the city name appears to be invalid \
                         or contains random characters. Please provide a valid city name \
                         (e.g., 'London', 'New York', 'Tokyo').",
                        query
                    )
                } else {
                    format!(
                        "No weather data found for '{}'. Reason: the city name may be misspelled or \
                         the city doesn't exist in the weather database. Please check the spelling \
                         and try again.",
                        query
                    )
                }
            }
            "crypto" => format!(
                "Cryptocurrency '{}' not found. Reason: the coin name may be misspelled or not \
                 supported. Please provide a valid coin id (e.g., 'bitcoin', 'ethereum').",
                query
            ),
            _ => format!("'{}' not found", query),
        }
    }
}

/// 从 LLM 输出中截取 JSON 块（```json 栅栏或首个 { 到末个 }）
pub(crate) fn extract_json(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn invalid_inputs_are_detected() {
        assert!(QueryOptimizer::is_likely_invalid("", 3));
        assert!(QueryOptimizer::is_likely_invalid("ab", 3));
        assert!(QueryOptimizer::is_likely_invalid("Xyz12", 3));
        assert!(QueryOptimizer::is_likely_invalid("!!--??", 3));

        assert!(!QueryOptimizer::is_likely_invalid("London", 3));
        assert!(!QueryOptimizer::is_likely_invalid("btc", 2));
    }

    #[tokio::test]
    async fn invalid_query_short_circuits_without_llm() {
        // LLM 回复是乱码 JSON，若被调用会产生纠正；短路时不应发生
        let llm = Arc::new(MockLlmClient::with_replies(vec![
            r#"{"corrected": "SHOULD NOT HAPPEN", "note": "x"}"#.to_string(),
        ]));
        let optimizer = QueryOptimizer::new(llm, true);

        let (corrected, note) = optimizer.correct_query("Xyz12", QueryContext::City).await;
        assert_eq!(corrected, "Xyz12");
        assert!(note.is_none());
    }

    #[tokio::test]
    async fn correction_carries_note() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![
            r#"{"corrected": "Bangalore", "note": "Corrected 'Bengalore' to 'Bangalore'"}"#.to_string(),
        ]));
        let optimizer = QueryOptimizer::new(llm, true);

        let (corrected, note) = optimizer.correct_query("Bengalore", QueryContext::City).await;
        assert_eq!(corrected, "Bangalore");
        assert_eq!(note.as_deref(), Some("Corrected 'Bengalore' to 'Bangalore'"));
    }

    #[tokio::test]
    async fn identical_correction_is_dropped() {
        let llm = Arc::new(MockLlmClient::with_replies(vec![
            r#"{"corrected": "tokyo", "note": "case"}"#.to_string(),
        ]));
        let optimizer = QueryOptimizer::new(llm, true);

        let (corrected, note) = optimizer.correct_query("Tokyo", QueryContext::City).await;
        assert_eq!(corrected, "Tokyo");
        assert!(note.is_none());
    }

    #[test]
    fn extracts_fenced_and_bare_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("noise {\"a\": 1} trailing"), "{\"a\": 1}");
        assert_eq!(extract_json("{\"a\": 1}"), "{\"a\": 1}");
    }
}
