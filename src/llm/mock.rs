//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预置回复；耗尽后回显最后一条 User 消息，便于本地跑通流水线。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：scripted 回复队列
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一串回复，complete 时按先进先出弹出
    pub fn with_replies(replies: Vec<String>) -> Self {
        let mut replies = replies;
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Some(reply) = self.replies.lock().unwrap().pop() {
            return Ok(reply);
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}
