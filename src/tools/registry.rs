//! 工具注册表
//!
//! 按名称存储 Arc<dyn Tool>，支持 register / get / catalog。
//! (tool, action) 的解析发生在执行器里：先查工具，再在其动作签名表中查动作。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::tools::Tool;

/// 工具注册表
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 工具目录 JSON：name / description / actions（含参数名），
    /// 用于 Planner 的 system prompt 与 /api/tools
    pub fn catalog(&self) -> Value {
        let mut entries: Vec<Value> = self
            .tools
            .values()
            .map(|tool| {
                let actions: Vec<Value> = tool
                    .actions()
                    .iter()
                    .map(|a| {
                        serde_json::json!({
                            "name": a.name,
                            "params": a.params,
                        })
                    })
                    .collect();
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "actions": actions,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or_default()
                .cmp(b["name"].as_str().unwrap_or_default())
        });
        Value::Array(entries)
    }
}
