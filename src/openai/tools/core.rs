use std::collections::HashMap;
use std::sync::Arc;
use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use color_eyre::Result;
use serde_json::{json, Map, Value};

use crate::config::ConfigError;

/// ランタイムで実行するツール関数の型。
/// 引数(JSON)を受け取り、結果(JSON)を返す。同期実行。
pub type ToolHandler = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync + 'static>;

/// ツール引数の JSON Schema（object）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameters(Value);

impl ToolParameters {
    pub fn as_value(&self) -> &Value { &self.0 }
    pub fn into_value(self) -> Value { self.0 }
}

/// フラットな object スキーマ用のビルダー
#[derive(Debug, Default)]
pub struct ToolParametersBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
    additional_properties: Option<bool>,
}

impl ToolParametersBuilder {
    pub fn new_object() -> Self { Self::default() }

    pub fn add_string(mut self, name: &str, description: Option<&str>) -> Self {
        self.properties.insert(name.to_string(), property("string", description));
        self
    }

    pub fn add_integer(mut self, name: &str, description: Option<&str>, min: Option<i64>, max: Option<i64>) -> Self {
        let mut p = property("integer", description);
        if let Some(min) = min { p["minimum"] = json!(min); }
        if let Some(max) = max { p["maximum"] = json!(max); }
        self.properties.insert(name.to_string(), p);
        self
    }

    pub fn required(mut self, name: &str) -> Self {
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(allowed);
        self
    }

    pub fn build(self) -> ToolParameters {
        let mut schema = json!({
            "type": "object",
            "properties": Value::Object(self.properties),
            "required": self.required,
        });
        if let Some(allowed) = self.additional_properties {
            schema["additionalProperties"] = json!(allowed);
        }
        ToolParameters(schema)
    }
}

fn property(kind: &str, description: Option<&str>) -> Value {
    let mut p = json!({ "type": kind });
    if let Some(d) = description {
        p["description"] = json!(d);
    }
    p
}

/// モデルに渡すメタデータと実行ハンドラ
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
    pub strict: bool,
    handler: ToolHandler,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("strict", &self.strict)
            .finish()
    }
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: false,
            handler,
        }
    }

    /// strict フラグを設定（OpenAI の strict function 呼び出しモード用）
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn function_object(&self) -> FunctionObject {
        FunctionObject {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            parameters: Some(self.parameters.as_value().clone()),
            strict: Some(self.strict),
        }
    }

    /// ChatCompletionTool 形式（APIへ渡す vector 用）
    pub fn as_chat_tool(&self) -> ChatCompletionTool {
        ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: self.function_object(),
        }
    }

    pub fn execute(&self, args: &Value) -> Result<Value> {
        (self.handler)(args)
    }
}

/// 一意な名前で引けるツール集合。一度構築したら読み取り専用で共有する
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder { ToolRegistryBuilder::default() }

    pub fn empty() -> Self { Self::default() }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize { self.tools.len() }
    pub fn is_empty(&self) -> bool { self.tools.is_empty() }

    /// 登録順
    pub fn names(&self) -> Vec<&str> { self.tools.iter().map(|t| t.name.as_str()).collect() }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> { self.tools.iter() }

    pub fn chat_tools(&self) -> Vec<ChatCompletionTool> {
        self.tools.iter().map(|t| t.as_chat_tool()).collect()
    }
}

#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, tool: ToolDefinition) -> std::result::Result<Self, ConfigError> {
        if self.registry.index.contains_key(&tool.name) {
            return Err(ConfigError::DuplicateTool(tool.name));
        }
        self.registry.index.insert(tool.name.clone(), self.registry.tools.len());
        self.registry.tools.push(tool);
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry { self.registry }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_keys_tool() -> ToolDefinition {
        let params = ToolParametersBuilder::new_object()
            .add_string("payload", Some("Object whose keys are counted"))
            .required("payload")
            .build();
        ToolDefinition::new(
            "echo_keys",
            "Return number of keys in object",
            params,
            Arc::new(|v| {
                let obj = v
                    .get("payload")
                    .and_then(|p| p.as_object())
                    .ok_or_else(|| color_eyre::eyre::eyre!("missing payload object"))?;
                Ok(json!({ "len": obj.len() }))
            }),
        )
    }

    #[test]
    fn tool_definition_executes_closure() -> Result<()> {
        let tool = echo_keys_tool();
        let out = tool.execute(&json!({"payload": {"a": 1, "b": 2}}))?;
        assert_eq!(out["len"], 2);

        let chat_tool = tool.as_chat_tool();
        assert_eq!(chat_tool.function.name, "echo_keys");
        Ok(())
    }

    #[test]
    fn builder_emits_object_schema() {
        let v = ToolParametersBuilder::new_object()
            .add_string("query", Some("q"))
            .add_integer("limit", None, Some(1), Some(10))
            .required("query")
            .required("query")
            .additional_properties(false)
            .build()
            .into_value();
        assert_eq!(v["type"], "object");
        assert_eq!(v["properties"]["query"]["type"], "string");
        assert_eq!(v["properties"]["limit"]["maximum"], 10);
        assert_eq!(v["required"], json!(["query"]));
        assert_eq!(v["additionalProperties"], false);
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let err = ToolRegistry::builder()
            .register(echo_keys_tool())
            .and_then(|b| b.register(echo_keys_tool()))
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateTool("echo_keys".into()));
    }

    #[test]
    fn registry_lookup_by_name() {
        let reg = ToolRegistry::builder().register(echo_keys_tool()).unwrap().build();
        assert_eq!(reg.len(), 1);
        assert!(reg.get("echo_keys").is_some());
        assert!(reg.get("nope").is_none());
        assert_eq!(reg.chat_tools().len(), 1);
    }
}
