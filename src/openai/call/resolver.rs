use std::panic::{self, AssertUnwindSafe};

use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::openai::history::{ToolInvocationRequest, ToolResult};
use crate::openai::tools::ToolRegistry;

fn error_result(req: &ToolInvocationRequest, body: Value) -> ToolResult {
    ToolResult {
        call_id: req.id.clone(),
        name: req.name.clone(),
        content: body.to_string(),
        is_error: true,
    }
}

/// モデルの引数テキストを解析する
///
/// 空文字は `{}`、JSON 文字列単体は `{"query": ...}` として扱う
pub fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    let value: Value = serde_json::from_str(raw)?;
    Ok(match value {
        Value::String(s) => json!({ "query": s }),
        other => other,
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// 要求を1件解決して実行する
///
/// # Arguments
/// * `req` - ツール実行要求
/// * `registry` - ツールレジストリ
///
/// # Returns
/// 要求 ID 付きの `ToolResult`。未登録・引数不正・エラー・パニックもエラー内容の結果になる
pub fn execute_tool_call(req: &ToolInvocationRequest, registry: &ToolRegistry) -> ToolResult {
    let Some(tool) = registry.get(&req.name) else {
        warn!(target: "footfall", tool = %req.name, "tool not found");
        return error_result(req, json!({ "error": "tool not found", "tool": req.name }));
    };

    let args = match parse_arguments(&req.arguments) {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "footfall", tool = %req.name, error = %e, "argument parse failed");
            return error_result(
                req,
                json!({ "error": "invalid arguments", "tool": req.name, "detail": e.to_string(), "raw": req.arguments }),
            );
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| tool.execute(&args))) {
        Ok(Ok(value)) => {
            debug!(target: "footfall", tool = %req.name, call_id = %req.id, "tool executed");
            ToolResult {
                call_id: req.id.clone(),
                name: req.name.clone(),
                content: value.to_string(),
                is_error: false,
            }
        }
        Ok(Err(e)) => {
            warn!(target: "footfall", tool = %req.name, error = %e, "tool execution failed");
            error_result(req, json!({ "error": "tool execution failed", "tool": req.name, "detail": e.to_string() }))
        }
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            warn!(target: "footfall", tool = %req.name, detail = %detail, "tool handler panicked");
            error_result(req, json!({ "error": "tool execution failed", "tool": req.name, "detail": detail }))
        }
    }
}

/// 全要求を順に実行する
///
/// # Arguments
/// * `requests` - モデルからの要求
/// * `registry` - ツールレジストリ
///
/// # Returns
/// 要求と同じ順序の結果（1要求につき1件）
#[instrument(name = "dispatch_tools", skip_all, fields(requests = requests.len()))]
pub fn dispatch(requests: &[ToolInvocationRequest], registry: &ToolRegistry) -> Vec<ToolResult> {
    requests.iter().map(|r| execute_tool_call(r, registry)).collect()
}
