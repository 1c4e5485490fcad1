#![forbid(unsafe_code)]
//! JSON-RPC envelope and the MCP method surface.

use crate::service::Service;
use crate::tools::{build_tools_list, find_group, group_allows_method};
use serde::Deserialize;
use serde_json::{json, Value};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "codex-orchestrator";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    #[serde(rename = "jsonrpc")]
    pub _jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub params: Option<Value>,
}

pub fn json_rpc_response(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn json_rpc_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolCallParams {
    name: String,
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroupCallArguments {
    method: String,
    params: Value,
}

/// Handle one decoded payload. Returns `None` for notifications (no `id`).
pub fn handle_payload(service: &mut Service, payload: &[u8]) -> Option<Value> {
    let parsed: Result<Value, _> = serde_json::from_slice(payload);
    let Ok(data) = parsed else {
        return Some(json_rpc_error(None, -32700, "invalid JSON-RPC request"));
    };

    let Some(object) = data.as_object() else {
        return Some(json_rpc_error(None, -32600, "request must be an object"));
    };
    let request_id = object.get("id").cloned();
    let has_method = object
        .get("method")
        .and_then(|value| value.as_str())
        .map(|method| !method.trim().is_empty())
        .unwrap_or(false);
    if !has_method {
        return Some(json_rpc_error(request_id, -32600, "method is required"));
    }

    let request: JsonRpcRequest = match serde_json::from_value(data) {
        Ok(request) => request,
        Err(_) => {
            return Some(json_rpc_error(request_id, -32600, "invalid JSON-RPC request"));
        }
    };

    // Notifications (absent or null id) receive no response.
    let id = match request.id {
        None | Some(Value::Null) => return None,
        Some(id) => id,
    };

    match request.method.as_str() {
        "initialize" => Some(json_rpc_response(
            Some(id),
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
                "capabilities": { "tools": {} },
            }),
        )),
        "ping" => Some(json_rpc_response(Some(id), json!({}))),
        "tools/list" => Some(json_rpc_response(
            Some(id),
            json!({ "tools": build_tools_list() }),
        )),
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            match handle_tool_call(service, params) {
                Ok(result) => Some(json_rpc_response(Some(id), result)),
                Err(message) => Some(json_rpc_error(Some(id), -32000, &message)),
            }
        }
        other => Some(json_rpc_error(
            Some(id),
            -32601,
            &format!("method not found: {other}"),
        )),
    }
}

fn handle_tool_call(service: &mut Service, params: Value) -> Result<Value, String> {
    if params.is_null() {
        return Err("tools/call params are required".to_string());
    }
    let input: ToolCallParams = serde_json::from_value(params)
        .map_err(|err| format!("invalid tools/call params: {err}"))?;

    let Some(group) = find_group(&input.name) else {
        return Ok(tool_error_result(&format!("unknown tool: {}", input.name)));
    };

    let arguments: GroupCallArguments = serde_json::from_value(input.arguments)
        .map_err(|err| format!("invalid {} arguments: {err}", input.name))?;

    let method = arguments.method.trim();
    if method.is_empty() {
        return Err(format!("{} requires arguments.method", input.name));
    }
    if !group_allows_method(group, method) {
        return Ok(tool_error_result(&format!(
            "method '{method}' is not valid for tool '{}'",
            input.name
        )));
    }

    let params = match arguments.params {
        Value::Null => json!({}),
        other => other,
    };

    match service.handle(method, params) {
        Ok(result) => tool_success_result(result),
        Err(err) => Ok(tool_error_result(err.message())),
    }
}

fn tool_success_result(result: Value) -> Result<Value, String> {
    let text = serde_json::to_string_pretty(&result)
        .map_err(|err| format!("failed to serialize tool result: {err}"))?;
    Ok(json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": result,
    }))
}

fn tool_error_result(message: &str) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }],
        "isError": true,
    })
}
