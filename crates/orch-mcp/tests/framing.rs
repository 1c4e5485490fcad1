#![forbid(unsafe_code)]

mod support;

use orch_mcp::entry::{
    detect_mode_from_first_line, parse_content_length_header, read_content_length_frame,
    TransportMode,
};
use orch_mcp::jsonrpc::handle_payload;
use serde_json::json;
use std::io::Cursor;
use support::{service_for, temp_repo};

#[test]
fn framing_mode_is_detected_per_message() {
    assert_eq!(
        detect_mode_from_first_line("{\"jsonrpc\":\"2.0\"}"),
        Some(TransportMode::NewlineJson)
    );
    assert_eq!(
        detect_mode_from_first_line("Content-Length: 42\r\n"),
        Some(TransportMode::ContentLength)
    );
    assert_eq!(
        detect_mode_from_first_line("content-type: application/json\r\n"),
        Some(TransportMode::ContentLength)
    );
    assert_eq!(detect_mode_from_first_line("   "), None);
    assert_eq!(detect_mode_from_first_line("GET /health"), None);
}

#[test]
fn content_length_header_parsing() {
    assert_eq!(parse_content_length_header("Content-Length: 12"), Some(12));
    assert_eq!(parse_content_length_header("content-length:7"), Some(7));
    assert_eq!(parse_content_length_header("Content-Type: json"), None);
    assert_eq!(parse_content_length_header("Content-Length: x"), None);
}

#[test]
fn content_length_frames_round_trip() {
    let body = br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
    let framed = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut reader = Cursor::new([framed.as_bytes(), body.as_slice()].concat());

    let payload = read_content_length_frame(&mut reader, None)
        .expect("frame read")
        .expect("one frame");
    assert_eq!(payload, body);
}

#[test]
fn envelope_methods_and_error_codes() {
    let dir = temp_repo("envelope_methods_and_error_codes");
    let mut service = service_for(&dir);

    let init = handle_payload(
        &mut service,
        br#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
    )
    .expect("initialize responds");
    assert_eq!(init["result"]["serverInfo"]["name"], "codex-orchestrator");

    let ping = handle_payload(&mut service, br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#)
        .expect("ping responds");
    assert_eq!(ping["result"], json!({}));

    let notification = handle_payload(
        &mut service,
        br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
    );
    assert!(notification.is_none(), "notifications get no response");

    let invalid = handle_payload(&mut service, b"this is not json").expect("parse error responds");
    assert_eq!(invalid["error"]["code"], -32700);

    let missing_method =
        handle_payload(&mut service, br#"{"jsonrpc":"2.0","id":3}"#).expect("missing method");
    assert_eq!(missing_method["error"]["code"], -32600);

    let unknown = handle_payload(
        &mut service,
        br#"{"jsonrpc":"2.0","id":4,"method":"bogus/method"}"#,
    )
    .expect("unknown method responds");
    assert_eq!(unknown["error"]["code"], -32601);
}

#[test]
fn tools_list_and_group_dispatch() {
    let dir = temp_repo("tools_list_and_group_dispatch");
    let mut service = service_for(&dir);

    let listed = handle_payload(
        &mut service,
        br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
    )
    .expect("tools listed");
    let tools = listed["result"]["tools"].as_array().expect("tool array");
    assert_eq!(tools.len(), 9);

    let mut seen = std::collections::HashSet::new();
    for tool in tools {
        let methods = tool["inputSchema"]["properties"]["method"]["enum"]
            .as_array()
            .expect("method enum");
        for method in methods {
            let method = method.as_str().expect("method name");
            assert!(
                seen.insert(method.to_string()),
                "{method} listed in more than one group"
            );
        }
    }
    assert!(seen.contains("session.open"));
    assert!(seen.contains("merge.main.request"));
    assert!(seen.contains("inbox.deliver"));

    let call = handle_payload(
        &mut service,
        br#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"orch_workspace","arguments":{"method":"scheduler.decide_worktree","params":{"changed_files":12}}}}"#,
    )
    .expect("group call responds");
    assert_eq!(call["result"]["structuredContent"]["mode"], "worktree");

    let wrong_group = handle_payload(
        &mut service,
        br#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"orch_inbox","arguments":{"method":"session.open"}}}"#,
    )
    .expect("mismatched method responds");
    assert_eq!(wrong_group["result"]["isError"], true);

    let unknown_tool = handle_payload(
        &mut service,
        br#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"orch_bogus","arguments":{"method":"ping"}}}"#,
    )
    .expect("unknown tool responds");
    assert_eq!(unknown_tool["result"]["isError"], true);
}
