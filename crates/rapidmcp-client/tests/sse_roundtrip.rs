//! SSE client transport against a live rapidmcp server

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use pretty_assertions::assert_eq;
use serde_json::json;

use rapidmcp_client::{ClientTransport, SseTransport};
use rapidmcp_protocol::Tool;
use rapidmcp_server::{McpServer, ServerConfig};

fn echo_server() -> McpServer {
    McpServer::builder()
        .name("sse-e2e")
        .tool(Tool::new(
            "echo",
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"],
            }),
            |args| Ok(args["message"].clone()),
        ))
        .build()
        .expect("server builds")
}

#[tokio::test]
async fn request_round_trip_over_sse() {
    let server = echo_server();
    let sse = server.sse_server();
    let addr = sse.start().await.expect("bind");

    let transport = SseTransport::connect(format!("http://{addr}"), "/sse")
        .await
        .expect("connect");

    let session_id = transport.session_id().expect("session id learned");
    assert_eq!(session_id.len(), 32);

    let init = transport
        .request("initialize", json!({"capabilities": {}}))
        .await
        .expect("initialize");
    assert_eq!(init["serverInfo"]["name"], json!("sse-e2e"));

    let result = transport
        .request(
            "tools/call",
            json!({"name": "echo", "arguments": {"message": "ping-pong"}}),
        )
        .await
        .expect("tools/call");
    assert_eq!(result["content"][0]["text"], json!("ping-pong"));

    // Unknown methods surface the peer's JSON-RPC error.
    let err = transport
        .request("tools/unknown", json!({}))
        .await
        .expect_err("unknown method");
    match err {
        rapidmcp_protocol::Error::Client { code, .. } => assert_eq!(code, -32601),
        other => panic!("unexpected error: {other}"),
    }

    transport.close().await.unwrap();
    sse.stop();
}

#[tokio::test]
async fn sampling_handler_answers_server_initiated_request() {
    let server = echo_server();
    let sse = server.sse_server();
    let addr = sse.start().await.expect("bind");

    let transport = SseTransport::connect(format!("http://{addr}"), "/sse")
        .await
        .expect("connect");
    transport.on_server_request(
        "sampling/createMessage",
        Arc::new(|_params| {
            async {
                Ok(json!({
                    "role": "assistant",
                    "content": [{"type": "text", "text": "hi"}],
                }))
            }
            .boxed()
        }),
    );

    transport
        .request("initialize", json!({"capabilities": {"sampling": {}}}))
        .await
        .expect("initialize");

    let session_id = transport.session_id().unwrap();
    let session = sse.get_session(&session_id).expect("session registered");
    assert!(session.supports_sampling());

    let result = session
        .create_message(json!({"messages": []}), Duration::from_secs(5))
        .await
        .expect("sampling served by client handler");
    assert_eq!(result["content"][0]["text"], json!("hi"));

    transport.close().await.unwrap();
    sse.stop();
}
