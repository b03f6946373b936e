#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! MCP Server Integration Tests
//!
//! Drives a full client session over an in-memory pipe against a started search service.

mod common;

use catalog_search::mcp::{ConnectionState, McpServer, register_catalog_tools};
use catalog_search::service::CatalogService;
use common::{KeywordEmbedder, REVIEWS_CATALOG, SHOP_CATALOG, config_in, write_catalog};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

struct Client {
    writer: tokio::io::WriteHalf<DuplexStream>,
    lines: Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
    next_id: i64,
}

impl Client {
    async fn send(&mut self, message: &Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("server should accept input");
    }

    async fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id;
        self.send(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;

        let line = self
            .lines
            .next_line()
            .await
            .expect("server output should be readable")
            .expect("server should reply");
        let reply: Value = serde_json::from_str(&line).expect("reply should be JSON");
        assert_eq!(reply["id"], id);
        reply
    }

    async fn call_tool(&mut self, name: &str, arguments: Value) -> (Value, bool) {
        let reply = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await;
        let result = &reply["result"];
        let text = result["content"][0]["text"]
            .as_str()
            .expect("tool result should hold text");
        (
            serde_json::from_str(text).expect("tool text should be JSON"),
            result["isError"] == json!(true),
        )
    }
}

async fn start_session(
    service: &Arc<CatalogService>,
) -> (Client, Arc<McpServer>, tokio::task::JoinHandle<()>) {
    let server = Arc::new(McpServer::new(
        "catalog-search".to_string(),
        "test".to_string(),
    ));
    register_catalog_tools(&server, service).await;

    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (client_read, client_write) = tokio::io::split(client_side);

    let serving = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        serving
            .serve(BufReader::new(server_read), server_write)
            .await
            .expect("server should exit cleanly at EOF");
    });

    let client = Client {
        writer: client_write,
        lines: BufReader::new(client_read).lines(),
        next_id: 0,
    };
    (client, server, handle)
}

#[tokio::test]
async fn full_client_session() {
    let dir = TempDir::new().expect("should create temp dir");
    let config = config_in(&dir);
    write_catalog(&config.catalog.metadata_path, SHOP_CATALOG, 0);

    let service = Arc::new(
        CatalogService::start_with(&config, Arc::new(KeywordEmbedder::default()))
            .await
            .expect("service should start"),
    );
    let (mut client, server, handle) = start_session(&service).await;

    let init = client
        .request(
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "integration", "version": "1.0"}
            }),
        )
        .await;
    assert_eq!(init["result"]["protocolVersion"], "2025-06-18");
    client
        .send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;

    let tools = client.request("tools/list", json!({})).await;
    assert_eq!(tools["result"]["tools"].as_array().map(Vec::len), Some(3));
    assert_eq!(server.connection_state().await, ConnectionState::Ready);

    let (body, is_error) = client.call_tool("search_tables", json!({"query": "USERS"})).await;
    assert!(!is_error);
    assert_eq!(body["results"][0]["table_name"], "USERS");
    assert_eq!(body["results"][0]["similarity_score"], 0.0);

    let (body, is_error) = client.call_tool("search_tables", json!({"query": "   "})).await;
    assert!(!is_error);
    assert_eq!(body["results"], json!([]));

    write_catalog(&config.catalog.metadata_path, REVIEWS_CATALOG, 5);
    let (body, is_error) = client.call_tool("refresh_index", json!({})).await;
    assert!(!is_error);
    assert_eq!(body["status"], "updated");
    assert!(body["detail"].is_string());

    let (body, _) = client
        .call_tool("search_tables", json!({"query": "review ratings"}))
        .await;
    assert_eq!(body["results"][0]["table_name"], "REVIEWS");

    let broken = dir.path().join("broken.json");
    write_catalog(&broken, "{\"tables\": ", 0);
    let (body, is_error) = client
        .call_tool("refresh_index", json!({"metadata_path": broken}))
        .await;
    assert!(is_error);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["kind"], "ParseError");

    let (status, _) = client.call_tool("index_status", json!({})).await;
    assert_eq!(status["stats"]["rebuilds"], 2);
    assert_eq!(status["table_count"], 2);

    drop(client);
    handle.await.expect("server task should not panic");
    assert_eq!(server.connection_state().await, ConnectionState::Closed);

    service.shutdown().await;
}

#[tokio::test]
async fn protocol_errors_do_not_end_the_session() {
    let dir = TempDir::new().expect("should create temp dir");
    let service = Arc::new(CatalogService::new(&config_in(&dir)));
    let (mut client, _server, handle) = start_session(&service).await;

    let unknown = client.request("prompts/list", json!({})).await;
    assert_eq!(unknown["error"]["code"], -32601);

    let bad_params = client
        .request("tools/call", json!({"name": "search_tables", "arguments": {"query": 5}}))
        .await;
    assert_eq!(bad_params["error"]["code"], -32602);

    let (body, is_error) = client.call_tool("search_tables", json!({"query": "users"})).await;
    assert!(is_error);
    assert_eq!(body["error"]["kind"], "Unavailable");

    let ping = client.request("ping", json!({})).await;
    assert_eq!(ping["result"], json!({}));

    drop(client);
    handle.await.expect("server task should not panic");
}
