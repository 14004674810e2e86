use std::sync::Arc;

use parley::config::{ConfigProvider, HttpConfigProvider, TokenProvider};
use parley::error::ParleyError;
use parley::lookup::{AzureSearchClient, LookupClient, SearchConfig};
use parley::tools::builtin::search_tool;
use parley::tools::{Tool, ToolArguments, ToolExecutionContext};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_config(endpoint: String) -> SearchConfig {
    SearchConfig {
        endpoint,
        api_key: "search-key".into(),
        index: "docs-idx".into(),
        content_field: "chunk".into(),
        identifier_field: "chunk_id".into(),
        semantic_configuration: None,
    }
}

async fn mount_search(server: &MockServer, documents: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/indexes/docs-idx/docs/search"))
        .and(query_param("api-version", "2023-11-01"))
        .and(header("api-key", "search-key"))
        .and(body_partial_json(json!({"search": "refund policy"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": documents })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn remote_config_is_fetched_and_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "endpoint": "https://voice.example",
            "token": "remote-token",
            "pre_defined_scenarios": {
                "support": {"instructions": "Be patient and concise."}
            }
        })))
        .mount(&server)
        .await;

    let provider = HttpConfigProvider::new(server.uri());
    let config = provider
        .fetch()
        .await
        .expect("fetch should succeed")
        .expect("config should be served");

    assert_eq!(config.endpoint, "https://voice.example");
    assert_eq!(
        config.scenario("support").map(|s| s.instructions.as_str()),
        Some("Be patient and concise.")
    );
    assert_eq!(
        provider.fetch_token().await.expect("token should resolve"),
        "remote-token"
    );
}

#[tokio::test]
async fn missing_remote_config_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let provider = HttpConfigProvider::new(format!("{}/", server.uri()));
    assert!(provider.fetch().await.expect("404 is not an error").is_none());
    assert!(matches!(
        provider.fetch_token().await,
        Err(ParleyError::Authentication(_))
    ));
}

#[tokio::test]
async fn remote_config_server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let error = HttpConfigProvider::new(server.uri())
        .fetch()
        .await
        .expect_err("500 should fail");
    assert!(matches!(error, ParleyError::Api { status: 500, .. }));
}

#[tokio::test]
async fn search_client_maps_configured_fields() {
    let server = MockServer::start().await;
    mount_search(
        &server,
        json!([
            {"chunk_id": "doc-7", "chunk": "Refunds take five days."},
            {"chunk_id": "doc-2", "chunk": "Store credit is instant."}
        ]),
    )
    .await;

    let client = AzureSearchClient::new(search_config(server.uri()));
    let hits = client
        .search("refund policy", &client.options(5))
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].identifier, "doc-7");
    assert_eq!(hits[0].content, "Refunds take five days.");
    assert_eq!(hits[1].identifier, "doc-2");
}

#[tokio::test]
async fn search_tool_separates_each_hit() {
    let server = MockServer::start().await;
    mount_search(
        &server,
        json!([
            {"chunk_id": "a", "chunk": "first"},
            {"chunk_id": "b", "chunk": "second"},
            {"chunk_id": "c", "chunk": "third"}
        ]),
    )
    .await;

    let client: Arc<dyn LookupClient> = Arc::new(AzureSearchClient::new(search_config(server.uri())));
    let output = search_tool(Some(client))
        .execute(
            &ToolArguments::parse(r#"{"query":"refund policy"}"#).expect("arguments should parse"),
            &ToolExecutionContext::default(),
        )
        .await
        .expect("search tool should succeed");

    assert_eq!(output.matches("-----").count(), 3);
    assert!(output.starts_with("[a]: first"));
    assert!(output.find("[b]: second") < output.find("[c]: third"));
}

#[tokio::test]
async fn search_tool_with_no_hits_is_empty() {
    let server = MockServer::start().await;
    mount_search(&server, json!([])).await;

    let client: Arc<dyn LookupClient> = Arc::new(AzureSearchClient::new(search_config(server.uri())));
    let output = search_tool(Some(client))
        .execute(
            &ToolArguments::parse(r#"{"query":"refund policy"}"#).expect("arguments should parse"),
            &ToolExecutionContext::default(),
        )
        .await
        .expect("search tool should succeed");

    assert_eq!(output, "");
}
