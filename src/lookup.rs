//! Knowledge-lookup service client used by the `search` tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ParleyError;

const SEARCH_API_VERSION: &str = "2023-11-01";

/// Query options for a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub top: usize,
    pub content_field: String,
    pub identifier_field: String,
}

/// One ranked lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub identifier: String,
    pub content: String,
}

/// Ranked text-snippet lookup.
#[async_trait]
pub trait LookupClient: Send + Sync {
    /// Default field selection for [`LookupClient::search`].
    fn options(&self, top: usize) -> SearchOptions;

    async fn search(&self, query: &str, options: &SearchOptions)
        -> Result<Vec<SearchHit>, ParleyError>;
}

/// Settings for [`AzureSearchClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index: String,
    pub content_field: String,
    pub identifier_field: String,
    /// Semantic ranker configuration; plain keyword ranking when `None`.
    pub semantic_configuration: Option<String>,
}

impl SearchConfig {
    /// Read `AZURE_SEARCH_*` variables. Returns `None` unless endpoint, key,
    /// and index are all present.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Some(Self {
            endpoint: var("AZURE_SEARCH_ENDPOINT")?,
            api_key: var("AZURE_SEARCH_API_KEY")?,
            index: var("AZURE_SEARCH_INDEX")?,
            content_field: var("AZURE_SEARCH_CONTENT_FIELD").unwrap_or_else(|| "chunk".into()),
            identifier_field: var("AZURE_SEARCH_IDENTIFIER_FIELD")
                .unwrap_or_else(|| "chunk_id".into()),
            semantic_configuration: var("AZURE_SEARCH_SEMANTIC_CONFIGURATION")
                .or_else(|| Some("default".into())),
        })
    }
}

/// REST client for an Azure AI Search index.
#[derive(Debug, Clone)]
pub struct AzureSearchClient {
    http: reqwest::Client,
    config: SearchConfig,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

impl AzureSearchClient {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={SEARCH_API_VERSION}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index
        )
    }
}

#[async_trait]
impl LookupClient for AzureSearchClient {
    fn options(&self, top: usize) -> SearchOptions {
        SearchOptions {
            top,
            content_field: self.config.content_field.clone(),
            identifier_field: self.config.identifier_field.clone(),
        }
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, ParleyError> {
        let mut body = json!({
            "search": query,
            "top": options.top,
            "select": format!("{},{}", options.content_field, options.identifier_field),
        });
        if let Some(semantic) = &self.config.semantic_configuration {
            body["queryType"] = Value::String("semantic".into());
            body["semanticConfiguration"] = Value::String(semantic.clone());
        }

        let response = self
            .http
            .post(self.search_url())
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ParleyError::api(status.as_u16(), text));
        }

        let parsed: SearchResponse = response.json().await?;
        tracing::debug!(hits = parsed.value.len(), "lookup search completed");
        Ok(parsed
            .value
            .into_iter()
            .take(options.top)
            .map(|doc| SearchHit {
                identifier: field_text(&doc, &options.identifier_field),
                content: field_text(&doc, &options.content_field),
            })
            .collect())
    }
}

fn field_text(doc: &Map<String, Value>, field: &str) -> String {
    match doc.get(field) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
