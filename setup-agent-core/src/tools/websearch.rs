//! Tavily web search client

use reqwest::Client;
use serde::{Deserialize, Serialize};
use setup_agent_error::{Error, ErrorKind, Result};
use std::time::Duration;

pub const TAVILY_API_KEY_VAR: &str = "TAVILY_API_KEY";
const TAVILY_BASE_URL: &str = "https://api.tavily.com";
const MAX_RESULTS: u32 = 5;
/// Raw page content is cut to keep tool results small enough for a prompt
const MAX_RAW_CONTENT_CHARS: usize = 8000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub include_answer: bool,
    pub include_raw_content: bool,
    pub include_images: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: MAX_RESULTS,
            include_answer: true,
            include_raw_content: true,
            include_images: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub images: Vec<serde_json::Value>,
}

impl SearchResponse {
    /// JSON handed back to a model as a tool result
    pub fn to_tool_result(&self) -> String {
        let mut trimmed = self.clone();
        for result in &mut trimmed.results {
            if let Some(raw) = &mut result.raw_content {
                if raw.chars().count() > MAX_RAW_CONTENT_CHARS {
                    *raw = raw.chars().take(MAX_RAW_CONTENT_CHARS).collect();
                }
            }
        }
        serde_json::to_string(&trimmed).unwrap_or_default()
    }
}

pub struct WebSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for WebSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearch")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WebSearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                Error::search_failed("failed to create HTTP client")
                    .with_operation("websearch::new")
                    .set_source(e)
                    .permanent()
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: TAVILY_BASE_URL.to_string(),
        })
    }

    /// Client keyed from `TAVILY_API_KEY`; `None` when it is unset
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(TAVILY_API_KEY_VAR) {
            Ok(key) if !key.trim().is_empty() => Self::new(key).map(Some),
            _ => {
                tracing::warn!("{} is not set; web search is disabled", TAVILY_API_KEY_VAR);
                Ok(None)
            }
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub async fn search(&self, query: &str) -> Result<SearchResponse> {
        tracing::info!("web search: {}", query);
        let response = self
            .client
            .post(format!("{}/search", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&SearchRequest::new(query))
            .send()
            .await
            .map_err(|e| {
                Error::new(ErrorKind::NetworkFailed, "web search request failed")
                    .with_operation("websearch::search")
                    .set_source(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::search_failed(format!(
                "web search returned {}: {}",
                status.as_u16(),
                body
            ))
            .with_operation("websearch::search")
            .with_context("status", status.as_u16().to_string()));
        }

        let body = response.text().await.map_err(|e| {
            Error::search_failed("failed to read web search response")
                .with_operation("websearch::search")
                .set_source(e)
        })?;
        parse_response(&body)
    }
}

pub fn parse_response(body: &str) -> Result<SearchResponse> {
    serde_json::from_str(body).map_err(|e| {
        Error::new(ErrorKind::ParseFailed, "web search response is not valid JSON")
            .with_operation("websearch::parse_response")
            .set_source(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(SearchRequest::new("install poetry macos")).unwrap();
        assert_eq!(body["query"], "install poetry macos");
        assert_eq!(body["max_results"], 5);
        assert_eq!(body["include_answer"], true);
        assert_eq!(body["include_raw_content"], true);
        assert_eq!(body["include_images"], true);
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "query": "poetry",
            "answer": "Use pipx install poetry.",
            "results": [
                {"title": "Poetry docs", "url": "https://python-poetry.org", "content": "Install", "raw_content": null, "score": 0.9}
            ],
            "images": [],
            "response_time": 1.2
        }"#;
        let parsed = parse_response(body).unwrap();
        assert_eq!(parsed.answer.as_deref(), Some("Use pipx install poetry."));
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].url, "https://python-poetry.org");

        let err = parse_response("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
    }

    #[test]
    fn test_tool_result_trims_raw_content() {
        let response = SearchResponse {
            query: "q".into(),
            answer: None,
            results: vec![SearchResult {
                title: "t".into(),
                url: "u".into(),
                content: "c".into(),
                raw_content: Some("x".repeat(MAX_RAW_CONTENT_CHARS + 100)),
                score: 0.5,
            }],
            images: vec![],
        };
        let value: serde_json::Value =
            serde_json::from_str(&response.to_tool_result()).unwrap();
        let raw = value["results"][0]["raw_content"].as_str().unwrap();
        assert_eq!(raw.len(), MAX_RAW_CONTENT_CHARS);
    }
}
