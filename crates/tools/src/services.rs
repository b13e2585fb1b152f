//! External collaborators reached by tool handlers.
//!
//! Web search, page fetching, image generation and editing, log and
//! analytics reads, and dependency version resolution all sit behind the
//! same [`ExternalService`] trait. A handler whose service is not
//! configured answers with an error result.

use appforge_core::error::ToolError;
use async_trait::async_trait;
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One external capability.
///
/// `execute` receives the handler's validated arguments and returns the
/// JSON payload on success, or the failure reason.
#[async_trait]
pub trait ExternalService: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// The services available to the builtin handlers.
#[derive(Clone, Default)]
pub struct Services {
    pub web_search: Option<Arc<dyn ExternalService>>,
    pub page_fetch: Option<Arc<dyn ExternalService>>,
    pub image_generate: Option<Arc<dyn ExternalService>>,
    pub image_edit: Option<Arc<dyn ExternalService>>,
    pub logs: Option<Arc<dyn ExternalService>>,
    pub dependency_resolver: Option<Arc<dyn ExternalService>>,
}

impl Services {
    /// Only the HTTP page fetcher, which needs no credentials.
    pub fn with_page_fetcher() -> Result<Self, ToolError> {
        Ok(Self {
            page_fetch: Some(Arc::new(HttpPageFetcher::new()?)),
            ..Self::default()
        })
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = |s: &Option<Arc<dyn ExternalService>>| s.as_ref().map(|s| s.name().to_string());
        f.debug_struct("Services")
            .field("web_search", &name(&self.web_search))
            .field("page_fetch", &name(&self.page_fetch))
            .field("image_generate", &name(&self.image_generate))
            .field("image_edit", &name(&self.image_edit))
            .field("logs", &name(&self.logs))
            .field("dependency_resolver", &name(&self.dependency_resolver))
            .finish()
    }
}

/// Call a configured service, or fail with `ServiceUnavailable`.
pub(crate) async fn call(
    service: &Option<Arc<dyn ExternalService>>,
    capability: &str,
    arguments: serde_json::Value,
) -> Result<serde_json::Value, ToolError> {
    match service {
        Some(service) => {
            debug!(service = service.name(), capability, "Calling external service");
            service.execute(arguments).await
        }
        None => Err(ToolError::ServiceUnavailable(capability.to_string())),
    }
}

/// Default character budget for fetched page text.
const DEFAULT_MAX_CHARS: usize = 20_000;

/// Fetches a page over HTTP(S) and reduces HTML to readable text.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("appforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| fetch_failed(e.to_string()))?;
        Ok(Self {
            client,
            max_chars: DEFAULT_MAX_CHARS,
        })
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

/// Elements whose text is never shown.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new line of text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "nav", "aside", "h1", "h2", "h3",
    "h4", "h5", "h6", "li", "dt", "dd", "tr", "td", "th", "pre", "blockquote", "title", "figcaption",
];

/// Reduce an HTML document to readable text, one line per block element.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    let mut current_block = None;

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let mut block = None;
        let mut hidden = false;
        for ancestor in node.ancestors() {
            let Some(element) = ancestor.value().as_element() else {
                continue;
            };
            if HIDDEN_TAGS.contains(&element.name()) {
                hidden = true;
                break;
            }
            if block.is_none() && BLOCK_TAGS.contains(&element.name()) {
                block = Some(ancestor.id());
            }
        }
        if hidden {
            continue;
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(if block == current_block { ' ' } else { '\n' });
        }
        current_block = block;
        out.push_str(&words.join(" "));
    }
    out
}

fn fetch_failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "fetch_page".into(),
        reason,
    }
}

#[async_trait]
impl ExternalService for HttpPageFetcher {
    fn name(&self) -> &str {
        "http_page_fetcher"
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_failed(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| fetch_failed(format!("reading {url} failed: {e}")))?;

        if !status.is_success() {
            return Err(fetch_failed(format!("{url} returned HTTP {}", status.as_u16())));
        }

        let text = if content_type.contains("html") {
            html_to_text(&body)
        } else {
            body
        };
        let total_chars = text.chars().count();
        let content: String = text.chars().take(self.max_chars).collect();
        Ok(serde_json::json!({
            "url": url,
            "status": status.as_u16(),
            "content_type": content_type,
            "content": content,
            "truncated": total_chars > self.max_chars,
        }))
    }
}
