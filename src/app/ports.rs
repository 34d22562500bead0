use async_trait::async_trait;

use crate::common::error::Result;

/// Uniform `{status, body}` shape returned by every network collaborator.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub content_type: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// Ingest-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// Plain GET. Transport failures are errors; non-2xx statuses are returned as responses.
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse>;
}

/// Fetches a page after client-side JavaScript has run in a headless browser.
#[async_trait]
pub trait PageRendererPort: Send + Sync {
    async fn render(&self, url: &str) -> Result<HttpResponse>;
}
