use crate::app::ports::{HttpResponse, PageRendererPort};
use crate::common::error::{Result, ScraperError};
use crate::infra::http_client::into_response;
use async_trait::async_trait;
use serde_json::json;

/// Client for a headless-browser render service (browserless-style `/content` endpoint):
/// POST `{"url": ...}` and receive the rendered HTML.
pub struct RenderServiceClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl RenderServiceClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token,
        }
    }

    fn request_url(&self) -> String {
        match &self.token {
            Some(token) => {
                let sep = if self.endpoint.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", self.endpoint, sep, token)
            }
            None => self.endpoint.clone(),
        }
    }
}

#[async_trait]
impl PageRendererPort for RenderServiceClient {
    async fn render(&self, url: &str) -> Result<HttpResponse> {
        tracing::debug!(url, endpoint = %self.endpoint, "Rendering page in headless browser");
        let body = json!({
            "url": url,
            "gotoOptions": { "waitUntil": "networkidle2" },
        });
        let resp = self
            .client
            .post(self.request_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ScraperError::fetch(url, None, format!("render service: {}", e)))?;
        into_response(url, resp).await
    }
}
