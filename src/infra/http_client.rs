use crate::app::ports::{HttpClientPort, HttpResponse};
use crate::common::error::{Result, ScraperError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    /// Builds a client with a per-request timeout so a stalled source cannot hold a run open.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }
}

pub(crate) async fn into_response(url: &str, resp: reqwest::Response) -> Result<HttpResponse> {
    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let body = resp
        .text()
        .await
        .map_err(|e| ScraperError::fetch(url, Some(status), format!("reading body: {}", e)))?;
    tracing::debug!(url, status, size = body.len(), "HTTP response");
    Ok(HttpResponse {
        status,
        body,
        content_type,
    })
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        tracing::debug!("HTTP GET request to: {}", url);
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| ScraperError::fetch(url, None, e.to_string()))?;
        into_response(url, resp).await
    }
}
