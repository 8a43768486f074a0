use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::{ETAG, HeaderName, HeaderValue, IF_NONE_MATCH};
use tracing::{debug, instrument};

use super::errors::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Sent as `If-None-Match` when present.
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub etag: Option<String>,
    /// Empty on `304 Not Modified`.
    pub body: String,
}

/// Upstream HTTP access. `200..=299` and `304` are `Ok`; every other status
/// and every transport failure is an `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, req: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, req), fields(url = %req.url), level = "debug")]
    async fn get(&self, req: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = self.http.get(&req.url);

        for (name, value) in &req.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            builder = builder.header(name, value);
        }

        if let Some(etag) = &req.etag {
            let value = HeaderValue::from_str(etag)
                .map_err(|_| FetchError::InvalidHeader(IF_NONE_MATCH.to_string()))?;
            builder = builder.header(IF_NONE_MATCH, value);
        }

        let resp = builder.send().await?;
        let status = resp.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!("upstream not modified");
            return Ok(HttpResponse {
                status: status.as_u16(),
                etag: req.etag.clone(),
                body: String::new(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = resp.text().await?;

        debug!(status = status.as_u16(), bytes = body.len(), etag = ?etag, "upstream fetched");

        Ok(HttpResponse {
            status: status.as_u16(),
            etag,
            body,
        })
    }
}
