//! HTTP transport seam and the default reqwest implementation.

use crate::auth::Principal;
use crate::config::HttpSettings;
use crate::error::{Result, SoapError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// An outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Absolute URI or origin-form path
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub code: u16,
    pub reason_phrase: String,
    pub content: Vec<u8>,
}

/// Executes HTTP exchanges.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request`, authenticating as `principal` if given. `secure`
    /// forces TLS. Implementations that always buffer may ignore
    /// `read_full_body`.
    async fn execute(
        &self,
        request: HttpRequest,
        principal: Option<&Principal>,
        secure: bool,
        read_full_body: bool,
    ) -> Result<HttpResponse>;
}

/// Hands out clients scoped to a transaction.
pub trait HttpClientProvider: Send + Sync {
    fn new_client(&self, transaction_id: Option<&str>) -> Result<Arc<dyn HttpClient>>;
}

/// Provider backed by one pooled [`reqwest::Client`].
#[derive(Clone)]
pub struct ReqwestClientProvider {
    client: reqwest::Client,
}

impl ReqwestClientProvider {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(settings.user_agent.clone());
        if settings.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(settings.timeout_secs));
        }
        if settings.connect_timeout_secs > 0 {
            builder = builder.connect_timeout(Duration::from_secs(settings.connect_timeout_secs));
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl HttpClientProvider for ReqwestClientProvider {
    fn new_client(&self, transaction_id: Option<&str>) -> Result<Arc<dyn HttpClient>> {
        Ok(Arc::new(ReqwestHttpClient {
            client: self.client.clone(),
            transaction_id: transaction_id.map(str::to_string),
        }))
    }
}

struct ReqwestHttpClient {
    client: reqwest::Client,
    transaction_id: Option<String>,
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(
        &self,
        request: HttpRequest,
        principal: Option<&Principal>,
        secure: bool,
        _read_full_body: bool,
    ) -> Result<HttpResponse> {
        let url = request_url(&request, secure)?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| SoapError::Transport(format!("Invalid method {}: {}", request.method, e)))?;

        let mut builder = self.client.request(method, url.clone());
        for (name, value) in &request.headers {
            // Derived by the client from the URL and body
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("host") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        match principal {
            None => {}
            Some(Principal::Basic { name, password }) => {
                builder = builder.basic_auth(name, Some(password));
            }
            Some(Principal::Ntlm { domain, name, .. }) => {
                return Err(SoapError::Transport(format!(
                    "NTLM authentication for {}\\{} is not supported by the reqwest transport",
                    domain, name
                )));
            }
        }

        debug!(
            transaction_id = ?self.transaction_id,
            method = %request.method,
            url = %url,
            auth = principal.map(Principal::scheme).unwrap_or("none"),
            "Sending HTTP request"
        );

        let response = builder.body(request.body).send().await?;
        let status = response.status();
        let content = response.bytes().await?.to_vec();

        debug!(
            transaction_id = ?self.transaction_id,
            status = status.as_u16(),
            bytes = content.len(),
            "Received HTTP response"
        );

        Ok(HttpResponse {
            code: status.as_u16(),
            reason_phrase: status.canonical_reason().unwrap_or_default().to_string(),
            content,
        })
    }
}

/// Absolute URL for a request whose target may be origin-form.
fn request_url(request: &HttpRequest, secure: bool) -> Result<Url> {
    if request.target.starts_with("http://") || request.target.starts_with("https://") {
        let mut url = Url::parse(&request.target)?;
        if secure && url.scheme() != "https" {
            url.set_scheme("https")
                .map_err(|_| SoapError::Transport(format!("Cannot force TLS for {}", url)))?;
        }
        return Ok(url);
    }
    let host = request.header("Host").ok_or_else(|| {
        SoapError::Transport(format!("No Host header for target {}", request.target))
    })?;
    let scheme = if secure { "https" } else { "http" };
    Ok(Url::parse(&format!("{}://{}{}", scheme, host, request.target))?)
}
