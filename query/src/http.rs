//! [`HttpClient`] backed by `reqwest`.

use futures::future::BoxFuture;
use marquee_core::environment::HttpClient;
use marquee_core::error::NetworkError;
use marquee_core::http::{HttpRequest, HttpResponse, Method};
use serde_json::Value;
use std::time::Duration;

/// HTTP collaborator talking to the storefront API over the network
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestHttpClient {
    /// Client for the API rooted at `base_url` (e.g. `https://api.example.com/api`)
    ///
    /// `timeout` bounds each request at the transport level.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the TLS backend cannot be initialized.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are resolved against
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn network_error(error: &reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout
    } else {
        NetworkError::Connection(error.to_string())
    }
}

impl HttpClient for ReqwestHttpClient {
    fn fetch(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, NetworkError>> {
        Box::pin(async move {
            let url = format!("{}{}", self.base_url, request.path);
            tracing::trace!(method = %request.method, url = %url, "Sending request");

            let mut builder = self.client.request(method(request.method), url);
            if !request.params.is_empty() {
                builder = builder.query(&request.params);
            }
            if let Some(token) = &request.bearer {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| network_error(&e))?;
            let status = response.status().as_u16();
            let bytes = response.bytes().await.map_err(|e| network_error(&e))?;

            let data = if bytes.is_empty() {
                Value::Null
            } else {
                match serde_json::from_slice(&bytes) {
                    Ok(data) => data,
                    // Error pages are often plain text; keep them as the message
                    Err(_) if !(200..300).contains(&status) => {
                        serde_json::json!({ "message": String::from_utf8_lossy(&bytes) })
                    },
                    Err(e) => return Err(NetworkError::InvalidBody(e.to_string())),
                }
            };
            Ok(HttpResponse { status, data })
        })
    }
}
