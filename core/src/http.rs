//! HTTP wire types exchanged with the [`HttpClient`](crate::environment::HttpClient)
//! collaborator.
//!
//! Bodies are JSON-compatible records (`serde_json::Value`). An error response
//! carries at least a numeric status and a human-readable message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether leftover arguments travel in the request body
    ///
    /// `GET` and `DELETE` send them as query parameters instead.
    #[must_use]
    pub const fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request handed to the HTTP collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Path relative to the API base URL, starting with `/`
    pub path: String,
    /// Query parameters, in a stable order
    pub params: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
    /// Bearer credential from the token supplier
    pub bearer: Option<String>,
}

impl HttpRequest {
    /// Create a request without params, body or credential
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    /// Append a query parameter
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Set the JSON body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a bearer credential
    #[must_use]
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

/// Response returned by the HTTP collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Decoded JSON body (`Value::Null` for empty bodies)
    pub data: Value,
}

impl HttpResponse {
    /// `200 OK` with the given body
    #[must_use]
    pub const fn ok(data: Value) -> Self {
        Self { status: 200, data }
    }

    /// Response with an explicit status
    #[must_use]
    pub const fn with_status(status: u16, data: Value) -> Self {
        Self { status, data }
    }

    /// 2xx status
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Human-readable failure message
    ///
    /// Prefers a `message` or `error` string in the body and falls back to
    /// `HTTP <status>`.
    #[must_use]
    pub fn error_message(&self) -> String {
        ["message", "error"]
            .iter()
            .find_map(|field| self.data.get(field).and_then(Value::as_str))
            .map_or_else(|| format!("HTTP {}", self.status), str::to_string)
    }
}
