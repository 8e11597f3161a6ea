//! Errors surfaced by queries and mutations.

use marquee_core::error::NetworkError;
use marquee_core::http::HttpResponse;
use thiserror::Error;

/// Normalized query or mutation failure
///
/// Stored on rejected cache entries, so it is cheap to clone and compare.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No response was received
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// The server answered with a failure status
    #[error("Request failed with status {status}: {message}")]
    Remote {
        /// HTTP status
        status: u16,
        /// Message from the response body
        message: String,
    },

    /// No endpoint with that name is registered
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// A mutation endpoint was used as a query, or the other way round
    #[error("Endpoint {endpoint} is not a {expected}")]
    WrongEndpointKind {
        /// Endpoint name
        endpoint: String,
        /// What the caller needed (`query` or `mutation`)
        expected: &'static str,
    },

    /// The arguments cannot fill the endpoint's path
    #[error("Invalid arguments for {endpoint}: {message}")]
    InvalidArguments {
        /// Endpoint name
        endpoint: String,
        /// What is wrong
        message: String,
    },
}

impl QueryError {
    /// Normalize a non-success response
    #[must_use]
    pub fn from_response(response: &HttpResponse) -> Self {
        Self::Remote {
            status: response.status,
            message: response.error_message(),
        }
    }

    /// HTTP-status-like code, when one is known
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::UnknownEndpoint(_) => Some(404),
            Self::InvalidArguments { .. } | Self::WrongEndpointKind { .. } => Some(400),
            Self::Network(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_error_from_body() {
        let response = HttpResponse::with_status(409, json!({ "message": "sold out" }));
        let error = QueryError::from_response(&response);

        assert_eq!(error.status(), Some(409));
        assert_eq!(error.to_string(), "Request failed with status 409: sold out");
    }

    #[test]
    fn test_network_error_has_no_status() {
        let error = QueryError::from(NetworkError::Timeout);
        assert_eq!(error.status(), None);
    }
}
