//! Endpoint definitions and the API registry.
//!
//! An endpoint is named, is either a query or a mutation, and knows how to
//! turn a JSON argument record into an [`HttpRequest`]. Path segments written
//! as `{name}` are filled from the argument field `name`; the remaining
//! fields become query parameters (`GET`, `DELETE`) or the JSON body
//! (`POST`, `PUT`, `PATCH`).

use crate::error::QueryError;
use crate::tag::{Tag, id_text};
use marquee_core::http::{HttpRequest, Method};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Computes tags from `(result, args)`
pub type TagsFn = Arc<dyn Fn(&Value, &Value) -> Vec<Tag> + Send + Sync>;

/// Query or mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Read; results are cached and provide tags
    Query,
    /// Write; confirmed results invalidate tags
    Mutation,
}

impl EndpointKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// One API endpoint
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    kind: EndpointKind,
    method: Method,
    path: String,
    tags: Option<TagsFn>,
    ttl: Option<Duration>,
    retention: Option<Duration>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// `GET` query endpoint
    #[must_use]
    pub fn query(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Query,
            method: Method::Get,
            path: path.into(),
            tags: None,
            ttl: None,
            retention: None,
        }
    }

    /// Mutation endpoint
    #[must_use]
    pub fn mutation(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Mutation,
            method,
            path: path.into(),
            tags: None,
            ttl: None,
            retention: None,
        }
    }

    /// Tags this query provides for a result
    #[must_use]
    pub fn provides<F>(mut self, tags: F) -> Self
    where
        F: Fn(&Value, &Value) -> Vec<Tag> + Send + Sync + 'static,
    {
        self.tags = Some(Arc::new(tags));
        self
    }

    /// Tags this mutation invalidates once confirmed
    #[must_use]
    pub fn invalidates<F>(self, tags: F) -> Self
    where
        F: Fn(&Value, &Value) -> Vec<Tag> + Send + Sync + 'static,
    {
        self.provides(tags)
    }

    /// Freshness window, overriding the cache default
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// How long an unsubscribed entry is kept, overriding the cache default
    #[must_use]
    pub const fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Endpoint name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query or mutation
    #[must_use]
    pub const fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Tags provided (query) or invalidated (mutation) for `result` and `args`
    #[must_use]
    pub fn tags(&self, result: &Value, args: &Value) -> Vec<Tag> {
        self.tags.as_ref().map(|tags| tags(result, args)).unwrap_or_default()
    }

    /// Effective freshness window
    #[must_use]
    pub fn ttl(&self, defaults: &CacheConfig) -> Duration {
        self.ttl.unwrap_or(defaults.default_ttl)
    }

    /// Effective retention window
    #[must_use]
    pub fn retention(&self, defaults: &CacheConfig) -> Duration {
        self.retention.unwrap_or(defaults.default_retention)
    }

    /// Build the request for `args`
    ///
    /// A scalar argument fills the first path placeholder, or becomes the
    /// body of a mutation without placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidArguments`] when a path placeholder has
    /// no matching argument.
    pub fn request(&self, args: &Value) -> Result<HttpRequest, QueryError> {
        let mut remaining = match args {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        let mut scalar = match args {
            Value::Object(_) | Value::Null => None,
            other => Some(other),
        };

        let mut path = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
                break;
            };
            path.push_str(&rest[..open]);
            let placeholder = &rest[open + 1..close];
            let value = remaining
                .remove(placeholder)
                .or_else(|| scalar.take().cloned())
                .ok_or_else(|| QueryError::InvalidArguments {
                    endpoint: self.name.clone(),
                    message: format!("missing path parameter `{placeholder}`"),
                })?;
            path.push_str(&id_text(&value));
            rest = &rest[close + 1..];
        }
        path.push_str(rest);

        let mut request = HttpRequest::new(self.method, path);
        if self.method.has_body() {
            if !remaining.is_empty() {
                request = request.with_body(Value::Object(remaining));
            } else if let Some(value) = scalar {
                request = request.with_body(value.clone());
            }
        } else {
            let mut params: Vec<(String, String)> = remaining
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| (name, id_text(&value)))
                .collect();
            params.sort();
            request.params = params;
        }
        Ok(request)
    }
}

/// Cache-wide defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Freshness window for endpoints without their own
    pub default_ttl: Duration,
    /// Retention window for endpoints without their own
    pub default_retention: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60),
            default_retention: Duration::from_secs(60),
        }
    }
}

/// Registry of endpoints, keyed by name
#[derive(Debug, Clone, Default)]
pub struct Api {
    endpoints: HashMap<String, Arc<Endpoint>>,
    config: CacheConfig,
}

impl Api {
    /// Empty registry with default cache settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint, replacing any with the same name
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints
            .insert(endpoint.name.clone(), Arc::new(endpoint));
        self
    }

    /// Cache-wide defaults
    #[must_use]
    pub const fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Current defaults
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `name` and check it is of `kind`
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownEndpoint`] or
    /// [`QueryError::WrongEndpointKind`].
    pub fn get(&self, name: &str, kind: EndpointKind) -> Result<Arc<Endpoint>, QueryError> {
        let endpoint = self
            .endpoints
            .get(name)
            .ok_or_else(|| QueryError::UnknownEndpoint(name.to_string()))?;
        if endpoint.kind != kind {
            return Err(QueryError::WrongEndpointKind {
                endpoint: name.to_string(),
                expected: kind.name(),
            });
        }
        Ok(Arc::clone(endpoint))
    }

    /// Names of all registered endpoints, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::list_tags;
    use serde_json::json;

    fn api() -> Api {
        Api::new()
            .endpoint(
                Endpoint::query("getEvents", "/events")
                    .provides(|result, _| list_tags("EventList", "Event", result)),
            )
            .endpoint(Endpoint::query("getEvent", "/events/{id}").with_ttl(Duration::from_secs(5)))
            .endpoint(
                Endpoint::mutation("updateEvent", Method::Patch, "/events/{id}")
                    .invalidates(|_, args| vec![Tag::entity("Event", &args["id"])]),
            )
    }

    #[test]
    fn test_query_params_are_sorted_and_skip_nulls() -> Result<(), QueryError> {
        let endpoint = api().get("getEvents", EndpointKind::Query)?;
        let request = endpoint.request(&json!({ "q": "jazz", "city": "porto", "page": 2, "tag": null }))?;

        assert_eq!(request.path, "/events");
        assert_eq!(
            request.params,
            vec![
                ("city".to_string(), "porto".to_string()),
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "jazz".to_string()),
            ]
        );
        assert_eq!(request.body, None);
        Ok(())
    }

    #[test]
    fn test_path_placeholder_and_body() -> Result<(), QueryError> {
        let endpoint = api().get("updateEvent", EndpointKind::Mutation)?;
        let request = endpoint.request(&json!({ "id": 7, "title": "Moved" }))?;

        assert_eq!(request.method, Method::Patch);
        assert_eq!(request.path, "/events/7");
        assert_eq!(request.body, Some(json!({ "title": "Moved" })));
        Ok(())
    }

    #[test]
    fn test_scalar_argument_fills_placeholder() -> Result<(), QueryError> {
        let endpoint = api().get("getEvent", EndpointKind::Query)?;
        assert_eq!(endpoint.request(&json!("abc"))?.path, "/events/abc");
        assert_eq!(endpoint.ttl(&CacheConfig::default()), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_missing_placeholder_is_rejected() -> Result<(), QueryError> {
        let endpoint = api().get("getEvent", EndpointKind::Query)?;
        let error = endpoint.request(&json!({})).err();
        assert!(matches!(error, Some(QueryError::InvalidArguments { .. })));
        Ok(())
    }

    #[test]
    fn test_lookup_errors() {
        let api = api();
        assert_eq!(
            api.get("getOrders", EndpointKind::Query).err(),
            Some(QueryError::UnknownEndpoint("getOrders".into()))
        );
        assert!(matches!(
            api.get("getEvents", EndpointKind::Mutation).err(),
            Some(QueryError::WrongEndpointKind { expected: "mutation", .. })
        ));
        assert_eq!(api.names(), vec!["getEvent", "getEvents", "updateEvent"]);
    }

    #[test]
    fn test_tags_from_result_and_args() -> Result<(), QueryError> {
        let api = api();
        let update = api.get("updateEvent", EndpointKind::Mutation)?;
        assert_eq!(
            update.tags(&Value::Null, &json!({ "id": 7 })),
            vec![Tag::entity("Event", &json!(7))]
        );
        let get_event = api.get("getEvent", EndpointKind::Query)?;
        assert!(get_event.tags(&json!({}), &json!(1)).is_empty());
        Ok(())
    }
}
