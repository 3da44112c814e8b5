use http::{HeaderMap, Method, request::Parts};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

/// Mutable per-request state threaded through the middleware chain and
/// into the handler.
///
/// The `data` map is execution-local: it is seeded from the route's static
/// data when the request arrives, middleware may read and write it, and the
/// handler receives the final view. It never outlives the request.
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,

    /// Request headers. Middleware mutations here are visible to the
    /// handler (the request is rebuilt from the context after the chain).
    pub headers: HeaderMap,

    /// Execution-local data map, seeded from the route's static data.
    pub data: BTreeMap<String, Value>,

    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(parts: &Parts, static_data: &BTreeMap<String, Value>) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers.clone(),
            data: static_data.clone(),
            started_at: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() * 1000.0
    }

    /// Case-insensitive request header lookup (names are normalised by
    /// `HeaderMap` itself).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str) -> Parts {
        let (parts, _) = http::Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("x-tenant", "acme")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn context_captures_request_shape() {
        let mut data = BTreeMap::new();
        data.insert("k".to_string(), serde_json::json!(1));
        let ctx = RequestContext::new(&parts("/echo?x=1"), &data);
        assert_eq!(ctx.method, Method::GET);
        assert_eq!(ctx.path, "/echo");
        assert_eq!(ctx.query.as_deref(), Some("x=1"));
        assert_eq!(ctx.header("x-tenant"), Some("acme"));
        assert_eq!(ctx.data["k"], serde_json::json!(1));
    }

    #[test]
    fn data_map_is_a_copy_of_static_data() {
        let data = BTreeMap::new();
        let mut ctx = RequestContext::new(&parts("/a"), &data);
        ctx.data.insert("added".into(), serde_json::json!(true));
        assert!(data.is_empty());
    }
}
