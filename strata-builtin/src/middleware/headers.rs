//! Headers middleware.
//!
//! Injects a fixed set of headers into the request before the handler runs
//! and/or onto the response on the way out. Header names and values are
//! parsed once at build time, so a bad name fails staging instead of
//! surfacing per-request.

use async_trait::async_trait;
use axum::response::Response;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::MiddlewareConfig;
use strata_pipeline::{MiddlewareFactory, MiddlewareInstance, MiddlewareVerdict, RequestContext};

pub struct HeadersFactory;

impl MiddlewareFactory for HeadersFactory {
    fn kind(&self) -> &'static str {
        "headers"
    }

    fn build(
        &self,
        id: &str,
        config: &MiddlewareConfig,
    ) -> anyhow::Result<Arc<dyn MiddlewareInstance>> {
        let MiddlewareConfig::Headers { request, response } = config else {
            anyhow::bail!("headers factory got {:?} config", config.kind());
        };
        Ok(Arc::new(Headers {
            id: id.to_string(),
            request: parse_headers(id, request)?,
            response: parse_headers(id, response)?,
        }))
    }
}

fn parse_headers(id: &str, raw: &BTreeMap<String, String>) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| anyhow::anyhow!("middleware {id}: bad header name {name:?}: {e}"))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| anyhow::anyhow!("middleware {id}: bad header value for {name}: {e}"))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

struct Headers {
    id: String,
    request: HeaderMap,
    response: HeaderMap,
}

#[async_trait]
impl MiddlewareInstance for Headers {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "headers"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> MiddlewareVerdict {
        for (name, value) in &self.request {
            ctx.headers.insert(name.clone(), value.clone());
        }
        MiddlewareVerdict::Continue
    }

    fn on_response(&self, _ctx: &RequestContext, response: &mut Response) {
        for (name, value) in &self.response {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(request: &[(&str, &str)], response: &[(&str, &str)]) -> MiddlewareConfig {
        MiddlewareConfig::Headers {
            request: request
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            response: response
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn injects_request_and_response_headers() {
        let mw = HeadersFactory
            .build(
                "01-hdr",
                &config(&[("x-tenant", "acme")], &[("x-served-by", "strata")]),
            )
            .unwrap();

        let (parts, _) = http::Request::builder()
            .uri("/x")
            .body(())
            .unwrap()
            .into_parts();
        let mut ctx = RequestContext::new(&parts, &Default::default());
        mw.on_request(&mut ctx).await;
        assert_eq!(ctx.header("x-tenant"), Some("acme"));

        let mut resp = Response::new(axum::body::Body::empty());
        mw.on_response(&ctx, &mut resp);
        assert_eq!(resp.headers()["x-served-by"], "strata");
    }

    #[test]
    fn bad_header_name_fails_at_build_time() {
        let err = match HeadersFactory.build("01-hdr", &config(&[("bad header", "v")], &[])) {
            Ok(_) => panic!("expected build to fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("bad header name"));
    }
}
