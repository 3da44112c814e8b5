//! Echo handler.
//!
//! Reflects the request shape (method, path, selected headers) and the
//! route's execution-local data back as JSON. Useful for wiring checks and
//! as the reference app in route tests.

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use http::header::CONTENT_TYPE;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::AppConfig;
use strata_pipeline::{Handler, HandlerFactory};

pub struct EchoFactory;

impl HandlerFactory for EchoFactory {
    fn kind(&self) -> &'static str {
        "echo"
    }

    fn build(&self, id: &str, config: &AppConfig) -> anyhow::Result<Arc<dyn Handler>> {
        let AppConfig::Echo = config else {
            anyhow::bail!("echo factory got {:?} config", config.kind());
        };
        Ok(Arc::new(Echo { id: id.to_string() }))
    }
}

struct Echo {
    id: String,
}

#[async_trait]
impl Handler for Echo {
    async fn handle_http(
        &self,
        req: Request,
        data: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Response> {
        let body = json!({
            "app": self.id,
            "method": req.method().as_str(),
            "path": req.uri().path(),
            "query": req.uri().query(),
            "data": data,
        });
        Ok(Response::builder()
            .status(200)
            .header(CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))?)
    }
}
