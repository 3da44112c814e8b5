//! Static response handler.
//!
//! Answers every request with a fixed status and body. The body and content
//! type pass through env interpolation at validation time, so
//! `${REGION:local}` style templates are already expanded by the time the
//! factory sees them.

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::AppConfig;
use strata_pipeline::{Handler, HandlerFactory};

pub struct StaticResponseFactory;

impl HandlerFactory for StaticResponseFactory {
    fn kind(&self) -> &'static str {
        "static_response"
    }

    fn build(&self, id: &str, config: &AppConfig) -> anyhow::Result<Arc<dyn Handler>> {
        let AppConfig::StaticResponse {
            status,
            body,
            content_type,
        } = config
        else {
            anyhow::bail!("static_response factory got {:?} config", config.kind());
        };
        let status = StatusCode::from_u16(*status)
            .map_err(|_| anyhow::anyhow!("app {id}: invalid status {status}"))?;
        Ok(Arc::new(StaticResponse {
            status,
            body: body.clone(),
            content_type: content_type
                .clone()
                .unwrap_or_else(|| "text/plain; charset=utf-8".to_string()),
        }))
    }
}

struct StaticResponse {
    status: StatusCode,
    body: String,
    content_type: String,
}

#[async_trait]
impl Handler for StaticResponse {
    async fn handle_http(
        &self,
        _req: Request,
        _data: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Response> {
        Ok(Response::builder()
            .status(self.status)
            .header(CONTENT_TYPE, &self.content_type)
            .body(axum::body::Body::from(self.body.clone()))?)
    }
}
