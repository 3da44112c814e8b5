//! Console logger middleware.
//!
//! Emits one structured line when a request enters the chain and one when
//! the response leaves, through the process-wide tracing subscriber. An
//! optional `tag` is attached to both lines so operators can tell chains
//! apart.

use async_trait::async_trait;
use axum::response::Response;
use std::sync::Arc;
use strata_core::MiddlewareConfig;
use strata_pipeline::{MiddlewareFactory, MiddlewareInstance, MiddlewareVerdict, RequestContext};
use tracing::info;

pub struct ConsoleLoggerFactory;

impl MiddlewareFactory for ConsoleLoggerFactory {
    fn kind(&self) -> &'static str {
        "console_logger"
    }

    fn build(
        &self,
        id: &str,
        config: &MiddlewareConfig,
    ) -> anyhow::Result<Arc<dyn MiddlewareInstance>> {
        let MiddlewareConfig::ConsoleLogger { tag } = config else {
            anyhow::bail!("console_logger factory got {:?} config", config.kind());
        };
        Ok(Arc::new(ConsoleLogger {
            id: id.to_string(),
            tag: tag.clone(),
        }))
    }
}

struct ConsoleLogger {
    id: String,
    tag: Option<String>,
}

#[async_trait]
impl MiddlewareInstance for ConsoleLogger {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "console_logger"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> MiddlewareVerdict {
        info!(
            middleware = %self.id,
            tag = self.tag.as_deref().unwrap_or(""),
            method = %ctx.method,
            path = %ctx.path,
            "Request"
        );
        MiddlewareVerdict::Continue
    }

    fn on_response(&self, ctx: &RequestContext, response: &mut Response) {
        info!(
            middleware = %self.id,
            tag = self.tag.as_deref().unwrap_or(""),
            method = %ctx.method,
            path = %ctx.path,
            status = response.status().as_u16(),
            elapsed_ms = ctx.elapsed_ms(),
            "Response"
        );
    }
}
