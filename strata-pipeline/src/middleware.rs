use crate::context::RequestContext;
use async_trait::async_trait;
use axum::response::Response;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::MiddlewareConfig;
use tracing::debug;

/// Outcome of one middleware's request hook.
#[derive(Debug)]
pub enum MiddlewareVerdict {
    /// Continue to the next middleware / the handler.
    Continue,
    /// Short-circuit with this response; the handler never runs.
    Respond(Response),
}

/// A configured middleware instance bound into one or more route chains.
///
/// Instances are shared: the pool hands the same `Arc` to every route whose
/// `(kind, id, config)` triple matches, and an instance may outlive the
/// adapter that created it if the next generation reuses it. Implementations
/// therefore keep per-request state in the [`RequestContext`], never in
/// `self`.
#[async_trait]
pub trait MiddlewareInstance: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// Runs before the handler, in chain order. May short-circuit.
    async fn on_request(&self, ctx: &mut RequestContext) -> MiddlewareVerdict;

    /// Runs after the handler (or after a short-circuit) with the outgoing
    /// response. Must not fail; default is a no-op.
    fn on_response(&self, ctx: &RequestContext, response: &mut Response) {
        let _ = (ctx, response);
    }
}

/// Run the request hooks of a chain in order, stopping at the first
/// short-circuit.
pub async fn run_request_hooks(
    chain: &[Arc<dyn MiddlewareInstance>],
    ctx: &mut RequestContext,
) -> MiddlewareVerdict {
    for mw in chain {
        debug!(middleware = %mw.id(), kind = mw.kind(), "Running middleware");
        match mw.on_request(ctx).await {
            MiddlewareVerdict::Continue => {}
            MiddlewareVerdict::Respond(response) => {
                debug!(
                    middleware = %mw.id(),
                    status = response.status().as_u16(),
                    "Middleware short-circuited"
                );
                return MiddlewareVerdict::Respond(response);
            }
        }
    }
    MiddlewareVerdict::Continue
}

/// Run the response hooks of a chain, in reverse chain order so the first
/// middleware sees the final response.
pub fn run_response_hooks(
    chain: &[Arc<dyn MiddlewareInstance>],
    ctx: &RequestContext,
    response: &mut Response,
) {
    for mw in chain.iter().rev() {
        mw.on_response(ctx, response);
    }
}

/// Builds middleware instances for one config kind.
pub trait MiddlewareFactory: Send + Sync {
    fn kind(&self) -> &'static str;

    fn build(&self, id: &str, config: &MiddlewareConfig)
    -> anyhow::Result<Arc<dyn MiddlewareInstance>>;
}

/// Immutable kind → factory table, built once at startup.
pub struct MiddlewareCatalog {
    factories: HashMap<&'static str, Arc<dyn MiddlewareFactory>>,
}

impl MiddlewareCatalog {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: Arc<dyn MiddlewareFactory>) {
        let kind = factory.kind();
        tracing::info!(kind, "Registered middleware factory");
        self.factories.insert(kind, factory);
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn MiddlewareFactory>> {
        self.factories.get(kind)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for MiddlewareCatalog {
    fn default() -> Self {
        Self::new()
    }
}
