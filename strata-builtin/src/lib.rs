pub mod handler;
pub mod middleware;

use std::sync::Arc;
use strata_pipeline::{HandlerCatalog, MiddlewareCatalog};

/// Register every built-in middleware factory.
pub fn register_middlewares(catalog: &mut MiddlewareCatalog) {
    catalog.register(Arc::new(middleware::console_logger::ConsoleLoggerFactory));
    catalog.register(Arc::new(middleware::headers::HeadersFactory));
}

/// Register every built-in handler factory.
pub fn register_handlers(catalog: &mut HandlerCatalog) {
    catalog.register(Arc::new(handler::echo::EchoFactory));
    catalog.register(Arc::new(handler::static_response::StaticResponseFactory));
}

/// Catalogs pre-loaded with every built-in, as the server binary uses them.
pub fn default_catalogs() -> (MiddlewareCatalog, HandlerCatalog) {
    let mut middlewares = MiddlewareCatalog::new();
    register_middlewares(&mut middlewares);
    let mut handlers = HandlerCatalog::new();
    register_handlers(&mut handlers);
    (middlewares, handlers)
}
