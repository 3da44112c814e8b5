pub mod context;
pub mod handler;
pub mod middleware;
pub mod pool;

pub use context::RequestContext;
pub use handler::{Handler, HandlerCatalog, HandlerFactory, HandlerRegistry};
pub use middleware::{
    MiddlewareCatalog, MiddlewareFactory, MiddlewareInstance, MiddlewareVerdict, run_request_hooks,
    run_response_hooks,
};
pub use pool::MiddlewarePool;
