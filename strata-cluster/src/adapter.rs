use http::Method;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Config, HttpMethod, Listener, ListenerKind, RouteCondition, merge_middlewares};
use strata_pipeline::{Handler, HandlerCatalog, HandlerRegistry, MiddlewareInstance, MiddlewarePool};
use tracing::debug;
use uuid::Uuid;

/// Address and timeouts of one listener, with defaults already substituted.
/// Two specs being equal is half of the "leave the server running" test
/// during reconcile; the other half is route equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSpec {
    pub id: String,
    pub address: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub drain_timeout: Duration,
}

impl ListenerSpec {
    pub fn from_listener(listener: &Listener) -> Self {
        Self {
            id: listener.id.clone(),
            address: listener.address.clone(),
            read_timeout: listener.http.read_timeout(),
            write_timeout: listener.http.write_timeout(),
            idle_timeout: listener.http.idle_timeout(),
            drain_timeout: listener.http.drain_timeout(),
        }
    }
}

/// A route with its middleware chain materialised and its handler resolved.
pub struct AssembledRoute {
    pub condition_value: String,
    pub path_prefix: String,
    pub method: Option<Method>,
    pub chain: Vec<Arc<dyn MiddlewareInstance>>,
    pub handler: Arc<dyn Handler>,
    pub static_data: BTreeMap<String, Value>,
}

/// The immutable route table one server generation dispatches on.
///
/// Matching follows longest-prefix semantics via a radix tree: each prefix
/// registers itself and a `/{*rest}` catch-all, method-pinned routes go to
/// per-method matchers tried before the any-method matcher.
pub struct ListenerRoutes {
    routes: Vec<AssembledRoute>,
    method_matchers: HashMap<Method, matchit::Router<usize>>,
    any_matcher: matchit::Router<usize>,
    fingerprint: u64,
}

impl ListenerRoutes {
    fn build(routes: Vec<AssembledRoute>, fingerprint: u64) -> anyhow::Result<Self> {
        let mut method_matchers: HashMap<Method, matchit::Router<usize>> = HashMap::new();
        let mut any_matcher = matchit::Router::new();

        for (index, route) in routes.iter().enumerate() {
            let matcher = match &route.method {
                Some(method) => method_matchers.entry(method.clone()).or_default(),
                None => &mut any_matcher,
            };
            for pattern in prefix_patterns(&route.path_prefix) {
                matcher.insert(&pattern, index).map_err(|e| {
                    anyhow::anyhow!("route pattern {pattern:?} rejected by matcher: {e}")
                })?;
            }
        }

        Ok(Self {
            routes,
            method_matchers,
            any_matcher,
            fingerprint,
        })
    }

    /// Longest-prefix match; the method-pinned matcher wins over the
    /// any-method matcher for the same request.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<&AssembledRoute> {
        if let Some(matcher) = self.method_matchers.get(method)
            && let Ok(matched) = matcher.at(path)
        {
            return Some(&self.routes[*matched.value]);
        }
        self.any_matcher
            .at(path)
            .ok()
            .map(|matched| &self.routes[*matched.value])
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Value identity of this table: two tables with equal fingerprints
    /// assemble the same routes from the same configs.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

/// A prefix matches itself and everything below it.
fn prefix_patterns(path_prefix: &str) -> Vec<String> {
    let base = path_prefix.trim_end_matches('/');
    if base.is_empty() {
        vec!["/".to_string(), "/{*rest}".to_string()]
    } else {
        vec![base.to_string(), format!("{base}/{{*rest}}")]
    }
}

/// Immutable projection of one committed config into the shape the listener
/// cluster consumes: listener specs plus per-listener assembled routes.
///
/// One adapter exists per transaction; the current one is swapped in
/// atomically at commit. The handler registry that resolved this adapter's
/// routes rides along so the next generation can reuse unchanged instances.
pub struct Adapter {
    pub tx_id: Uuid,
    pub listeners: HashMap<String, ListenerSpec>,
    pub routes: HashMap<String, Arc<ListenerRoutes>>,
    registry: Arc<HandlerRegistry>,
    middleware_keys: HashSet<(String, String)>,
}

impl Adapter {
    /// Project a validated config. Middleware instances come from the pool
    /// (created on miss, reused when `(kind, id, config)` is unchanged);
    /// handlers come from a registry built against `previous` for reuse.
    pub fn build(
        tx_id: Uuid,
        config: &Config,
        catalog: &HandlerCatalog,
        pool: &MiddlewarePool,
        previous: Option<&Adapter>,
    ) -> anyhow::Result<Self> {
        let registry = Arc::new(HandlerRegistry::build(
            catalog,
            config,
            previous.map(|a| a.registry.as_ref()),
        )?);

        let mut listeners = HashMap::new();
        let mut routes = HashMap::new();
        let mut middleware_keys = HashSet::new();

        for listener in &config.listeners {
            if listener.kind != ListenerKind::Http {
                continue;
            }
            let spec = ListenerSpec::from_listener(listener);

            let mut assembled = Vec::new();
            let mut signature = DefaultHasher::new();
            for endpoint in config.endpoints_for(&listener.id) {
                for route in &endpoint.routes {
                    let RouteCondition::Http {
                        path_prefix,
                        method,
                    } = &route.condition
                    else {
                        continue;
                    };

                    let merged = merge_middlewares(&endpoint.middlewares, &route.middlewares);
                    let mut chain = Vec::with_capacity(merged.len());
                    for mw in &merged {
                        middleware_keys.insert((mw.config.kind().to_string(), mw.id.clone()));
                        mw.id.hash(&mut signature);
                        mw.config.fingerprint().hash(&mut signature);
                        chain.push(pool.materialize(mw)?);
                    }

                    let handler = registry.resolve(&route.app_id).ok_or_else(|| {
                        anyhow::anyhow!(
                            "endpoint {}: no handler for app {:?}",
                            endpoint.id,
                            route.app_id
                        )
                    })?;
                    let app_fingerprint = config
                        .app(&route.app_id)
                        .map(|a| a.config.fingerprint())
                        .unwrap_or_default();

                    route.condition.value().hash(&mut signature);
                    route.app_id.hash(&mut signature);
                    app_fingerprint.hash(&mut signature);
                    serde_json::to_string(&route.static_data)
                        .unwrap_or_default()
                        .hash(&mut signature);

                    assembled.push(AssembledRoute {
                        condition_value: route.condition.value(),
                        path_prefix: path_prefix.clone(),
                        method: method.map(to_http_method),
                        chain,
                        handler,
                        static_data: route.static_data.clone(),
                    });
                }
            }

            debug!(listener = %listener.id, routes = assembled.len(), "Assembled listener");
            let table = ListenerRoutes::build(assembled, signature.finish())?;
            listeners.insert(listener.id.clone(), spec);
            routes.insert(listener.id.clone(), Arc::new(table));
        }

        Ok(Self {
            tx_id,
            listeners,
            routes,
            registry,
            middleware_keys,
        })
    }

    /// `(kind, id)` pairs of every middleware this adapter references; the
    /// pool drops everything else at commit.
    pub fn middleware_keys(&self) -> &HashSet<(String, String)> {
        &self.middleware_keys
    }
}

fn to_http_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
        HttpMethod::Connect => Method::CONNECT,
        HttpMethod::Trace => Method::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_patterns_cover_self_and_subtree() {
        assert_eq!(prefix_patterns("/echo"), vec!["/echo", "/echo/{*rest}"]);
        assert_eq!(prefix_patterns("/echo/"), vec!["/echo", "/echo/{*rest}"]);
        assert_eq!(prefix_patterns("/"), vec!["/", "/{*rest}"]);
    }
}
