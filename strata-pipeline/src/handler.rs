use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strata_core::{AppConfig, Config};
use tracing::debug;

/// The only surface the core depends on for an app: handle one HTTP
/// request with the route's execution-local data. A non-`Ok` return maps
/// to `500 Internal Server Error` in the route wrapper; handlers must not
/// panic on normal inputs.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle_http(
        &self,
        req: Request,
        data: &BTreeMap<String, Value>,
    ) -> anyhow::Result<Response>;
}

/// Builds handler instances for one app-config kind. Factories must be
/// deterministic and idempotent: the registry reuses instances across
/// generations whenever `(kind, id, config)` is unchanged, so two builds
/// from the same inputs must be interchangeable.
pub trait HandlerFactory: Send + Sync {
    fn kind(&self) -> &'static str;

    fn build(&self, id: &str, config: &AppConfig) -> anyhow::Result<Arc<dyn Handler>>;
}

/// Immutable kind → factory table, built once at startup.
pub struct HandlerCatalog {
    factories: HashMap<&'static str, Arc<dyn HandlerFactory>>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, factory: Arc<dyn HandlerFactory>) {
        let kind = factory.kind();
        tracing::info!(kind, "Registered handler factory");
        self.factories.insert(kind, factory);
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn HandlerFactory>> {
        self.factories.get(kind)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for HandlerCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// App-ID → handler lookup for one validated config.
///
/// Built during staging; instances whose `(kind, id, config)` identity is
/// unchanged from the previous generation are carried over rather than
/// rebuilt, so a handler may outlive the server that first used it.
pub struct HandlerRegistry {
    handlers: HashMap<String, RegistryEntry>,
}

struct RegistryEntry {
    kind: &'static str,
    fingerprint: u64,
    handler: Arc<dyn Handler>,
}

impl HandlerRegistry {
    pub fn build(
        catalog: &HandlerCatalog,
        config: &Config,
        previous: Option<&HandlerRegistry>,
    ) -> anyhow::Result<Self> {
        let mut handlers = HashMap::with_capacity(config.apps.len());
        for app in &config.apps {
            let kind = app.config.kind();
            let fingerprint = app.config.fingerprint();

            if let Some(prev) = previous
                && let Some(entry) = prev.handlers.get(&app.id)
                && entry.kind == kind
                && entry.fingerprint == fingerprint
            {
                debug!(app = %app.id, kind, "Reusing handler instance");
                handlers.insert(
                    app.id.clone(),
                    RegistryEntry {
                        kind,
                        fingerprint,
                        handler: Arc::clone(&entry.handler),
                    },
                );
                continue;
            }

            let factory = catalog
                .get(kind)
                .ok_or_else(|| anyhow::anyhow!("no handler factory registered for kind {kind:?}"))?;
            let handler = factory.build(&app.id, &app.config)?;
            debug!(app = %app.id, kind, "Built handler instance");
            handlers.insert(
                app.id.clone(),
                RegistryEntry {
                    kind,
                    fingerprint,
                    handler,
                },
            );
        }
        Ok(Self { handlers })
    }

    pub fn resolve(&self, app_id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(app_id).map(|e| Arc::clone(&e.handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::config::{LoggingConfig, Version};
    use strata_core::{App, AppConfig};

    struct Fixed;

    #[async_trait]
    impl Handler for Fixed {
        async fn handle_http(
            &self,
            _req: Request,
            _data: &BTreeMap<String, Value>,
        ) -> anyhow::Result<Response> {
            Ok(Response::new(axum::body::Body::empty()))
        }
    }

    struct FixedFactory;

    impl HandlerFactory for FixedFactory {
        fn kind(&self) -> &'static str {
            "static_response"
        }
        fn build(&self, _id: &str, _config: &AppConfig) -> anyhow::Result<Arc<dyn Handler>> {
            Ok(Arc::new(Fixed))
        }
    }

    fn catalog() -> HandlerCatalog {
        let mut c = HandlerCatalog::new();
        c.register(Arc::new(FixedFactory));
        c
    }

    fn config_with(body: &str) -> Config {
        Config {
            version: Version::V1Alpha1,
            logging: LoggingConfig::default(),
            listeners: vec![],
            endpoints: vec![],
            apps: vec![App {
                id: "hello".into(),
                config: AppConfig::StaticResponse {
                    status: 200,
                    body: body.into(),
                    content_type: None,
                },
            }],
        }
    }

    #[test]
    fn unchanged_app_reuses_previous_instance() {
        let catalog = catalog();
        let first = HandlerRegistry::build(&catalog, &config_with("hi"), None).unwrap();
        let second = HandlerRegistry::build(&catalog, &config_with("hi"), Some(&first)).unwrap();
        assert!(Arc::ptr_eq(
            &first.resolve("hello").unwrap(),
            &second.resolve("hello").unwrap()
        ));
    }

    #[test]
    fn changed_config_rebuilds_instance() {
        let catalog = catalog();
        let first = HandlerRegistry::build(&catalog, &config_with("hi"), None).unwrap();
        let second = HandlerRegistry::build(&catalog, &config_with("bye"), Some(&first)).unwrap();
        assert!(!Arc::ptr_eq(
            &first.resolve("hello").unwrap(),
            &second.resolve("hello").unwrap()
        ));
    }

    #[test]
    fn unknown_kind_fails_the_build() {
        let empty = HandlerCatalog::new();
        assert!(HandlerRegistry::build(&empty, &config_with("hi"), None).is_err());
    }
}
