use crate::middleware::{MiddlewareCatalog, MiddlewareInstance};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use strata_core::Middleware;
use tracing::debug;

/// Two-level middleware instance cache keyed by `(kind, id)`.
///
/// An instance is reused across adapters when its `(kind, id, config)`
/// triple is identical to the cached one; a config change under the same
/// key replaces the instance. The pool survives transactions; entries that
/// the newest committed adapter no longer references are dropped at commit
/// via [`MiddlewarePool::retain`].
pub struct MiddlewarePool {
    catalog: Arc<MiddlewareCatalog>,
    entries: DashMap<(String, String), PoolEntry>,
}

struct PoolEntry {
    fingerprint: u64,
    instance: Arc<dyn MiddlewareInstance>,
}

impl MiddlewarePool {
    pub fn new(catalog: Arc<MiddlewareCatalog>) -> Self {
        Self {
            catalog,
            entries: DashMap::new(),
        }
    }

    /// Return the pooled instance for this middleware, creating (or
    /// replacing) it when the `(kind, id, config)` identity has no match.
    pub fn materialize(&self, mw: &Middleware) -> anyhow::Result<Arc<dyn MiddlewareInstance>> {
        let kind = mw.config.kind();
        let key = (kind.to_string(), mw.id.clone());
        let fingerprint = mw.config.fingerprint();

        if let Some(entry) = self.entries.get(&key)
            && entry.fingerprint == fingerprint
        {
            return Ok(Arc::clone(&entry.instance));
        }

        let factory = self
            .catalog
            .get(kind)
            .ok_or_else(|| anyhow::anyhow!("no middleware factory registered for kind {kind:?}"))?;
        let instance = factory.build(&mw.id, &mw.config)?;
        debug!(kind, id = %mw.id, "Built middleware instance");
        self.entries.insert(
            key,
            PoolEntry {
                fingerprint,
                instance: Arc::clone(&instance),
            },
        );
        Ok(instance)
    }

    /// Drop every entry whose `(kind, id)` is not in `live`. Called at
    /// commit with the keys the promoted adapter references.
    pub fn retain(&self, live: &HashSet<(String, String)>) {
        self.entries.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
