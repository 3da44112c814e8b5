use crate::error::ConfigError;
use crate::id::validate_id;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A named middleware entry in an endpoint- or route-level collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Middleware {
    pub id: String,
    pub config: MiddlewareConfig,
}

impl Middleware {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_id("middleware", &self.id)?;
        self.config.validate(&self.id)
    }
}

/// Middleware kinds as a tagged variant. Unknown kinds fail at the wire
/// boundary (serde), before the config ever reaches validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MiddlewareConfig {
    ConsoleLogger {
        #[serde(default)]
        tag: Option<String>,
    },
    Headers {
        /// Headers injected into the request before the handler runs.
        #[serde(default)]
        request: BTreeMap<String, String>,
        /// Headers set on the response.
        #[serde(default)]
        response: BTreeMap<String, String>,
    },
}

impl MiddlewareConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            MiddlewareConfig::ConsoleLogger { .. } => "console_logger",
            MiddlewareConfig::Headers { .. } => "headers",
        }
    }

    pub fn validate(&self, id: &str) -> Result<(), ConfigError> {
        match self {
            MiddlewareConfig::ConsoleLogger { .. } => Ok(()),
            MiddlewareConfig::Headers { request, response } => {
                for name in request.keys().chain(response.keys()) {
                    if name.is_empty() {
                        return Err(ConfigError::invalid(
                            format!("middleware {id}"),
                            "header names must not be empty",
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    /// Stable within-process fingerprint of this config, used by the
    /// instance pool to decide whether an existing instance can be reused.
    pub fn fingerprint(&self) -> u64 {
        let json = serde_json::to_string(self).expect("middleware config serialises");
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        hasher.finish()
    }
}

/// Merge endpoint-level (`base`) and route-level (`overrides`) middleware
/// collections into the chain applied to a route.
///
/// `merge(base, overrides) = sort_by_id(unique_by_id(concat(base, overrides)))`
/// where `unique_by_id` keeps the last occurrence, so a route entry replaces
/// the endpoint entry with the same ID. The sort is plain lexicographic on
/// the raw ID bytes (`10-x` sorts before `2-x`; zero-pad to order).
pub fn merge_middlewares(base: &[Middleware], overrides: &[Middleware]) -> Vec<Middleware> {
    let mut merged: Vec<Middleware> = Vec::with_capacity(base.len() + overrides.len());
    for mw in base.iter().chain(overrides.iter()) {
        if let Some(existing) = merged.iter_mut().find(|m| m.id == mw.id) {
            *existing = mw.clone();
        } else {
            merged.push(mw.clone());
        }
    }
    merged.sort_by(|a, b| a.id.as_bytes().cmp(b.id.as_bytes()));
    merged
}

/// Check that a single collection carries no duplicate IDs (the merge step
/// assumes this holds for each input).
pub fn check_unique_ids(scope: &str, middlewares: &[Middleware]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for mw in middlewares {
        if !seen.insert(mw.id.as_str()) {
            return Err(ConfigError::DuplicateMiddlewareId {
                scope: scope.to_string(),
                id: mw.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger(id: &str) -> Middleware {
        Middleware {
            id: id.to_string(),
            config: MiddlewareConfig::ConsoleLogger { tag: None },
        }
    }

    fn tagged_logger(id: &str, tag: &str) -> Middleware {
        Middleware {
            id: id.to_string(),
            config: MiddlewareConfig::ConsoleLogger {
                tag: Some(tag.to_string()),
            },
        }
    }

    #[test]
    fn merge_sorts_by_id_bytes() {
        let merged = merge_middlewares(&[logger("10-x"), logger("2-x")], &[]);
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        // Lexicographic on bytes, not numeric-aware.
        assert_eq!(ids, vec!["10-x", "2-x"]);
    }

    #[test]
    fn route_entry_overrides_endpoint_entry() {
        let base = vec![tagged_logger("01-a", "endpoint"), logger("02-b")];
        let overrides = vec![tagged_logger("01-a", "route"), logger("00-pre")];
        let merged = merge_middlewares(&base, &overrides);

        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["00-pre", "01-a", "02-b"]);

        let MiddlewareConfig::ConsoleLogger { tag } = &merged[1].config else {
            panic!("expected console logger");
        };
        assert_eq!(tag.as_deref(), Some("route"));
    }

    #[test]
    fn merged_ids_are_a_subset_and_unique() {
        let base = vec![logger("01-a"), logger("02-b")];
        let overrides = vec![logger("02-b"), logger("03-c")];
        let merged = merge_middlewares(&base, &overrides);
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["01-a", "02-b", "03-c"]);
    }

    #[test]
    fn duplicate_ids_in_one_collection_are_rejected() {
        let err = check_unique_ids("endpoint e1", &[logger("a"), logger("a")]).unwrap_err();
        assert!(err.to_string().contains("duplicate middleware id"));
    }

    #[test]
    fn fingerprint_tracks_config_changes() {
        let a = MiddlewareConfig::ConsoleLogger { tag: None };
        let b = MiddlewareConfig::ConsoleLogger {
            tag: Some("x".into()),
        };
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
