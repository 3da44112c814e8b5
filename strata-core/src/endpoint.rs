use crate::condition::RouteCondition;
use crate::error::ConfigError;
use crate::id::validate_id;
use crate::middleware::{Middleware, check_unique_ids};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::HashSet;

/// A group of routes bound to one listener, with endpoint-level middleware
/// applied to every route as the merge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Endpoint {
    pub id: String,

    /// FK into the listener table.
    pub listener_id: String,

    #[serde(default)]
    pub routes: Vec<Route>,

    #[serde(default)]
    pub middlewares: Vec<Middleware>,
}

/// One match predicate pointing at an app, with optional per-route static
/// data injected into every request the route serves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    /// FK into the app table.
    pub app_id: String,

    pub condition: RouteCondition,

    #[serde(default)]
    pub static_data: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub middlewares: Vec<Middleware>,
}

impl Route {
    pub fn validate(&self, field: &str) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if let Err(e) = validate_id("app", &self.app_id) {
            errors.push(e);
        }
        if let Err(e) = self.condition.validate(field) {
            errors.push(e);
        }
        if let Err(e) = check_unique_ids(field, &self.middlewares) {
            errors.push(e);
        }
        for mw in &self.middlewares {
            if let Err(e) = mw.validate() {
                errors.push(e);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl Endpoint {
    /// Local checks: ID syntax, middleware uniqueness, route validity, and
    /// no two routes with identical conditions within this endpoint.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if let Err(e) = validate_id("endpoint", &self.id) {
            errors.push(e);
        }
        if let Err(e) = validate_id("listener", &self.listener_id) {
            errors.push(e);
        }
        if let Err(e) = check_unique_ids(&format!("endpoint {}", self.id), &self.middlewares) {
            errors.push(e);
        }
        for mw in &self.middlewares {
            if let Err(e) = mw.validate() {
                errors.push(e);
            }
        }

        let mut seen: HashSet<(crate::condition::ConditionKind, String)> = HashSet::new();
        for (i, route) in self.routes.iter().enumerate() {
            let field = format!("endpoint {}: route #{i}", self.id);
            if let Err(mut errs) = route.validate(&field) {
                errors.append(&mut errs);
            }
            let key = (route.condition.kind(), route.condition.value());
            if !seen.insert(key) {
                errors.push(ConfigError::DuplicateRouteCondition {
                    endpoint: self.id.clone(),
                    condition: route.condition.value(),
                });
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::HttpMethod;

    fn route(prefix: &str, method: Option<HttpMethod>) -> Route {
        Route {
            app_id: "echo".into(),
            condition: RouteCondition::Http {
                path_prefix: prefix.into(),
                method,
            },
            static_data: BTreeMap::new(),
            middlewares: vec![],
        }
    }

    #[test]
    fn duplicate_condition_within_endpoint_is_rejected() {
        let ep = Endpoint {
            id: "e1".into(),
            listener_id: "l1".into(),
            routes: vec![route("/echo", None), route("/echo", None)],
            middlewares: vec![],
        };
        let errs = ep.validate().unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::DuplicateRouteCondition { .. })));
    }

    #[test]
    fn distinct_methods_are_distinct_conditions() {
        let ep = Endpoint {
            id: "e1".into(),
            listener_id: "l1".into(),
            routes: vec![route("/echo", Some(HttpMethod::Get)), route("/echo", None)],
            middlewares: vec![],
        };
        assert!(ep.validate().is_ok());
    }

    #[test]
    fn all_route_errors_are_collected() {
        let ep = Endpoint {
            id: "e1".into(),
            listener_id: "l1".into(),
            routes: vec![route("no-slash", None), route("also-bad", None)],
            middlewares: vec![],
        };
        let errs = ep.validate().unwrap_err();
        assert_eq!(
            errs.iter()
                .filter(|e| matches!(e, ConfigError::PathPrefixNotAbsolute { .. }))
                .count(),
            2
        );
    }
}
