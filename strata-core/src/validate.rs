use crate::config::Config;
use crate::error::{ConfigError, ValidationErrors};
use crate::interpolate::interpolate_config;
use std::collections::HashMap;
use std::collections::HashSet;

/// Run the full conversion-and-validation pipeline on a proposed config:
/// defaults, env interpolation, then composite validation. The config is
/// mutated in place (defaults filled, variables expanded) so a successful
/// result is exactly the config the saga will commit.
pub fn process(config: &mut Config) -> Result<(), ValidationErrors> {
    config.apply_defaults();

    let mut errors = Vec::new();
    interpolate_config(config, &mut errors);
    collect(config, &mut errors);
    ValidationErrors::from_vec(errors)
}

/// Composite validation only; assumes defaults and interpolation already ran.
pub fn validate(config: &Config) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    collect(config, &mut errors);
    ValidationErrors::from_vec(errors)
}

fn collect(config: &Config, errors: &mut Vec<ConfigError>) {
    if let Err(e) = config.validate_version() {
        errors.push(e);
    }

    // Listeners: local checks, unique IDs, unique addresses.
    let mut listener_ids: HashSet<&str> = HashSet::new();
    let mut addresses: HashMap<&str, &str> = HashMap::new();
    for listener in &config.listeners {
        if let Err(e) = listener.validate() {
            errors.push(e);
        }
        if !listener_ids.insert(&listener.id) {
            errors.push(ConfigError::DuplicateListenerId(listener.id.clone()));
        }
        match addresses.get(listener.address.as_str()) {
            Some(first) => errors.push(ConfigError::DuplicateListenerAddress {
                address: listener.address.clone(),
                first: (*first).to_string(),
                second: listener.id.clone(),
            }),
            None => {
                addresses.insert(&listener.address, &listener.id);
            }
        }
    }

    // Apps: local checks, unique IDs. The table is needed for route refs.
    let mut app_ids: HashSet<&str> = HashSet::new();
    for app in &config.apps {
        if let Err(e) = app.validate() {
            errors.push(e);
        }
        if !app_ids.insert(&app.id) {
            errors.push(ConfigError::DuplicateAppId(app.id.clone()));
        }
    }

    // Endpoints: local checks, unique IDs, reference integrity.
    let mut endpoint_ids: HashSet<&str> = HashSet::new();
    for endpoint in &config.endpoints {
        if let Err(mut errs) = endpoint.validate() {
            errors.append(&mut errs);
        }
        if !endpoint_ids.insert(&endpoint.id) {
            errors.push(ConfigError::DuplicateEndpointId(endpoint.id.clone()));
        }
        if !listener_ids.contains(endpoint.listener_id.as_str()) {
            errors.push(ConfigError::UnknownListener {
                endpoint: endpoint.id.clone(),
                listener_id: endpoint.listener_id.clone(),
            });
        }
        for (i, route) in endpoint.routes.iter().enumerate() {
            if !app_ids.contains(route.app_id.as_str()) {
                errors.push(ConfigError::UnknownApp {
                    endpoint: endpoint.id.clone(),
                    index: i,
                    app_id: route.app_id.clone(),
                });
            }
        }
    }

    detect_route_conflicts(config, errors);
}

/// For every listener, hash each reachable route by its condition key; a
/// second occurrence on the same listener is a conflict naming both owning
/// endpoints. Collisions within one endpoint are already reported by
/// endpoint validation, so same-endpoint pairs are skipped here.
fn detect_route_conflicts(config: &Config, errors: &mut Vec<ConfigError>) {
    for listener in &config.listeners {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for endpoint in config.endpoints_for(&listener.id) {
            for route in &endpoint.routes {
                let key = format!(
                    "{}:{}",
                    route.condition.kind().as_str(),
                    route.condition.value()
                );
                match seen.get(key.as_str()) {
                    Some(first) if *first != endpoint.id => {
                        errors.push(ConfigError::RouteConflict {
                            listener: listener.id.clone(),
                            condition: route.condition.value(),
                            first: (*first).to_string(),
                            second: endpoint.id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(key, &endpoint.id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{App, AppConfig};
    use crate::condition::RouteCondition;
    use crate::config::{LoggingConfig, Version};
    use crate::endpoint::{Endpoint, Route};
    use crate::listener::{HttpListenerOptions, Listener, ListenerKind};
    use std::collections::BTreeMap;

    fn listener(id: &str, address: &str) -> Listener {
        Listener {
            id: id.into(),
            address: address.into(),
            kind: ListenerKind::Http,
            http: HttpListenerOptions::default(),
        }
    }

    fn route(app: &str, prefix: &str) -> Route {
        Route {
            app_id: app.into(),
            condition: RouteCondition::Http {
                path_prefix: prefix.into(),
                method: None,
            },
            static_data: BTreeMap::new(),
            middlewares: vec![],
        }
    }

    fn endpoint(id: &str, listener: &str, routes: Vec<Route>) -> Endpoint {
        Endpoint {
            id: id.into(),
            listener_id: listener.into(),
            routes,
            middlewares: vec![],
        }
    }

    fn echo_app() -> App {
        App {
            id: "echo".into(),
            config: AppConfig::Echo,
        }
    }

    fn base_config() -> Config {
        Config {
            version: Version::V1Alpha1,
            logging: LoggingConfig::default(),
            listeners: vec![listener("l1", "127.0.0.1:18080")],
            endpoints: vec![endpoint("e1", "l1", vec![route("echo", "/echo")])],
            apps: vec![echo_app()],
        }
    }

    #[test]
    fn valid_config_passes_and_gets_defaults() {
        let mut config = base_config();
        process(&mut config).unwrap();
        assert_eq!(config.listeners[0].http.read_timeout_ms, 60_000);
        assert_eq!(config.listeners[0].http.drain_timeout_ms, 30_000);
    }

    #[test]
    fn cross_endpoint_conflict_names_both_endpoints() {
        let mut config = base_config();
        config
            .endpoints
            .push(endpoint("e2", "l1", vec![route("echo", "/echo")]));
        let errs = process(&mut config).unwrap_err();
        let conflict = errs
            .iter()
            .find(|e| matches!(e, ConfigError::RouteConflict { .. }))
            .expect("conflict reported");
        let text = conflict.to_string();
        assert!(text.contains("e1"));
        assert!(text.contains("e2"));
        assert!(text.contains("/echo"));
    }

    #[test]
    fn same_condition_on_different_listeners_is_fine() {
        let mut config = base_config();
        config.listeners.push(listener("l2", "127.0.0.1:18081"));
        config
            .endpoints
            .push(endpoint("e2", "l2", vec![route("echo", "/echo")]));
        assert!(process(&mut config).is_ok());
    }

    #[test]
    fn dangling_references_are_reported() {
        let mut config = base_config();
        config.endpoints[0].listener_id = "ghost".into();
        config.endpoints[0].routes[0].app_id = "phantom".into();
        let errs = process(&mut config).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::UnknownListener { .. })));
        assert!(errs.iter().any(|e| matches!(e, ConfigError::UnknownApp { .. })));
    }

    #[test]
    fn duplicate_ids_and_addresses_are_reported_together() {
        let mut config = base_config();
        config.listeners.push(listener("l1", "127.0.0.1:18080"));
        config.apps.push(echo_app());
        let errs = process(&mut config).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::DuplicateListenerId(_))));
        assert!(errs.iter().any(|e| matches!(e, ConfigError::DuplicateListenerAddress { .. })));
        assert!(errs.iter().any(|e| matches!(e, ConfigError::DuplicateAppId(_))));
    }

    #[test]
    fn wrong_version_is_reported() {
        let mut config = base_config();
        config.version = Version::Unknown("v2".into());
        let errs = process(&mut config).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::UnsupportedVersion(_))));
    }

    #[test]
    fn interpolation_runs_before_field_checks() {
        // The expanded value (not the raw template) is what gets validated:
        // a static-data value referencing a set variable passes through.
        // SAFETY: test-local env mutation.
        unsafe { std::env::set_var("STRATA_TEST_REGION", "eu-1") };
        let mut config = base_config();
        config.endpoints[0].routes[0]
            .static_data
            .insert("region".into(), serde_json::json!("${STRATA_TEST_REGION}"));
        process(&mut config).unwrap();
        assert_eq!(
            config.endpoints[0].routes[0].static_data["region"],
            serde_json::json!("eu-1")
        );
    }

    #[test]
    fn missing_env_var_fails_validation() {
        let mut config = base_config();
        config.endpoints[0].routes[0]
            .static_data
            .insert("token".into(), serde_json::json!("${STRATA_TEST_UNSET_VAR}"));
        let errs = process(&mut config).unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, ConfigError::MissingEnvVar { .. })));
    }

    #[test]
    fn error_order_is_stable() {
        let mut a = base_config();
        a.listeners.push(listener("l1", "127.0.0.1:18080"));
        a.endpoints[0].routes[0].app_id = "phantom".into();
        let mut b = a.clone();
        let errs_a = process(&mut a).unwrap_err();
        let errs_b = process(&mut b).unwrap_err();
        assert_eq!(errs_a, errs_b);
    }
}
