use figment::Figment;
use figment::providers::{Format, Toml};
use strata_core::config::LogLevel;
use strata_core::{Config, ListenerKind, MiddlewareConfig, RouteCondition, Version, validate};

const TOML_DOC: &str = r#"
version = "v1alpha1"

[logging]
level = "debug"
format = "json"

[[listeners]]
id = "http-main"
address = "127.0.0.1:18080"

[listeners.http]
read_timeout_ms = 5000

[[endpoints]]
id = "api"
listener_id = "http-main"

[[endpoints.middlewares]]
id = "00-log"

[endpoints.middlewares.config]
type = "console_logger"

[[endpoints.routes]]
app_id = "hello"

[endpoints.routes.condition]
type = "http"
path_prefix = "/hello"
method = "GET"

[endpoints.routes.static_data]
region = "eu-1"

[[apps]]
id = "hello"

[apps.config]
type = "static_response"
body = "hello"
"#;

#[test]
fn toml_document_maps_onto_the_model() {
    let config: Config = Figment::new()
        .merge(Toml::string(TOML_DOC))
        .extract()
        .unwrap();

    assert_eq!(config.version, Version::V1Alpha1);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.listeners.len(), 1);
    assert_eq!(config.listeners[0].kind, ListenerKind::Http);
    assert_eq!(config.listeners[0].http.read_timeout_ms, 5000);
    assert_eq!(config.endpoints[0].middlewares[0].id, "00-log");
    assert!(matches!(
        config.endpoints[0].middlewares[0].config,
        MiddlewareConfig::ConsoleLogger { .. }
    ));
    let route = &config.endpoints[0].routes[0];
    assert_eq!(route.condition.value(), "GET /hello");
    assert_eq!(route.static_data["region"], serde_json::json!("eu-1"));
}

#[test]
fn toml_document_validates_with_defaults() {
    let mut config: Config = Figment::new()
        .merge(Toml::string(TOML_DOC))
        .extract()
        .unwrap();
    validate::process(&mut config).unwrap();
    // Explicit value kept, the rest defaulted.
    assert_eq!(config.listeners[0].http.read_timeout_ms, 5000);
    assert_eq!(config.listeners[0].http.write_timeout_ms, 60_000);
    assert_eq!(config.listeners[0].http.idle_timeout_ms, 60_000);
    assert_eq!(config.listeners[0].http.drain_timeout_ms, 30_000);
}

#[test]
fn unknown_version_is_carried_to_validation() {
    let doc = TOML_DOC.replace("v1alpha1", "v2beta9");
    let mut config: Config = Figment::new().merge(Toml::string(&doc)).extract().unwrap();
    assert_eq!(config.version, Version::Unknown("v2beta9".into()));
    let errs = validate::process(&mut config).unwrap_err();
    assert!(errs.to_string().contains("v2beta9"));
}

#[test]
fn json_serialization_roundtrip_is_semantically_equal() {
    let config: Config = Figment::new()
        .merge(Toml::string(TOML_DOC))
        .extract()
        .unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let back: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);
}

#[test]
fn unknown_middleware_kind_fails_at_the_wire() {
    let doc = TOML_DOC.replace("console_logger", "rate_limiter");
    let result: Result<Config, _> = Figment::new().merge(Toml::string(&doc)).extract();
    assert!(result.is_err());
}

#[test]
fn grpc_conditions_parse_but_are_separate_kinds() {
    let condition: RouteCondition = serde_json::from_str(
        r#"{"type":"grpc","service":"acme.v1.Echo","method":"Ping"}"#,
    )
    .unwrap();
    let http: RouteCondition =
        serde_json::from_str(r#"{"type":"http","path_prefix":"/acme.v1.Echo/Ping"}"#).unwrap();
    assert_ne!(condition.kind(), http.kind());
}
