use crate::app::AppConfig;
use crate::config::Config;
use crate::error::ConfigError;
use crate::middleware::MiddlewareConfig;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn var_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").expect("var pattern")
    })
}

/// Expand `${NAME}` / `${NAME:default}` references in a single string.
/// A missing variable with no default is a validation error; expansion
/// happens before field-level checks so the expanded value is what gets
/// validated.
pub fn interpolate_str(input: &str, field: &str) -> Result<String, ConfigError> {
    let re = var_pattern();
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let whole = caps.get(0).expect("match");
        out.push_str(&input[last..whole.start()]);
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => match caps.get(2) {
                Some(default) => out.push_str(default.as_str()),
                None => {
                    return Err(ConfigError::MissingEnvVar {
                        field: field.to_string(),
                        name: name.to_string(),
                    });
                }
            },
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Expand environment references across every interpolatable field of a
/// config: static-data string values (recursively), static-response bodies
/// and content types, and header middleware values. Errors are collected,
/// not short-circuited.
pub fn interpolate_config(config: &mut Config, errors: &mut Vec<ConfigError>) {
    for app in &mut config.apps {
        if let AppConfig::StaticResponse {
            body, content_type, ..
        } = &mut app.config
        {
            let field = format!("app {}", app.id);
            expand_in_place(body, &field, errors);
            if let Some(ct) = content_type {
                expand_in_place(ct, &field, errors);
            }
        }
    }

    for endpoint in &mut config.endpoints {
        for mw in &mut endpoint.middlewares {
            interpolate_middleware(mw.id.as_str(), &mut mw.config, errors);
        }
        for (i, route) in endpoint.routes.iter_mut().enumerate() {
            let field = format!("endpoint {}: route #{i}", endpoint.id);
            for value in route.static_data.values_mut() {
                interpolate_value(value, &field, errors);
            }
            for mw in &mut route.middlewares {
                interpolate_middleware(mw.id.as_str(), &mut mw.config, errors);
            }
        }
    }
}

fn interpolate_middleware(id: &str, config: &mut MiddlewareConfig, errors: &mut Vec<ConfigError>) {
    let field = format!("middleware {id}");
    match config {
        MiddlewareConfig::ConsoleLogger { tag } => {
            if let Some(tag) = tag {
                expand_in_place(tag, &field, errors);
            }
        }
        MiddlewareConfig::Headers { request, response } => {
            for value in request.values_mut().chain(response.values_mut()) {
                expand_in_place(value, &field, errors);
            }
        }
    }
}

fn interpolate_value(value: &mut Value, field: &str, errors: &mut Vec<ConfigError>) {
    match value {
        Value::String(s) => expand_in_place(s, field, errors),
        Value::Array(items) => {
            for item in items {
                interpolate_value(item, field, errors);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                interpolate_value(item, field, errors);
            }
        }
        _ => {}
    }
}

fn expand_in_place(target: &mut String, field: &str, errors: &mut Vec<ConfigError>) {
    match interpolate_str(target, field) {
        Ok(expanded) => *target = expanded,
        Err(e) => errors.push(e),
    }
}
