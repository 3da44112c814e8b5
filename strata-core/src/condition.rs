use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// HTTP methods a route condition may pin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Trace => "TRACE",
        }
    }
}

/// Discriminant of a route condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Http,
    Grpc,
    Mcp,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::Http => "http",
            ConditionKind::Grpc => "grpc",
            ConditionKind::Mcp => "mcp",
        }
    }
}

/// A match predicate for incoming requests.
///
/// Two conditions collide if and only if they produce the same
/// `(kind, value)` pair; `value()` is the canonical serialisation used as
/// the conflict key across every endpoint bound to a listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteCondition {
    Http {
        path_prefix: String,
        #[serde(default)]
        method: Option<HttpMethod>,
    },
    Grpc {
        service: String,
        #[serde(default)]
        method: Option<String>,
    },
    Mcp {
        resource: String,
    },
}

impl RouteCondition {
    pub fn kind(&self) -> ConditionKind {
        match self {
            RouteCondition::Http { .. } => ConditionKind::Http,
            RouteCondition::Grpc { .. } => ConditionKind::Grpc,
            RouteCondition::Mcp { .. } => ConditionKind::Mcp,
        }
    }

    /// Canonical conflict key. Method wildcards serialise as `*` so
    /// `GET /x` and `/x` (any method) are distinct keys.
    pub fn value(&self) -> String {
        match self {
            RouteCondition::Http {
                path_prefix,
                method,
            } => {
                let m = method.map(|m| m.as_str()).unwrap_or("*");
                format!("{m} {path_prefix}")
            }
            RouteCondition::Grpc { service, method } => {
                let m = method.as_deref().unwrap_or("*");
                format!("{service}/{m}")
            }
            RouteCondition::Mcp { resource } => resource.clone(),
        }
    }

    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        match self {
            RouteCondition::Http { path_prefix, .. } => {
                if !path_prefix.starts_with('/') {
                    return Err(ConfigError::PathPrefixNotAbsolute {
                        field: field.to_string(),
                        value: path_prefix.clone(),
                    });
                }
                Ok(())
            }
            RouteCondition::Grpc { service, method } => {
                if !is_fully_qualified_service(service) {
                    return Err(ConfigError::invalid(
                        field,
                        format!("gRPC service {service:?} must be fully qualified (package.Service)"),
                    ));
                }
                if let Some(m) = method
                    && m.is_empty()
                {
                    return Err(ConfigError::invalid(field, "gRPC method must not be empty"));
                }
                Ok(())
            }
            RouteCondition::Mcp { resource } => {
                if resource.is_empty() {
                    return Err(ConfigError::invalid(field, "MCP resource must not be empty"));
                }
                Ok(())
            }
        }
    }
}

/// A fully-qualified gRPC service name has at least two dot-separated
/// segments, each a valid identifier.
fn is_fully_qualified_service(service: &str) -> bool {
    let segments: Vec<&str> = service.split('.').collect();
    segments.len() >= 2
        && segments.iter().all(|s| {
            !s.is_empty()
                && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
