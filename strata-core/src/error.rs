use thiserror::Error;

/// A single configuration defect found during validation.
///
/// Validation never short-circuits: every defect in a proposed config is
/// collected into a [`ValidationErrors`] so the caller sees all of them at
/// once, in structural traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{what} id {value:?} is invalid: must match [A-Za-z0-9][A-Za-z0-9_-]* with length 1-64")]
    InvalidId { what: &'static str, value: String },

    #[error("unsupported config version {0:?} (expected \"v1alpha1\")")]
    UnsupportedVersion(String),

    #[error("listener {id}: invalid bind address {address:?}")]
    InvalidAddress { id: String, address: String },

    #[error("listener {id}: type \"grpc\" is reserved and not yet served")]
    ReservedListenerKind { id: String },

    #[error("duplicate listener id {0:?}")]
    DuplicateListenerId(String),

    #[error("listeners {first:?} and {second:?} share bind address {address:?}")]
    DuplicateListenerAddress {
        address: String,
        first: String,
        second: String,
    },

    #[error("duplicate endpoint id {0:?}")]
    DuplicateEndpointId(String),

    #[error("duplicate app id {0:?}")]
    DuplicateAppId(String),

    #[error("endpoint {endpoint}: references unknown listener {listener_id:?}")]
    UnknownListener {
        endpoint: String,
        listener_id: String,
    },

    #[error("endpoint {endpoint}: route #{index} references unknown app {app_id:?}")]
    UnknownApp {
        endpoint: String,
        index: usize,
        app_id: String,
    },

    #[error("endpoint {endpoint}: duplicate route condition {condition:?}")]
    DuplicateRouteCondition { endpoint: String, condition: String },

    #[error(
        "listener {listener}: endpoints {first:?} and {second:?} both route condition {condition:?}"
    )]
    RouteConflict {
        listener: String,
        condition: String,
        first: String,
        second: String,
    },

    #[error("{scope}: duplicate middleware id {id:?}")]
    DuplicateMiddlewareId { scope: String, id: String },

    #[error("{field}: path prefix {value:?} must start with '/'")]
    PathPrefixNotAbsolute { field: String, value: String },

    #[error("{field}: missing environment variable {name:?} and no default given")]
    MissingEnvVar { field: String, name: String },

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    /// Shorthand for the catch-all variant.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The accumulated result of validating a proposed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ConfigError>);

impl ValidationErrors {
    pub fn from_vec(errors: Vec<ConfigError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self(errors))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.0.iter()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "config validation failed ({} error(s)): ", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
