use crate::app::App;
use crate::endpoint::Endpoint;
use crate::error::ConfigError;
use crate::listener::Listener;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root aggregate of a proposed server configuration.
///
/// Order of listeners, endpoints, and apps is preserved from the source
/// document; validation and adapter construction both traverse in that
/// order so error reporting and assembly are stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: Version,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub listeners: Vec<Listener>,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    #[serde(default)]
    pub apps: Vec<App>,
}

/// Config schema version. Only `v1alpha1` is accepted; anything else is
/// carried through deserialization and rejected by validation so the caller
/// sees the bad value echoed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Version {
    V1Alpha1,
    Unknown(String),
}

impl Version {
    pub fn as_str(&self) -> &str {
        match self {
            Version::V1Alpha1 => "v1alpha1",
            Version::Unknown(s) => s,
        }
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(if tag == "v1alpha1" {
            Version::V1Alpha1
        } else {
            Version::Unknown(tag)
        })
    }
}

/// Logging knobs carried in the aggregate. The sink itself is wired by the
/// binary; the core only validates enumerant membership via serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Load a proposed config from a TOML file, with `STRATA_`-prefixed
    /// environment overrides (`STRATA_LOGGING__LEVEL=debug`).
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading config file");
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STRATA_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Fill defaults for optional numeric fields. Runs before validation.
    pub fn apply_defaults(&mut self) {
        for listener in &mut self.listeners {
            listener.http.apply_defaults();
        }
    }

    /// Local version check; composite validation lives in [`crate::validate`].
    pub fn validate_version(&self) -> Result<(), ConfigError> {
        match &self.version {
            Version::V1Alpha1 => Ok(()),
            Version::Unknown(s) => Err(ConfigError::UnsupportedVersion(s.clone())),
        }
    }

    pub fn listener(&self, id: &str) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.id == id)
    }

    pub fn app(&self, id: &str) -> Option<&App> {
        self.apps.iter().find(|a| a.id == id)
    }

    /// Endpoints bound to the given listener, in declaration order.
    pub fn endpoints_for(&self, listener_id: &str) -> impl Iterator<Item = &Endpoint> {
        self.endpoints
            .iter()
            .filter(move |e| e.listener_id == listener_id)
    }
}
