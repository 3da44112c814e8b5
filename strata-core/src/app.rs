use crate::error::ConfigError;
use crate::id::validate_id;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A handler definition. The core never introspects an app beyond its kind;
/// a kind-specific factory turns the config into a runtime handler exposing
/// only `handle_http`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub id: String,
    pub config: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppConfig {
    /// Reflects the request (method, path, headers, per-request data).
    Echo,
    /// Fixed response with a configurable status and body.
    StaticResponse {
        #[serde(default = "default_status")]
        status: u16,
        #[serde(default)]
        body: String,
        #[serde(default)]
        content_type: Option<String>,
    },
}

fn default_status() -> u16 {
    200
}

impl AppConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            AppConfig::Echo => "echo",
            AppConfig::StaticResponse { .. } => "static_response",
        }
    }

    /// Stable within-process fingerprint; handler instances whose
    /// `(kind, id, fingerprint)` are unchanged across generations are reused.
    pub fn fingerprint(&self) -> u64 {
        let json = serde_json::to_string(self).expect("app config serialises");
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        hasher.finish()
    }
}

impl App {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_id("app", &self.id)?;
        match &self.config {
            AppConfig::Echo => Ok(()),
            AppConfig::StaticResponse { status, .. } => {
                if !(100..=599).contains(status) {
                    return Err(ConfigError::invalid(
                        format!("app {}", self.id),
                        format!("status {status} is outside 100-599"),
                    ));
                }
                Ok(())
            }
        }
    }
}
