use crate::error::ConfigError;
use regex::Regex;
use std::sync::OnceLock;

const MAX_ID_LEN: usize = 64;

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("id pattern"))
}

/// Check an identifier against the shared syntax used by listener, endpoint,
/// app, and middleware IDs: `[A-Za-z0-9][A-Za-z0-9_-]*`, length 1-64.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LEN && id_pattern().is_match(id)
}

/// Validate an identifier, naming the owning entity kind in the error.
pub fn validate_id(what: &'static str, id: &str) -> Result<(), ConfigError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(ConfigError::InvalidId {
            what,
            value: id.to_string(),
        })
    }
}
