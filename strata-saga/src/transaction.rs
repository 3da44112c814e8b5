use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use strata_core::Config;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle states of a configuration transaction.
///
/// `Committed`, `Compensated`, and `Failed` are terminal and immutable;
/// re-staging a terminal transaction is a programming error surfaced as
/// [`TransactionError::InvalidTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Created,
    Validated,
    Staging,
    Staged,
    Committing,
    Committed,
    Compensating,
    Compensated,
    Failed,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Committed | TxState::Compensated | TxState::Failed)
    }

    /// Permitted transitions. Every state may fail; compensation is
    /// reachable from staging onward.
    fn can_transition(&self, to: TxState) -> bool {
        use TxState::*;
        matches!(
            (self, to),
            (Created, Validated)
                | (Created, Failed)
                | (Validated, Staging)
                | (Validated, Failed)
                | (Staging, Staged)
                | (Staging, Compensating)
                | (Staging, Failed)
                | (Staged, Committing)
                | (Staged, Compensating)
                | (Staged, Failed)
                | (Committing, Committed)
                | (Committing, Compensating)
                | (Committing, Failed)
                | (Compensating, Compensated)
                | (Compensating, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Created => "created",
            TxState::Validated => "validated",
            TxState::Staging => "staging",
            TxState::Staged => "staged",
            TxState::Committing => "committing",
            TxState::Committed => "committed",
            TxState::Compensating => "compensating",
            TxState::Compensated => "compensated",
            TxState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction {id}: invalid state transition {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: TxState,
        to: TxState,
    },
}

/// One audit entry per state transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    pub from: TxState,
    pub to: TxState,
    pub at: DateTime<Utc>,
}

/// Where a proposed configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSource {
    Api,
    File,
    Test,
}

/// The unit of configuration change: one proposed config, one UUID, one
/// single-use state machine with an audit trail.
///
/// The config is held by value; participants derive their own state from it
/// and reference the transaction by ID, never by interior pointer.
pub struct ConfigTransaction {
    id: Uuid,
    source: TransactionSource,
    request_id: String,
    created_at: DateTime<Utc>,
    config: Config,
    state: Mutex<StateInner>,
}

struct StateInner {
    current: TxState,
    history: Vec<TransitionRecord>,
}

impl ConfigTransaction {
    pub fn new(config: Config, source: TransactionSource, request_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            request_id: request_id.into(),
            created_at: Utc::now(),
            config,
            state: Mutex::new(StateInner {
                current: TxState::Created,
                history: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> TransactionSource {
        self.source
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> TxState {
        self.state.lock().expect("transaction state lock").current
    }

    /// Attempt a state transition, recording it with a timestamp on
    /// success. Terminal states accept nothing.
    pub fn transition(&self, to: TxState) -> Result<TxState, TransactionError> {
        let mut inner = self.state.lock().expect("transaction state lock");
        let from = inner.current;
        if !from.can_transition(to) {
            return Err(TransactionError::InvalidTransition {
                id: self.id,
                from,
                to,
            });
        }
        inner.current = to;
        inner.history.push(TransitionRecord {
            from,
            to,
            at: Utc::now(),
        });
        tracing::debug!(tx = %self.id, from = %from, to = %to, "Transaction transition");
        Ok(to)
    }

    /// Audit trail of every transition so far, oldest first.
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.state
            .lock()
            .expect("transaction state lock")
            .history
            .clone()
    }
}

impl std::fmt::Debug for ConfigTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigTransaction")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("request_id", &self.request_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::config::{LoggingConfig, Version};

    fn tx() -> ConfigTransaction {
        let config = Config {
            version: Version::V1Alpha1,
            logging: LoggingConfig::default(),
            listeners: vec![],
            endpoints: vec![],
            apps: vec![],
        };
        ConfigTransaction::new(config, TransactionSource::Test, "req-1")
    }

    #[test]
    fn happy_path_reaches_committed() {
        let t = tx();
        for to in [
            TxState::Validated,
            TxState::Staging,
            TxState::Staged,
            TxState::Committing,
            TxState::Committed,
        ] {
            t.transition(to).unwrap();
        }
        assert_eq!(t.state(), TxState::Committed);
        assert!(t.state().is_terminal());
        assert_eq!(t.history().len(), 5);
    }

    #[test]
    fn staging_failure_compensates() {
        let t = tx();
        t.transition(TxState::Validated).unwrap();
        t.transition(TxState::Staging).unwrap();
        t.transition(TxState::Compensating).unwrap();
        t.transition(TxState::Compensated).unwrap();
        assert!(t.state().is_terminal());
    }

    #[test]
    fn terminal_states_are_immutable() {
        let t = tx();
        t.transition(TxState::Validated).unwrap();
        t.transition(TxState::Failed).unwrap();
        let err = t.transition(TxState::Staging).unwrap_err();
        assert!(err.to_string().contains("failed -> staging"));
    }

    #[test]
    fn skipping_states_is_rejected() {
        let t = tx();
        assert!(t.transition(TxState::Committed).is_err());
        assert!(t.transition(TxState::Staged).is_err());
        // Still usable after a rejected transition.
        t.transition(TxState::Validated).unwrap();
    }

    #[test]
    fn history_records_timestamps_in_order() {
        let t = tx();
        t.transition(TxState::Validated).unwrap();
        t.transition(TxState::Staging).unwrap();
        let history = t.history();
        assert_eq!(history[0].from, TxState::Created);
        assert_eq!(history[1].to, TxState::Staging);
        assert!(history[0].at <= history[1].at);
    }
}
