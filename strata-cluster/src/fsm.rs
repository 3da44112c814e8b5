use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle of the listener cluster as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    New,
    Booting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::New => "new",
            ClusterState::Booting => "booting",
            ClusterState::Running => "running",
            ClusterState::Stopping => "stopping",
            ClusterState::Stopped => "stopped",
            ClusterState::Error => "error",
        }
    }

    fn can_transition(&self, to: ClusterState) -> bool {
        use ClusterState::*;
        matches!(
            (self, to),
            (New, Booting)
                | (Booting, Running)
                | (Booting, Error)
                | (Running, Booting)
                | (Error, Booting)
                | (New, Stopping)
                | (Booting, Stopping)
                | (Running, Stopping)
                | (Error, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ClusterStateError {
    #[error("invalid cluster state transition {from} -> {to}")]
    InvalidTransition {
        from: ClusterState,
        to: ClusterState,
    },
}

/// What the state channel carries: the FSM state plus the sequence number
/// of the last fully reconciled snapshot, so a committer can wait for *its*
/// snapshot rather than any earlier `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterStatus {
    pub state: ClusterState,
    pub applied_seq: u64,
}

/// Strict cluster FSM broadcast over a watch channel. Invalid transitions
/// return an error instead of being silently ignored.
pub struct ClusterFsm {
    tx: watch::Sender<ClusterStatus>,
}

impl ClusterFsm {
    pub fn new() -> (Self, watch::Receiver<ClusterStatus>) {
        let (tx, rx) = watch::channel(ClusterStatus {
            state: ClusterState::New,
            applied_seq: 0,
        });
        (Self { tx }, rx)
    }

    pub fn state(&self) -> ClusterState {
        self.tx.borrow().state
    }

    pub fn transition(&self, to: ClusterState) -> Result<(), ClusterStateError> {
        let from = self.state();
        if !from.can_transition(to) {
            return Err(ClusterStateError::InvalidTransition { from, to });
        }
        debug!(from = %from, to = %to, "Cluster state transition");
        self.tx.send_modify(|status| status.state = to);
        Ok(())
    }

    /// Record that the snapshot with this sequence number is fully
    /// reconciled.
    pub fn mark_applied(&self, seq: u64) {
        self.tx.send_modify(|status| status.applied_seq = seq);
    }

    pub fn subscribe(&self) -> watch::Receiver<ClusterStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_cycle_is_legal() {
        let (fsm, _rx) = ClusterFsm::new();
        fsm.transition(ClusterState::Booting).unwrap();
        fsm.transition(ClusterState::Running).unwrap();
        // A later snapshot re-enters Booting.
        fsm.transition(ClusterState::Booting).unwrap();
        fsm.transition(ClusterState::Running).unwrap();
        fsm.transition(ClusterState::Stopping).unwrap();
        fsm.transition(ClusterState::Stopped).unwrap();
    }

    #[test]
    fn invalid_transitions_error_instead_of_ignoring() {
        let (fsm, _rx) = ClusterFsm::new();
        let err = fsm.transition(ClusterState::Running).unwrap_err();
        assert!(err.to_string().contains("new -> running"));
        // State unchanged after the rejected transition.
        assert_eq!(fsm.state(), ClusterState::New);
    }

    #[test]
    fn stopped_is_terminal() {
        let (fsm, _rx) = ClusterFsm::new();
        fsm.transition(ClusterState::Stopping).unwrap();
        fsm.transition(ClusterState::Stopped).unwrap();
        assert!(fsm.transition(ClusterState::Booting).is_err());
    }

    #[tokio::test]
    async fn watchers_observe_transitions_and_applied_seq() {
        let (fsm, mut rx) = ClusterFsm::new();
        fsm.transition(ClusterState::Booting).unwrap();
        fsm.mark_applied(7);
        let status = rx
            .wait_for(|s| s.state == ClusterState::Booting && s.applied_seq >= 7)
            .await
            .unwrap();
        assert_eq!(status.applied_seq, 7);
    }
}
