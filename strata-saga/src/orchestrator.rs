use crate::participant::Participant;
use crate::transaction::{ConfigTransaction, TransactionError, TxState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_COMPENSATE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SagaError {
    #[error("staging failed at participant {participant}: {reason}")]
    Staging {
        participant: String,
        reason: anyhow::Error,
    },

    /// A participant accepted stage but failed to commit. Participants that
    /// already committed are NOT rolled back: once a listener has accepted
    /// traffic on the new generation it cannot be unaccepted. The server is
    /// in a split state until an operator pushes a correcting transaction.
    #[error("commit failed at participant {participant} (split state): {reason}")]
    Commit {
        participant: String,
        reason: anyhow::Error,
    },

    #[error("saga cancelled while {phase}")]
    Cancelled { phase: &'static str },

    #[error(transparent)]
    Lifecycle(#[from] TransactionError),
}

/// Drives one transaction at a time through Stage across all participants,
/// then Commit, compensating on staging failure.
///
/// The orchestrator serialises: its inbound channel is the FIFO queue of
/// proposals, and `apply` runs to a terminal state before the next proposal
/// is taken.
pub struct SagaOrchestrator {
    participants: Vec<Arc<dyn Participant>>,
    stage_timeout: Duration,
    compensate_timeout: Duration,
    cancel: CancellationToken,
}

impl SagaOrchestrator {
    pub fn new(participants: Vec<Arc<dyn Participant>>, cancel: CancellationToken) -> Self {
        Self {
            participants,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            compensate_timeout: DEFAULT_COMPENSATE_TIMEOUT,
            cancel,
        }
    }

    pub fn with_timeouts(mut self, stage: Duration, compensate: Duration) -> Self {
        self.stage_timeout = stage;
        self.compensate_timeout = compensate;
        self
    }

    /// Consume validated transactions until the channel closes or the
    /// orchestrator is cancelled. `None` payloads (the "no config yet"
    /// primer every new subscriber receives) are skipped.
    pub async fn run(&self, mut rx: mpsc::Receiver<Option<Arc<ConfigTransaction>>>) {
        loop {
            let msg = tokio::select! {
                _ = self.cancel.cancelled() => break,
                msg = rx.recv() => msg,
            };
            let Some(msg) = msg else { break };
            let Some(tx) = msg else { continue };

            if tx.state() != TxState::Validated {
                warn!(tx = %tx.id(), state = %tx.state(), "Skipping transaction not in validated state");
                continue;
            }
            if let Err(e) = self.apply(&tx).await {
                error!(tx = %tx.id(), error = %e, "Transaction did not commit");
            }
        }
        info!("Saga orchestrator stopped");
    }

    /// Apply one proposed transaction: Stage everywhere, then Commit
    /// everywhere, compensating already-staged participants in reverse
    /// order when staging fails.
    pub async fn apply(&self, tx: &Arc<ConfigTransaction>) -> Result<(), SagaError> {
        tx.transition(TxState::Staging)?;

        let mut staged: Vec<Arc<dyn Participant>> = Vec::with_capacity(self.participants.len());
        for participant in &self.participants {
            match self.stage_one(participant.as_ref(), tx).await {
                Ok(()) => staged.push(Arc::clone(participant)),
                Err(e) => {
                    warn!(
                        tx = %tx.id(),
                        participant = participant.name(),
                        error = %e,
                        "Staging failed, compensating"
                    );
                    self.compensate_staged(tx, &staged).await?;
                    return Err(SagaError::Staging {
                        participant: participant.name().to_string(),
                        reason: e,
                    });
                }
            }
        }

        tx.transition(TxState::Staged)?;
        tx.transition(TxState::Committing)?;

        for participant in &self.participants {
            if let Err(e) = participant.commit().await {
                error!(
                    tx = %tx.id(),
                    participant = participant.name(),
                    error = %e,
                    "Commit failed; earlier participants are NOT rolled back (split state)"
                );
                tx.transition(TxState::Failed)?;
                return Err(SagaError::Commit {
                    participant: participant.name().to_string(),
                    reason: e,
                });
            }
        }

        tx.transition(TxState::Committed)?;
        info!(tx = %tx.id(), request_id = tx.request_id(), "Transaction committed");
        Ok(())
    }

    async fn stage_one(
        &self,
        participant: &dyn Participant,
        tx: &Arc<ConfigTransaction>,
    ) -> anyhow::Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                Err(anyhow::Error::from(SagaError::Cancelled { phase: "staging" }))
            }
            res = tokio::time::timeout(self.stage_timeout, participant.stage(tx)) => match res {
                Ok(inner) => inner,
                Err(_) => Err(anyhow::anyhow!(
                    "stage timed out after {:?}",
                    self.stage_timeout
                )),
            },
        }
    }

    /// Compensate in reverse staging order. Compensation errors are logged
    /// and swallowed: compensation must not fail for transient reasons, and
    /// a failed compensation cannot be rolled back anyway.
    async fn compensate_staged(
        &self,
        tx: &Arc<ConfigTransaction>,
        staged: &[Arc<dyn Participant>],
    ) -> Result<(), TransactionError> {
        tx.transition(TxState::Compensating)?;
        for participant in staged.iter().rev() {
            let res = tokio::time::timeout(self.compensate_timeout, participant.compensate(tx)).await;
            match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        tx = %tx.id(),
                        participant = participant.name(),
                        error = %e,
                        "Compensation reported an error"
                    );
                }
                Err(_) => {
                    warn!(
                        tx = %tx.id(),
                        participant = participant.name(),
                        timeout = ?self.compensate_timeout,
                        "Compensation timed out"
                    );
                }
            }
        }
        tx.transition(TxState::Compensated)?;
        Ok(())
    }
}
