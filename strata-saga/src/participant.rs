use crate::transaction::ConfigTransaction;
use async_trait::async_trait;
use std::sync::Arc;

/// A long-lived runtime component driven through the configuration saga.
///
/// Contract:
/// - `stage` prepares the new state without exposing it externally, and is
///   idempotent with respect to the transaction ID;
/// - `compensate` drops any pending state for the transaction, is
///   idempotent, and should not fail for transient reasons; its errors are
///   logged, not propagated;
/// - `commit` promotes the last successfully staged state to current, and
///   is only invoked after every participant staged successfully.
#[async_trait]
pub trait Participant: Send + Sync {
    fn name(&self) -> &str;

    async fn stage(&self, tx: &Arc<ConfigTransaction>) -> anyhow::Result<()>;

    async fn compensate(&self, tx: &Arc<ConfigTransaction>) -> anyhow::Result<()>;

    async fn commit(&self) -> anyhow::Result<()>;
}
