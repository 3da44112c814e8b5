use crate::participant::Participant;
use crate::transaction::{ConfigTransaction, TransactionError, TransactionSource, TxState};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use strata_core::{Config, ValidationErrors, validate};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Lifecycle(#[from] TransactionError),
}

/// Accepts proposed configurations, validates them, wraps them in
/// transactions, and fans them out to subscribers.
///
/// The service owns the current *committed* transaction: it participates in
/// the saga itself, and its `commit` is what makes `GetConfig` observe the
/// new config. The broadcast never blocks the producer: a subscriber whose
/// buffer is full loses that one message with a warning.
pub struct ConfigService {
    current: ArcSwapOption<ConfigTransaction>,
    staged: Mutex<Option<Arc<ConfigTransaction>>>,
    subscribers: DashMap<String, mpsc::Sender<Option<Arc<ConfigTransaction>>>>,
    /// All transactions seen since startup, for introspection only; nothing
    /// is persisted.
    history: Mutex<Vec<Arc<ConfigTransaction>>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            staged: Mutex::new(None),
            subscribers: DashMap::new(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Run a proposed config through defaults, interpolation, and
    /// validation; wrap it in a `Validated` transaction; broadcast it to
    /// subscribers. Returns the validated config with defaults filled in
    /// (the saga commits asynchronously).
    pub fn update_config(
        &self,
        mut config: Config,
        source: TransactionSource,
        request_id: impl Into<String>,
    ) -> Result<Config, ConfigServiceError> {
        validate::process(&mut config)?;

        let tx = Arc::new(ConfigTransaction::new(config.clone(), source, request_id));
        tx.transition(TxState::Validated)?;
        info!(tx = %tx.id(), ?source, "Accepted config proposal");

        self.history
            .lock()
            .expect("transaction history lock")
            .push(Arc::clone(&tx));
        self.broadcast(Some(tx));
        Ok(config)
    }

    /// Register a subscriber with its own buffered channel. The subscriber
    /// immediately receives the current committed transaction, or `None`
    /// when no config has been committed yet.
    pub fn subscribe(
        &self,
        id: impl Into<String>,
        buffer: usize,
    ) -> mpsc::Receiver<Option<Arc<ConfigTransaction>>> {
        let id = id.into();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        // Primer: the current state, possibly "no config yet".
        let _ = tx.try_send(self.current.load_full());
        self.subscribers.insert(id, tx);
        rx
    }

    pub fn unsubscribe(&self, id: &str) {
        self.subscribers.remove(id);
    }

    fn broadcast(&self, msg: Option<Arc<ConfigTransaction>>) {
        self.subscribers.retain(|subscriber, sender| {
            match sender.try_send(msg.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = %subscriber, "Subscriber buffer full, dropping broadcast");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(subscriber = %subscriber, "Subscriber gone, removing");
                    false
                }
            }
        });
    }

    /// Deep clone of the current committed config, if any.
    pub fn current_config(&self) -> Option<Config> {
        self.current.load_full().map(|tx| tx.config().clone())
    }

    pub fn current_transaction(&self) -> Option<Arc<ConfigTransaction>> {
        self.current.load_full()
    }

    /// Every transaction seen since startup, oldest first.
    pub fn transactions(&self) -> Vec<Arc<ConfigTransaction>> {
        self.history
            .lock()
            .expect("transaction history lock")
            .clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Participant for ConfigService {
    fn name(&self) -> &str {
        "config-service"
    }

    async fn stage(&self, tx: &Arc<ConfigTransaction>) -> anyhow::Result<()> {
        let mut staged = self.staged.lock().expect("staged transaction lock");
        if let Some(existing) = staged.as_ref()
            && existing.id() == tx.id()
        {
            return Ok(());
        }
        *staged = Some(Arc::clone(tx));
        Ok(())
    }

    async fn compensate(&self, tx: &Arc<ConfigTransaction>) -> anyhow::Result<()> {
        let mut staged = self.staged.lock().expect("staged transaction lock");
        if staged.as_ref().is_some_and(|s| s.id() == tx.id()) {
            *staged = None;
        }
        Ok(())
    }

    async fn commit(&self) -> anyhow::Result<()> {
        let staged = self
            .staged
            .lock()
            .expect("staged transaction lock")
            .take()
            .ok_or_else(|| anyhow::anyhow!("no staged transaction to commit"))?;
        self.current.store(Some(staged));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::config::{LoggingConfig, Version};

    fn empty_config() -> Config {
        Config {
            version: Version::V1Alpha1,
            logging: LoggingConfig::default(),
            listeners: vec![],
            endpoints: vec![],
            apps: vec![],
        }
    }

    fn bad_config() -> Config {
        let mut c = empty_config();
        c.version = Version::Unknown("v9".into());
        c
    }

    #[tokio::test]
    async fn update_broadcasts_validated_transaction() {
        let service = ConfigService::new();
        let mut rx = service.subscribe("test", 4);
        // Primer first: no config yet.
        assert!(rx.recv().await.unwrap().is_none());

        service
            .update_config(empty_config(), TransactionSource::Test, "r1")
            .unwrap();
        let tx = rx.recv().await.unwrap().expect("broadcast carries the tx");
        assert_eq!(tx.state(), TxState::Validated);
        assert_eq!(tx.request_id(), "r1");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_broadcast() {
        let service = ConfigService::new();
        let mut rx = service.subscribe("test", 4);
        let _ = rx.recv().await;

        let err = service
            .update_config(bad_config(), TransactionSource::Test, "r1")
            .unwrap_err();
        assert!(matches!(err, ConfigServiceError::Validation(_)));
        assert!(rx.try_recv().is_err());
        assert!(service.current_config().is_none());
    }

    #[tokio::test]
    async fn full_subscriber_drops_message_without_blocking() {
        let service = ConfigService::new();
        let _rx = service.subscribe("slow", 1);
        // Buffer of 1 already holds the primer; both updates drop for the
        // slow subscriber but still succeed.
        service
            .update_config(empty_config(), TransactionSource::Test, "r1")
            .unwrap();
        service
            .update_config(empty_config(), TransactionSource::Test, "r2")
            .unwrap();
        assert_eq!(service.subscriber_count(), 1);
        assert_eq!(service.transactions().len(), 2);
    }

    #[tokio::test]
    async fn closed_subscriber_is_removed() {
        let service = ConfigService::new();
        let rx = service.subscribe("gone", 1);
        drop(rx);
        service
            .update_config(empty_config(), TransactionSource::Test, "r1")
            .unwrap();
        assert_eq!(service.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn commit_publishes_staged_transaction() {
        let service = ConfigService::new();
        let tx = Arc::new(ConfigTransaction::new(
            empty_config(),
            TransactionSource::Test,
            "r1",
        ));
        service.stage(&tx).await.unwrap();
        assert!(service.current_config().is_none());
        service.commit().await.unwrap();
        assert_eq!(
            service.current_transaction().unwrap().id(),
            tx.id()
        );
    }

    #[tokio::test]
    async fn compensate_clears_only_the_matching_stage() {
        let service = ConfigService::new();
        let tx = Arc::new(ConfigTransaction::new(
            empty_config(),
            TransactionSource::Test,
            "r1",
        ));
        let other = Arc::new(ConfigTransaction::new(
            empty_config(),
            TransactionSource::Test,
            "r2",
        ));
        service.stage(&tx).await.unwrap();
        service.compensate(&other).await.unwrap();
        // tx is still staged; compensating it clears the slot.
        service.compensate(&tx).await.unwrap();
        assert!(service.commit().await.is_err());
    }

    #[tokio::test]
    async fn stage_is_idempotent_per_transaction() {
        let service = ConfigService::new();
        let tx = Arc::new(ConfigTransaction::new(
            empty_config(),
            TransactionSource::Test,
            "r1",
        ));
        service.stage(&tx).await.unwrap();
        service.stage(&tx).await.unwrap();
        service.commit().await.unwrap();
        assert_eq!(service.current_transaction().unwrap().id(), tx.id());
    }
}
