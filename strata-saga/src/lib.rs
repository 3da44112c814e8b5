pub mod orchestrator;
pub mod participant;
pub mod service;
pub mod transaction;

pub use orchestrator::{SagaError, SagaOrchestrator};
pub use participant::Participant;
pub use service::{ConfigService, ConfigServiceError};
pub use transaction::{
    ConfigTransaction, TransactionError, TransactionSource, TransitionRecord, TxState,
};
