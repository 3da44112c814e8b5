use crate::server::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub cluster: &'static str,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_transaction: Option<String>,
}

/// `GET /health`: cluster FSM state plus the committed transaction ID.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        cluster: state.cluster.state().as_str(),
        running: state.cluster.is_running(),
        committed_transaction: state
            .service
            .current_transaction()
            .map(|tx| tx.id().to_string()),
    })
}

#[derive(Debug, Serialize)]
pub struct TransactionSummary {
    pub id: String,
    pub source: strata_saga::TransactionSource,
    pub request_id: String,
    pub state: strata_saga::TxState,
    pub transitions: usize,
}

/// `GET /transactions`: in-memory audit history, oldest first.
pub async fn transactions(State(state): State<AppState>) -> Json<Vec<TransactionSummary>> {
    let summaries = state
        .service
        .transactions()
        .iter()
        .map(|tx| TransactionSummary {
            id: tx.id().to_string(),
            source: tx.source(),
            request_id: tx.request_id().to_string(),
            state: tx.state(),
            transitions: tx.history().len(),
        })
        .collect();
    Json(summaries)
}
