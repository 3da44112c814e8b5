use crate::server::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use strata_core::Config;
use strata_saga::TransactionSource;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct UpdateConfigResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// On success: the validated config with defaults filled in.
    /// On failure: the submitted config echoed back.
    pub config: Config,
}

/// `POST /config`: validate a proposed config, wrap it in a transaction,
/// and broadcast it toward the saga. The commit itself is asynchronous;
/// a success here means "accepted and validated".
pub async fn update_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(config): Json<Config>,
) -> (StatusCode, Json<UpdateConfigResponse>) {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let submitted = config.clone();
    match state
        .service
        .update_config(config, TransactionSource::Api, request_id)
    {
        Ok(validated) => (
            StatusCode::OK,
            Json(UpdateConfigResponse {
                success: true,
                error: None,
                config: validated,
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Rejected config proposal");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(UpdateConfigResponse {
                    success: false,
                    error: Some(e.to_string()),
                    config: submitted,
                }),
            )
        }
    }
}

/// `GET /config`: deep clone of the current committed config.
pub async fn get_config(
    State(state): State<AppState>,
) -> Result<Json<Config>, (StatusCode, &'static str)> {
    state
        .service
        .current_config()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "no config committed yet"))
}
