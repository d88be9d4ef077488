//! API route handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::bulletin::{format_health_report, Notifier};
use crate::meeting::{PendingRace, PredictionCard, ResultsCard, SharedMeeting};
use crate::scheduler::{publish_predictions, publish_results};
use crate::types::{BulletinResponse, ErrorResponse, HealthReport, HealthResponse};

/// Application state shared across handlers.
pub struct AppState {
    pub meeting: SharedMeeting,
    pub notifier: Arc<dyn Notifier>,
}

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.status.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Model diagnostics.
pub async fn model_health(
    State(state): State<Arc<AppState>>,
) -> Json<BulletinResponse<HealthReport>> {
    let report = state.meeting.lock().await.health_report();
    let message = format_health_report(&report);
    Json(BulletinResponse {
        data: report,
        message,
    })
}

/// Run today's prediction card now.
pub async fn predict(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BulletinResponse<PredictionCard>>, ApiError> {
    let (card, message) =
        publish_predictions(&state.meeting, state.notifier.as_ref(), None).await?;
    Ok(Json(BulletinResponse {
        data: card,
        message,
    }))
}

/// Settle all pending races now.
pub async fn results(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BulletinResponse<ResultsCard>>, ApiError> {
    let (card, message) = publish_results(&state.meeting, state.notifier.as_ref()).await?;
    Ok(Json(BulletinResponse {
        data: card,
        message,
    }))
}

/// Pending races and their scratch state.
pub async fn races(State(state): State<Arc<AppState>>) -> Json<Vec<PendingRace>> {
    Json(state.meeting.lock().await.pending_summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulletin::LogNotifier;
    use crate::config::{AppConfig, ModelConfig};
    use crate::meeting::Meeting;

    fn state() -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.simulation.seed = Some(99);
        config.simulation.tracks = vec!["York".to_string()];
        config.simulation.scratch_probability = 0.0;
        config.model = ModelConfig {
            n_estimators: 5,
            max_depth: 3,
            ..Default::default()
        };

        Arc::new(AppState {
            meeting: Meeting::new(&config).unwrap().shared(),
            notifier: Arc::new(LogNotifier),
        })
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_predict_then_results_flow() {
        let state = state();

        let Json(pending) = races(State(state.clone())).await;
        assert!(pending.is_empty());

        let today = state.meeting.lock().await.today();
        let Json(card) = predict(State(state.clone())).await.unwrap();
        assert_eq!(card.data.lines.len(), 15);
        assert!(card.data.date >= today);
        assert!(card.message.contains("*YORK*"));

        let Json(pending) = races(State(state.clone())).await;
        assert_eq!(pending.len(), 15);
        assert!(pending.iter().all(|p| p.top_pick.is_some()));

        let Json(settled) = results(State(state.clone())).await.unwrap();
        assert_eq!(settled.data.results.len(), 15);
        assert!(settled.message.contains("RACE RESULTS UPDATE"));

        let Json(report) = model_health(State(state.clone())).await;
        assert_eq!(report.data.races_settled, 15);
        assert!(report.message.contains("AI HEALTH REPORT"));

        let Json(pending) = races(State(state)).await;
        assert!(pending.is_empty());
    }

    #[test]
    fn test_api_error_from_anyhow() {
        let err: ApiError = anyhow::anyhow!("pool too small").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "pool too small");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
