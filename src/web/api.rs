use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};

use crate::ml::PredictionError;
use super::{AppState, ErrorResponse, HealthResponse, PredictionRequest, PredictionResponse};

fn error_response(status: StatusCode, error: &str, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message,
        }),
    )
        .into_response()
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            PredictionError::ModelNotLoaded { .. } => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, "model_not_loaded", message)
            }
            PredictionError::InvalidFeatureVector { .. } => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, "invalid_feature_vector", message)
            }
            PredictionError::Inference(_) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "inference_failed", message)
            }
        }
    }
}

// === Prediction ===

pub async fn predict_assignment(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected prediction request: {}", rejection.body_text());
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_feature_vector",
                rejection.body_text(),
            );
        }
    };

    match state.predictor.predict(&request.providers) {
        Ok(batch) => {
            debug!(
                "Predicted {} providers with model v{}",
                batch.predictions.len(),
                batch.model_version
            );
            Json(PredictionResponse {
                predictions: batch.predictions,
                model_version: batch.model_version,
            })
            .into_response()
        }
        Err(e) => {
            warn!("Prediction failed: {}", e);
            e.into_response()
        }
    }
}

// === Health Check ===

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let model = state.predictor.state();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.service_version.clone(),
        model_loaded: model.is_loaded(),
        model_version: model.version().map(str::to_string),
        confidence_threshold: state.predictor.confidence_threshold(),
    })
}
