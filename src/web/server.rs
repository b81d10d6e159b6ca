use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{api, AppState};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/predict/assignment", post(api::predict_assignment))
        .route("/health", get(api::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_prediction_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!("Prediction service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::persistence::tests::sample_artifact;
    use crate::ml::{ModelState, PredictionService};
    use crate::web::{HealthResponse, PredictionResponse, ErrorResponse};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn loaded_app() -> Router {
        let state = ModelState::Loaded(Arc::new(sample_artifact("2.0.1")));
        build_router(AppState::new(PredictionService::new(state, 0.6), "svc-1"))
    }

    fn absent_app() -> Router {
        let state = ModelState::Absent { reason: "Model artifact not found".to_string() };
        build_router(AppState::new(PredictionService::new(state, 0.6), "svc-1"))
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict/assignment")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_predict_acme() {
        let body = r#"{"providers":[{"provider":"ACME","distance_km":2.0,"traffic_level":1,"is_peak_hour":false,"provider_load":1}]}"#;
        let response = loaded_app().oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let parsed: PredictionResponse = read_json(response).await;
        assert_eq!(parsed.model_version, "2.0.1");
        assert_eq!(parsed.predictions.len(), 1);
        assert_eq!(parsed.predictions[0].provider, "ACME");
        assert!((0.0..=1.0).contains(&parsed.predictions[0].success_probability));
    }

    #[tokio::test]
    async fn test_out_of_range_is_unprocessable() {
        let body = r#"{"providers":[{"provider":"UBER","distance_km":2.0,"traffic_level":1,"is_peak_hour":false,"provider_load":1},{"provider":"UBER","distance_km":2.0,"traffic_level":1,"is_peak_hour":false,"provider_load":4}]}"#;
        let response = loaded_app().oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let parsed: ErrorResponse = read_json(response).await;
        assert_eq!(parsed.error, "invalid_feature_vector");
        assert!(parsed.message.contains("provider_load"));
    }

    #[tokio::test]
    async fn test_missing_field_is_unprocessable() {
        let body = r#"{"providers":[{"provider":"UBER","distance_km":2.0,"traffic_level":1,"is_peak_hour":false}]}"#;
        let response = loaded_app().oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_absent_model_returns_503() {
        let body = r#"{"providers":[{"provider":"UBER","distance_km":2.0,"traffic_level":1,"is_peak_hour":false,"provider_load":1}]}"#;
        let response = absent_app().oneshot(post_json(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let parsed: ErrorResponse = read_json(response).await;
        assert_eq!(parsed.error, "model_not_loaded");
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        let request = || Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = loaded_app().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = read_json(response).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, "svc-1");
        assert!(health.model_loaded);
        assert_eq!(health.model_version.as_deref(), Some("2.0.1"));

        let response = absent_app().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = read_json(response).await;
        assert_eq!(health.status, "ok");
        assert!(!health.model_loaded);
        assert!(health.model_version.is_none());
    }
}
