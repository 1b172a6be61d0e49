// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! REST surface: mission CRUD, health, and the websocket upgrade.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::application::orchestrator::{MissionOrchestrator, OrchestratorError};
use crate::domain::mission::{CreateMissionRequest, Mission, MissionId, MissionStatusResponse};
use crate::presentation::ws::{self, EventHub};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<MissionOrchestrator>,
    pub hub: Arc<EventHub>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/missions", post(create_mission).get(list_missions))
        .route("/api/missions/{id}", get(mission_status))
        .route("/api/health", get(health))
        .route("/ws", get(websocket))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn create_mission(
    State(state): State<AppState>,
    Json(request): Json<CreateMissionRequest>,
) -> Result<(StatusCode, Json<Mission>), ApiError> {
    let mission = state.orchestrator.create_mission(request)?;
    Ok((StatusCode::CREATED, Json(mission)))
}

async fn list_missions(State(state): State<AppState>) -> Json<Vec<Mission>> {
    Json(state.orchestrator.list_missions())
}

async fn mission_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MissionStatusResponse>, ApiError> {
    let status = state.orchestrator.mission_status(&MissionId(id))?;
    Ok(Json(status))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn websocket(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    info!("websocket upgrade requested");
    let hub = state.hub.clone();
    upgrade.on_upgrade(move |socket| ws::handle_socket(socket, hub))
}

struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{Action, Decision};
    use crate::domain::decision::{DecisionContext, DecisionError, DecisionPort};
    use crate::domain::executor::{
        ActionBackend, ActionOutcome, BackendFactory, BackendKind, ExecutorError, PageCapture,
    };
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::memory_store::InMemoryMissionStore;
    use crate::infrastructure::rate_limit::RateLimiterRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    struct CompletingDecider;

    #[async_trait]
    impl DecisionPort for CompletingDecider {
        async fn decide(&self, _ctx: DecisionContext<'_>) -> Result<Decision, DecisionError> {
            Ok(Decision {
                reasoning: "done".to_string(),
                action: Action::Completed,
                selector: None,
                text_input: None,
                expected_next_state: None,
            })
        }
    }

    struct StubBackend;

    #[async_trait]
    impl ActionBackend for StubBackend {
        async fn execute(
            &mut self,
            _decision: &Decision,
            current_url: &str,
        ) -> Result<ActionOutcome, ExecutorError> {
            Ok(ActionOutcome::Navigated {
                html: "<html></html>".to_string(),
                url: current_url.to_string(),
                status: 200,
            })
        }

        async fn capture(&mut self, current_url: &str) -> Result<PageCapture, ExecutorError> {
            Ok(PageCapture {
                html: "<html></html>".to_string(),
                url: current_url.to_string(),
            })
        }
    }

    struct StubFactory;

    impl BackendFactory for StubFactory {
        fn create(&self, _kind: BackendKind) -> anyhow::Result<Box<dyn ActionBackend>> {
            Ok(Box::new(StubBackend))
        }
    }

    fn app() -> Router {
        let bus = EventBus::new(256);
        let orchestrator = Arc::new(MissionOrchestrator::new(
            Arc::new(InMemoryMissionStore::new()),
            Arc::new(CompletingDecider),
            Arc::new(StubFactory),
            Arc::new(RateLimiterRegistry::new()),
            bus.clone(),
        ));
        router(AppState {
            orchestrator,
            hub: EventHub::new(bus),
        })
    }

    fn mission_body() -> String {
        json!({
            "name": "smoke",
            "target_url": "https://example.com/",
            "num_agents": 1,
            "goal": "look around",
            "max_duration_seconds": 30,
            "rate_limit_per_second": 10.0
        })
        .to_string()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_mission_returns_201_with_the_record() {
        let response = app()
            .oneshot(
                Request::post("/api/missions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(mission_body()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert!(body["id"].as_str().unwrap().starts_with("mission-"));
        assert_eq!(body["status"], "created");
    }

    #[tokio::test]
    async fn invalid_mission_is_a_400() {
        let body = json!({
            "name": "",
            "target_url": "https://example.com/",
            "num_agents": 1,
            "goal": "g",
            "max_duration_seconds": 30,
            "rate_limit_per_second": 10.0
        })
        .to_string();

        let response = app()
            .oneshot(
                Request::post("/api/missions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "name is required");
    }

    #[tokio::test]
    async fn unknown_mission_is_a_404() {
        let response = app()
            .oneshot(
                Request::get("/api/missions/mission-00000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn created_missions_show_up_in_the_list_and_status() {
        let app = app();

        let created = app
            .clone()
            .oneshot(
                Request::post("/api/missions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(mission_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let id = body_json(created).await["id"].as_str().unwrap().to_string();

        let list = app
            .clone()
            .oneshot(Request::get("/api/missions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let missions = body_json(list).await;
        assert_eq!(missions.as_array().unwrap().len(), 1);

        let status = app
            .oneshot(
                Request::get(format!("/api/missions/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(status.status(), StatusCode::OK);
        let body = body_json(status).await;
        assert_eq!(body["mission"]["id"], id.as_str());
        assert_eq!(body["summary"]["total_agents"], 1);
    }
}
