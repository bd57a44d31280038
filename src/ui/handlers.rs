//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::audio::device::{list_devices, AudioDeviceInfo};
use crate::error::SessionError;
use crate::feedback::Feedback;
use crate::session::SessionStatus;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn session_error<T>(err: SessionError) -> Reply<T> {
    let status = match err {
        SessionError::AlreadyRunning | SessionError::NotRunning => StatusCode::CONFLICT,
        SessionError::SpawnFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(err.to_string())))
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub jd: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub message: String,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Start an interview about the posted job description
pub async fn start_interview(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRequest>>,
) -> Reply<StartResponse> {
    let jd = body
        .and_then(|Json(req)| req.jd)
        .filter(|jd| !jd.trim().is_empty());
    let Some(jd) = jd else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Job description is required")),
        );
    };

    match state.controller.start(&jd) {
        Ok(ticket) => (
            StatusCode::OK,
            Json(ApiResponse::ok(StartResponse {
                message: "Interview started".to_string(),
                session_id: ticket.session_id,
                started_at: ticket.started_at,
            })),
        ),
        Err(e) => session_error(e),
    }
}

/// Stop the running interview
pub async fn stop_interview(State(state): State<Arc<AppState>>) -> Reply<String> {
    match state.controller.stop() {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok("Interview stopped".to_string())),
        ),
        Err(e) => session_error(e),
    }
}

#[derive(Debug, Serialize)]
pub struct InterviewStatus {
    #[serde(flatten)]
    pub session: SessionStatus,
    pub last_feedback: Option<Feedback>,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<InterviewStatus>> {
    let status = InterviewStatus {
        session: state.controller.status(),
        last_feedback: state.evaluator.as_ref().and_then(|e| e.last_feedback()),
    };
    Json(ApiResponse::ok(status))
}

/// Get available audio devices
pub async fn get_devices() -> Json<ApiResponse<Vec<AudioDeviceInfo>>> {
    Json(ApiResponse::ok(list_devices()))
}
