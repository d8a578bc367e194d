//! 관리용 IPC HTTP 서버
//!
//! 루프백에서만 듣는 상태 조회 API 입니다. 미끼 쪽 기능은 전혀 없고,
//! 운영자가 활성 세션과 데몬 상태, Python 도구 환경 상태를 확인하는
//! 용도입니다. 모든 요청은 토큰 인증([`auth`])을 거칩니다.

pub mod auth;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use sysinfo::System;
use tower_http::trace::TraceLayer;

use crate::bootstrap;
use crate::config::HoneypotConfig;
use crate::registry::SessionRegistry;

/// IPC 요청 처리 중 발생하는 에러 — HTTP 상태 코드로 매핑됩니다
#[derive(thiserror::Error, Debug)]
pub enum IpcError {
    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl IpcError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}

impl IntoResponse for IpcError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = Json(self.to_json());
        (status, body).into_response()
    }
}

/// IPC Server State
#[derive(Clone)]
pub struct IpcServer {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<HoneypotConfig>,
    pub started_at: DateTime<Utc>,
    pub listen_addr: String,
}

impl IpcServer {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<HoneypotConfig>) -> Self {
        let listen_addr = config.ipc_listen.clone();
        Self {
            registry,
            config,
            started_at: Utc::now(),
            listen_addr,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(get_status))
            .route("/api/sessions", get(list_sessions))
            .route("/api/sessions/:id", get(get_session))
            .route("/api/pyenv/status", get(pyenv_status))
            .layer(middleware::from_fn(auth::auth_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn start(self) -> Result<()> {
        let addr = self.listen_addr.clone();
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("IPC listening on http://{}", addr);

        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// GET /api/status — 데몬 상태 한 장
async fn get_status(State(state): State<IpcServer>) -> impl IntoResponse {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();
    Json(serde_json::json!({
        "hostname": state.config.hostname,
        "listen": state.config.listen_addr(),
        "active_sessions": state.registry.active_count().await,
        "total_sessions": state.registry.total_served(),
        "uptime_secs": uptime_secs,
        "memory_bytes": process_memory_bytes(),
    }))
}

/// GET /api/sessions — 활성 세션 목록
async fn list_sessions(State(state): State<IpcServer>) -> impl IntoResponse {
    let sessions = state.registry.snapshot().await;
    Json(serde_json::json!({ "sessions": sessions }))
}

/// GET /api/sessions/:id — 세션 하나
async fn get_session(
    State(state): State<IpcServer>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, IpcError> {
    match state.registry.get(&id).await {
        Some(entry) => Ok(Json(serde_json::json!(entry))),
        None => Err(IpcError::SessionNotFound(id)),
    }
}

/// GET /api/pyenv/status — Python 도구 환경 진단
async fn pyenv_status() -> impl IntoResponse {
    Json(bootstrap::status().await)
}

/// 데몬 자신의 메모리 사용량 (bytes)
fn process_memory_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new_all();
    sys.refresh_all();
    sys.process(pid).map(|p| p.memory())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let e = IpcError::SessionNotFound("abc".into());
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(e.error_code(), "SESSION_NOT_FOUND");
        let json = e.to_json();
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("abc"));
    }

    #[test]
    fn test_process_memory() {
        // 자기 자신은 항상 보여야 함
        let mem = process_memory_bytes();
        assert!(mem.unwrap_or(0) > 0);
    }
}
