/// 관리 IPC 라우터 통합 테스트
/// 실제 포트 없이 tower oneshot 으로 라우터를 직접 호출합니다.
/// 모든 테스트가 같은 프로세스에서 돌므로 인증은 일괄 비활성화.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use kkultong_core::config::HoneypotConfig;
use kkultong_core::ipc::IpcServer;
use kkultong_core::registry::SessionRegistry;
use std::sync::Arc;
use tower::ServiceExt;

fn test_server(log_dir: &std::path::Path) -> (IpcServer, Arc<SessionRegistry>) {
    std::env::set_var("KKULTONG_AUTH_DISABLED", "1");
    let config = Arc::new(HoneypotConfig::default());
    let registry = Arc::new(SessionRegistry::new(log_dir, &config.hostname));
    (IpcServer::new(registry.clone(), config), registry)
}

async fn get(server: &IpcServer, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = server
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

async fn dummy_abort_handle() -> tokio::task::AbortHandle {
    tokio::spawn(std::future::pending::<()>()).abort_handle()
}

#[tokio::test]
async fn test_status_document() {
    let tmp = tempfile::tempdir().unwrap();
    let (server, _registry) = test_server(tmp.path());

    let (status, v) = get(&server, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["hostname"], "server01");
    assert_eq!(v["active_sessions"], 0);
    assert_eq!(v["total_sessions"], 0);
    assert!(v["uptime_secs"].as_i64().unwrap() >= 0);
    assert!(v.get("memory_bytes").is_some());
}

#[tokio::test]
async fn test_sessions_listing() {
    let tmp = tempfile::tempdir().unwrap();
    let (server, registry) = test_server(tmp.path());

    let (status, v) = get(&server, "/api/sessions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["sessions"].as_array().unwrap().len(), 0);

    registry
        .register("s-1", "203.0.113.9:53122".into(), dummy_abort_handle().await)
        .await;
    registry.set_username("s-1", "admin").await;
    registry.record_command("s-1", "uname -a").await;

    let (status, v) = get(&server, "/api/sessions").await;
    assert_eq!(status, StatusCode::OK);
    let sessions = v["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], "s-1");
    assert_eq!(sessions[0]["peer_addr"], "203.0.113.9:53122");
    assert_eq!(sessions[0]["username"], "admin");
    assert_eq!(sessions[0]["commands_run"], 1);
}

#[tokio::test]
async fn test_session_detail_and_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let (server, registry) = test_server(tmp.path());

    registry
        .register("known", "198.51.100.2:40001".into(), dummy_abort_handle().await)
        .await;

    let (status, v) = get(&server, "/api/sessions/known").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["id"], "known");

    let (status, v) = get(&server, "/api/sessions/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["success"], false);
    assert_eq!(v["error_code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_pyenv_status_endpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let (server, _registry) = test_server(tmp.path());

    // Python이 있든 없든 진단 문서는 항상 돌아와야 함
    let (status, v) = get(&server, "/api/pyenv/status").await;
    assert_eq!(status, StatusCode::OK);
    assert!(v.get("available").is_some());
    assert!(v.get("env_dir").is_some());
}
