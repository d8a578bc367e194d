//! IPC 토큰 기반 인증 미들웨어
//!
//! 데몬 시작 시 랜덤 토큰을 생성하여 파일에 저장하고 메모리에 캐시합니다.
//! CLI 등 로컬 클라이언트는 이 파일을 읽어서 `X-Kkultong-Token` 헤더에
//! 포함시킵니다. 토큰이 일치하지 않는 요청은 401 Unauthorized 로
//! 거부됩니다. 미끼 포트는 열어 두는 게 일이지만, 관리 API까지 열어
//! 두면 그게 진짜 침해 사고가 됩니다.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// 데몬이 생성한 토큰을 메모리에 캐시 (요청마다 파일 I/O 하지 않음)
static CACHED_TOKEN: std::sync::RwLock<Option<String>> = std::sync::RwLock::new(None);

/// 토큰 파일의 기본 경로
fn token_file_path() -> String {
    std::env::var("KKULTONG_TOKEN_PATH").unwrap_or_else(|_| {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .map(|appdata| format!("{}\\kkultong\\.ipc_token", appdata))
                .unwrap_or_else(|_| "config/.ipc_token".to_string())
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("HOME")
                .map(|home| format!("{}/.config/kkultong/.ipc_token", home))
                .unwrap_or_else(|_| "config/.ipc_token".to_string())
        }
    })
}

/// 데몬 시작 시 호출: 랜덤 토큰을 생성하고 파일에 저장 + 메모리 캐시
pub fn generate_and_save_token() -> anyhow::Result<Arc<String>> {
    let token = uuid::Uuid::new_v4().to_string();
    let path = token_file_path();

    if let Some(parent) = std::path::Path::new(&path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&path, &token)?;

    // 토큰 파일은 소유자만 읽을 수 있어야 함 (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    {
        let mut cached = CACHED_TOKEN.write().unwrap_or_else(|e| e.into_inner());
        *cached = Some(token.clone());
    }

    tracing::info!("IPC auth token saved to {} (token: {}…)", path, &token[..8]);
    Ok(Arc::new(token))
}

/// 토큰 파일에서 읽기 (클라이언트 측에서 사용)
pub fn read_token_from_file() -> Option<String> {
    let path = token_file_path();
    std::fs::read_to_string(&path)
        .ok()
        .map(|s| s.trim().to_string())
}

/// 인증 실패 로그 스팸을 억제하기 위한 rate-limiter
static AUTH_FAIL_LAST_LOG: std::sync::Mutex<Option<std::time::Instant>> =
    std::sync::Mutex::new(None);

/// axum 미들웨어: `X-Kkultong-Token` 헤더 검증
///
/// 인증 비활성화 시 (KKULTONG_AUTH_DISABLED=1), 모든 요청을 허용합니다.
pub async fn auth_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    // 환경 변수로 인증 비활성화 가능 (개발/테스트용)
    if std::env::var("KKULTONG_AUTH_DISABLED").unwrap_or_default() == "1" {
        return Ok(next.run(req).await);
    }

    // 캐시 우선, 캐시가 없으면(별도 프로세스 등) 파일에서 읽기
    let expected = {
        let cached = CACHED_TOKEN.read().unwrap_or_else(|e| e.into_inner());
        cached.clone()
    };
    let expected = match expected.or_else(read_token_from_file) {
        Some(t) => t,
        None => {
            tracing::warn!(
                "No IPC token file found at {} — rejecting request",
                token_file_path()
            );
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let provided = req
        .headers()
        .get("X-Kkultong-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == expected {
        Ok(next.run(req).await)
    } else {
        // Rate-limit: 30초당 최대 1번 경고 로그
        let should_log = {
            let mut last = AUTH_FAIL_LAST_LOG.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                Some(t) if t.elapsed().as_secs() < 30 => false,
                _ => {
                    *last = Some(std::time::Instant::now());
                    true
                }
            }
        };
        if should_log {
            tracing::warn!("IPC auth failed for {}", req.uri());
        }
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 환경 변수를 건드리므로 한 함수에서 순서대로 검증
    #[test]
    fn test_token_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let token_path = tmp.path().join(".ipc_token");
        std::env::set_var("KKULTONG_TOKEN_PATH", &token_path);

        let token = generate_and_save_token().unwrap();
        assert_eq!(token.len(), 36); // uuid v4

        let read_back = read_token_from_file().unwrap();
        assert_eq!(read_back, *token);

        // 재생성하면 파일과 캐시 모두 새 토큰
        let token2 = generate_and_save_token().unwrap();
        assert_ne!(*token, *token2);
        assert_eq!(read_token_from_file().unwrap(), *token2);

        std::env::remove_var("KKULTONG_TOKEN_PATH");
    }
}
