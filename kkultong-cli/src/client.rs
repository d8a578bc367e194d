//! 데몬 IPC API 클라이언트

use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl DaemonClient {
    pub fn new(base_url: Option<&str>) -> Self {
        let base_url = base_url.unwrap_or("http://127.0.0.1:57575").to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            token: read_token_from_file(),
        }
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.header("X-Kkultong-Token", token);
        }
        let response = req.send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "Daemon returned {}: {}",
                response.status(),
                response.text().await?
            );
        }
        Ok(response.json().await?)
    }

    /// GET /api/status
    pub async fn status(&self) -> anyhow::Result<Value> {
        self.get_json("/api/status").await
    }

    /// GET /api/sessions — {"sessions": [...]}
    pub async fn sessions(&self) -> anyhow::Result<Vec<Value>> {
        let data = self.get_json("/api/sessions").await?;
        Ok(data
            .get("sessions")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// GET /api/sessions/{id}
    pub async fn session(&self, id: &str) -> anyhow::Result<Value> {
        self.get_json(&format!("/api/sessions/{}", id)).await
    }

    /// GET /api/pyenv/status
    pub async fn pyenv_status(&self) -> anyhow::Result<Value> {
        self.get_json("/api/pyenv/status").await
    }
}

/// 데몬이 저장한 IPC 토큰 읽기 — 경로 규칙은 데몬 쪽과 동일
fn read_token_from_file() -> Option<String> {
    let path = std::env::var("KKULTONG_TOKEN_PATH").unwrap_or_else(|_| {
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
    });
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}
