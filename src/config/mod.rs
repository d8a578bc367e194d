//! 데몬 설정 — `config/honeypot.toml`
//!
//! 파일이 없으면 기본값으로 동작합니다. 모든 필드에 기본값이 있으므로
//! 운영자는 바꾸고 싶은 항목만 적으면 됩니다.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const CONFIG_PATH: &str = "config/honeypot.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HoneypotConfig {
    /// 미끼 서버가 바인드할 주소
    pub listen_host: String,
    pub listen_port: u16,

    /// 가짜 셸이 표시하는 호스트명
    pub hostname: String,

    /// 접속 직후 내보내는 배너 — 세션마다 무작위 선택
    pub banner_variants: Vec<String>,

    /// 로그인에 성공하는 미끼 계정 (username → password)
    pub fake_users: HashMap<String, String>,

    /// 세션 이벤트 JSONL / 요약 JSON 저장 디렉토리
    pub log_dir: String,

    /// 관리용 IPC HTTP 서버 주소 (루프백 전용으로 운영할 것)
    pub ipc_listen: String,

    /// 이 시간 동안 입력이 없는 세션은 정리 대상
    pub session_idle_secs: u64,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        let mut fake_users = HashMap::new();
        fake_users.insert("root".to_string(), "toor".to_string());
        fake_users.insert("admin".to_string(), "admin123".to_string());

        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 2222,
            hostname: "server01".to_string(),
            banner_variants: vec!["SSH-2.0-OpenSSH_8.2p1".to_string()],
            fake_users,
            log_dir: "logs/sessions".to_string(),
            ipc_listen: "127.0.0.1:57575".to_string(),
            session_idle_secs: 600,
        }
    }
}

impl HoneypotConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(CONFIG_PATH)
    }

    /// 파일이 없으면 기본값, 있는데 깨져 있으면 에러.
    /// 깨진 설정으로 조용히 기본값을 쓰면 운영 사고로 이어집니다.
    pub fn load_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg: Self = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::info!("loaded config from {}", path.display());
        Ok(cfg)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = HoneypotConfig::default();
        assert_eq!(cfg.listen_port, 2222);
        assert_eq!(cfg.hostname, "server01");
        assert_eq!(cfg.fake_users.get("root").map(String::as_str), Some("toor"));
        assert!(!cfg.banner_variants.is_empty());
        assert_eq!(cfg.listen_addr(), "0.0.0.0:2222");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = HoneypotConfig::load_from("/nonexistent/honeypot.toml").unwrap();
        assert_eq!(cfg.listen_port, 2222);
    }

    #[test]
    fn test_partial_config_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
listen_port = 2022
hostname = "web-prod-03"

[fake_users]
deploy = "deploy2020"
"#
        )
        .unwrap();

        let cfg = HoneypotConfig::load_from(f.path()).unwrap();
        assert_eq!(cfg.listen_port, 2022);
        assert_eq!(cfg.hostname, "web-prod-03");
        // 명시한 계정만 남고 기본 계정은 대체됨
        assert_eq!(cfg.fake_users.len(), 1);
        // 나머지는 기본값
        assert_eq!(cfg.listen_host, "0.0.0.0");
        assert_eq!(cfg.session_idle_secs, 600);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "listen_port = \"not a number\"").unwrap();
        assert!(HoneypotConfig::load_from(f.path()).is_err());
    }
}
