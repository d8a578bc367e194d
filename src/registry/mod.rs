//! 활성 세션 레지스트리
//!
//! 살아 있는 세션의 메타데이터를 들고 있다가 IPC 조회에 답하고,
//! 오래 조용한 세션을 정리(reap)합니다. 정리든 데몬 종료든, 세션
//! 태스크가 스스로 마무리하지 못한 경우에도 요약이 디스크에 남도록
//! 레지스트리가 대신 요약을 씁니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

use crate::audit::{SessionLogger, SessionSummary};

/// IPC로 노출되는 세션 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    pub id: String,
    pub peer_addr: String,
    pub username: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub commands_run: usize,
}

struct SessionSlot {
    entry: SessionEntry,
    /// 요약 작성용 — 세션이 실행한 명령 원문
    commands: Vec<String>,
    abort: AbortHandle,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    total_served: AtomicU64,
    log_dir: PathBuf,
    hostname: String,
}

impl SessionRegistry {
    pub fn new(log_dir: impl Into<PathBuf>, hostname: &str) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            total_served: AtomicU64::new(0),
            log_dir: log_dir.into(),
            hostname: hostname.to_string(),
        }
    }

    pub async fn register(&self, id: &str, peer_addr: String, abort: AbortHandle) {
        let now = Utc::now();
        let slot = SessionSlot {
            entry: SessionEntry {
                id: id.to_string(),
                peer_addr,
                username: None,
                started_at: now,
                last_activity: now,
                commands_run: 0,
            },
            commands: Vec::new(),
            abort,
        };
        self.sessions.write().await.insert(id.to_string(), slot);
        self.total_served.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn set_username(&self, id: &str, username: &str) {
        if let Some(slot) = self.sessions.write().await.get_mut(id) {
            slot.entry.username = Some(username.to_string());
            slot.entry.last_activity = Utc::now();
        }
    }

    /// 입력이 있었음을 기록 (정리 타이머 리셋)
    pub async fn touch(&self, id: &str) {
        if let Some(slot) = self.sessions.write().await.get_mut(id) {
            slot.entry.last_activity = Utc::now();
        }
    }

    pub async fn record_command(&self, id: &str, command: &str) {
        if let Some(slot) = self.sessions.write().await.get_mut(id) {
            slot.commands.push(command.to_string());
            slot.entry.commands_run += 1;
            slot.entry.last_activity = Utc::now();
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn get(&self, id: &str) -> Option<SessionEntry> {
        self.sessions.read().await.get(id).map(|s| s.entry.clone())
    }

    pub async fn snapshot(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<SessionEntry> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.entry.clone())
            .collect();
        entries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        entries
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 데몬 시작 이후 받은 세션 누적 수
    pub fn total_served(&self) -> u64 {
        self.total_served.load(Ordering::Relaxed)
    }

    /// `max_idle` 넘게 조용한 세션을 중단시키고 요약을 남깁니다.
    /// 반환값은 정리된 세션 수.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let max_idle_secs = max_idle.as_secs() as i64;

        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, slot)| {
                (now - slot.entry.last_activity).num_seconds() >= max_idle_secs
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(slot) = sessions.remove(id) {
                tracing::info!(
                    "reaping idle session {} (peer: {}, idle since {})",
                    id,
                    slot.entry.peer_addr,
                    slot.entry.last_activity
                );
                slot.abort.abort();
                self.finalize(&slot, "idle_timeout");
            }
        }
        expired.len()
    }

    /// 종료 시: 아직 살아 있는 모든 세션을 중단시키고 요약을 남깁니다.
    pub async fn shutdown_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for (id, slot) in sessions.drain() {
            tracing::info!("[Shutdown] closing session {} ({})", id, slot.entry.peer_addr);
            slot.abort.abort();
            self.finalize(&slot, "daemon_shutdown");
        }
        count
    }

    /// 세션 태스크 대신 disconnect 이벤트와 요약을 기록합니다
    fn finalize(&self, slot: &SessionSlot, reason: &str) {
        let logger = SessionLogger::new(&self.log_dir, &slot.entry.id);
        logger.log_event("disconnect", serde_json::json!({ "reason": reason }));

        let user = slot.entry.username.as_deref().unwrap_or("unknown");
        let summary = SessionSummary::new(
            &slot.entry.id,
            user,
            &self.hostname,
            slot.entry.started_at,
            Utc::now(),
            &slot.commands,
        );
        logger.log_summary(&summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn dummy_abort_handle() -> AbortHandle {
        tokio::spawn(std::future::pending::<()>()).abort_handle()
    }

    #[tokio::test]
    async fn test_register_and_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SessionRegistry::new(tmp.path(), "server01");

        reg.register("s1", "10.0.0.5:40000".into(), dummy_abort_handle().await)
            .await;
        reg.set_username("s1", "root").await;
        reg.record_command("s1", "ls").await;
        reg.record_command("s1", "cat /etc/passwd").await;

        assert_eq!(reg.active_count().await, 1);
        assert_eq!(reg.total_served(), 1);

        let entry = reg.get("s1").await.unwrap();
        assert_eq!(entry.username.as_deref(), Some("root"));
        assert_eq!(entry.commands_run, 2);

        let snap = reg.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].peer_addr, "10.0.0.5:40000");
    }

    #[tokio::test]
    async fn test_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SessionRegistry::new(tmp.path(), "server01");
        reg.register("gone", "1.2.3.4:5".into(), dummy_abort_handle().await)
            .await;
        assert!(reg.remove("gone").await);
        assert!(!reg.remove("gone").await);
        assert_eq!(reg.active_count().await, 0);
        // 누적 카운트는 줄지 않음
        assert_eq!(reg.total_served(), 1);
    }

    #[tokio::test]
    async fn test_reap_idle_writes_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SessionRegistry::new(tmp.path(), "server01");

        let task = tokio::spawn(std::future::pending::<()>());
        reg.register("idle-1", "9.9.9.9:1024".into(), task.abort_handle())
            .await;
        reg.set_username("idle-1", "admin").await;
        reg.record_command("idle-1", "wget http://x").await;

        // 임계값 0 → 즉시 만료
        let reaped = reg.reap_idle(Duration::from_secs(0)).await;
        assert_eq!(reaped, 1);
        assert_eq!(reg.active_count().await, 0);
        assert!(task.await.unwrap_err().is_cancelled());

        let summary_path = tmp.path().join("idle-1_summary.json");
        let content = std::fs::read_to_string(summary_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["user"], "admin");
        assert_eq!(parsed["suspicious_count"], 1);
    }

    #[tokio::test]
    async fn test_reap_spares_active_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SessionRegistry::new(tmp.path(), "server01");
        reg.register("live", "8.8.8.8:2048".into(), dummy_abort_handle().await)
            .await;

        let reaped = reg.reap_idle(Duration::from_secs(3600)).await;
        assert_eq!(reaped, 0);
        assert_eq!(reg.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = SessionRegistry::new(tmp.path(), "server01");
        reg.register("a", "1.1.1.1:1".into(), dummy_abort_handle().await)
            .await;
        reg.register("b", "2.2.2.2:2".into(), dummy_abort_handle().await)
            .await;

        assert_eq!(reg.shutdown_all().await, 2);
        assert_eq!(reg.active_count().await, 0);
    }
}
