//! 세션 감사 로그 — JSONL 이벤트 스트림 + 세션 요약
//!
//! 세션마다 `{log_dir}/{session_id}.jsonl` 에 이벤트를 한 줄에 하나씩
//! 쌓고, 세션이 끝나면 `{session_id}_summary.json` 으로 요약을 남깁니다.
//! 요약에는 의심 명령 스크리닝 결과가 포함되어 후처리(ML 분석 등)의
//! 입력으로 쓰입니다.
//!
//! 감사 로그 실패는 세션을 죽이지 않습니다 — 기록 실패는 경고로만
//! 남기고 상호작용은 계속합니다. 미끼가 디스크 문제로 끊기면 안 되니까.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// 요약 단계에서 의심 명령으로 분류하는 키워드
pub const SUSPICIOUS_KEYWORDS: [&str; 8] =
    ["wget", "curl", "nc", "chmod", "ssh", "scp", "python", "perl"];

#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    time: String,
    event: &'a str,
    data: &'a Value,
}

#[derive(Debug, Serialize)]
struct CommandRecord<'a> {
    time: String,
    event: &'static str,
    user: &'a str,
    host: &'a str,
    cwd: &'a str,
    input: &'a str,
    output: &'a str,
}

/// 세션 종료 요약
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user: String,
    pub host: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_sec: f64,
    pub total_commands: usize,
    pub suspicious_commands: Vec<String>,
    pub suspicious_count: usize,
}

impl SessionSummary {
    pub fn new(
        session_id: &str,
        user: &str,
        host: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        commands: &[String],
    ) -> Self {
        let suspicious_commands = screen_suspicious(commands);
        Self {
            session_id: session_id.to_string(),
            user: user.to_string(),
            host: host.to_string(),
            start_time: rfc3339(start_time),
            end_time: rfc3339(end_time),
            duration_sec: (end_time - start_time).num_milliseconds() as f64 / 1000.0,
            total_commands: commands.len(),
            suspicious_count: suspicious_commands.len(),
            suspicious_commands,
        }
    }
}

/// 키워드가 하나라도 포함된 명령만 추립니다
pub fn screen_suspicious(commands: &[String]) -> Vec<String> {
    commands
        .iter()
        .filter(|cmd| SUSPICIOUS_KEYWORDS.iter().any(|k| cmd.contains(k)))
        .cloned()
        .collect()
}

/// 세션 하나의 감사 기록 담당
#[derive(Debug, Clone)]
pub struct SessionLogger {
    log_dir: PathBuf,
    session_id: String,
}

impl SessionLogger {
    pub fn new(log_dir: impl Into<PathBuf>, session_id: &str) -> Self {
        Self {
            log_dir: log_dir.into(),
            session_id: session_id.to_string(),
        }
    }

    pub fn event_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", self.session_id))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.log_dir
            .join(format!("{}_summary.json", self.session_id))
    }

    /// 일반 이벤트 한 줄 (login_success, login_failed, disconnect ...)
    pub fn log_event(&self, event: &str, data: Value) {
        let record = EventRecord {
            time: rfc3339(Utc::now()),
            event,
            data: &data,
        };
        self.append_line(&record);
    }

    /// 명령 실행 이벤트 — 입력/출력과 실행 환경(user, host, cwd)까지
    pub fn log_command(&self, user: &str, host: &str, cwd: &str, input: &str, output: &str) {
        let record = CommandRecord {
            time: rfc3339(Utc::now()),
            event: "command",
            user,
            host,
            cwd,
            input,
            output,
        };
        self.append_line(&record);
    }

    /// 세션 요약을 별도 JSON 파일로
    pub fn log_summary(&self, summary: &SessionSummary) {
        if let Err(e) = fs::create_dir_all(&self.log_dir) {
            tracing::warn!("audit: failed to create log dir: {}", e);
            return;
        }
        match serde_json::to_string_pretty(summary) {
            Ok(json) => {
                if let Err(e) = fs::write(self.summary_path(), json) {
                    tracing::warn!(
                        "audit: failed to write summary for session {}: {}",
                        self.session_id,
                        e
                    );
                }
            }
            Err(e) => tracing::warn!("audit: failed to serialize summary: {}", e),
        }
    }

    fn append_line<T: Serialize>(&self, record: &T) {
        if let Err(e) = self.try_append_line(record) {
            tracing::warn!(
                "audit: failed to append event for session {}: {}",
                self.session_id,
                e
            );
        }
    }

    fn try_append_line<T: Serialize>(&self, record: &T) -> anyhow::Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.event_path())?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}
