//! 접속 한 건의 전체 상호작용 — 배너 → 가짜 로그인 → 가짜 셸
//!
//! 실제 SSH 프로토콜은 말하지 않습니다. SSH처럼 보이는 배너 한 줄을
//! 보낸 뒤 평문 login/Password 프롬프트로 자격 증명을 받아내고,
//! 성공하면 바이트 단위 에코/백스페이스/방향키까지 흉내 내는 셸
//! 루프로 들어갑니다. 셸이 어떻게 끝나든(logout, EOF, 에러) 접속
//! 해제 이벤트와 세션 요약은 반드시 기록됩니다.

use chrono::{DateTime, Local, Utc};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::audit::{SessionLogger, SessionSummary};
use crate::config::HoneypotConfig;
use crate::emulator::ShellEmulator;
use crate::registry::SessionRegistry;

const DEFAULT_BANNER: &str = "SSH-2.0-OpenSSH_8.2p1";
const DEFAULT_CWD: &str = "/home/root";

/// `Last login:` 줄에 쓰는 그럴듯한 내부망 주소들
const FAKE_LAST_LOGIN_IPS: [&str; 3] = ["192.168.1.55", "10.0.2.15", "172.16.0.22"];

/// 접속 하나를 끝까지 처리합니다. 서버 accept 루프에서 태스크로 띄웁니다.
pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    session_id: String,
    config: Arc<HoneypotConfig>,
    registry: Arc<SessionRegistry>,
) -> anyhow::Result<()> {
    tracing::info!("session {} started (peer: {})", session_id, peer);

    let (read_half, write_half) = stream.into_split();
    let logger = SessionLogger::new(&config.log_dir, &session_id);

    let mut session = Session {
        id: session_id,
        reader: BufReader::new(read_half),
        writer: write_half,
        logger,
        emulator: ShellEmulator::new(),
        username: String::new(),
        cwd: DEFAULT_CWD.to_string(),
        start_time: Utc::now(),
        commands_run: Vec::new(),
        history_index: 0,
        config,
        registry,
    };
    session.run().await
}

struct Session {
    id: String,
    config: Arc<HoneypotConfig>,
    registry: Arc<SessionRegistry>,
    logger: SessionLogger,
    emulator: ShellEmulator,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    username: String,
    cwd: String,
    start_time: DateTime<Utc>,
    commands_run: Vec<String>,
    /// 방향키 히스토리 탐색 위치
    history_index: usize,
}

impl Session {
    async fn run(&mut self) -> anyhow::Result<()> {
        let banner = pick_banner(&self.config.banner_variants);
        self.writer
            .write_all(format!("{}\r\n", banner).as_bytes())
            .await?;

        // ── 가짜 로그인 ──
        self.writer.write_all(b"login: ").await?;
        let username = match self.read_line().await? {
            Some(l) => l,
            None => return Ok(()),
        };
        self.writer.write_all(b"Password: ").await?;
        let password = match self.read_line().await? {
            Some(l) => l,
            None => return Ok(()),
        };

        let authenticated = self
            .config
            .fake_users
            .get(&username)
            .map(|p| p == &password)
            .unwrap_or(false);

        if !authenticated {
            self.writer.write_all(b"Login incorrect\n").await?;
            self.logger
                .log_event("login_failed", serde_json::json!({ "username": username }));
            return Ok(());
        }

        // 마지막 로그인 흔적 — 비어 있는 서버는 수상해 보입니다
        let (last_login_time, fake_ip) = {
            let mut rng = rand::rng();
            let idx = rng.random_range(0..FAKE_LAST_LOGIN_IPS.len());
            (
                Local::now().format("%a %b %d %H:%M:%S %Y").to_string(),
                FAKE_LAST_LOGIN_IPS[idx],
            )
        };
        self.writer
            .write_all(format!("Last login: {} from {}\n", last_login_time, fake_ip).as_bytes())
            .await?;
        self.writer
            .write_all(format!("Welcome to {}!\n", self.config.hostname).as_bytes())
            .await?;

        self.logger
            .log_event("login_success", serde_json::json!({ "username": username }));
        self.registry.set_username(&self.id, &username).await;
        self.username = username;

        let shell_result = self.shell().await;

        // 어느 경로로 끝났든 마무리 기록은 남긴다
        self.logger.log_event("disconnect", serde_json::json!({}));
        let summary = SessionSummary::new(
            &self.id,
            &self.username,
            &self.config.hostname,
            self.start_time,
            Utc::now(),
            &self.commands_run,
        );
        self.logger.log_summary(&summary);

        let _ = self.writer.shutdown().await;
        shell_result
    }

    async fn shell(&mut self) -> anyhow::Result<()> {
        self.history_index = self.commands_run.len();

        loop {
            let prompt = format!(
                "{}@{}:{}$ ",
                self.username, self.config.hostname, self.cwd
            );
            self.writer.write_all(prompt.as_bytes()).await?;

            let command = match self.read_interactive_line(&prompt).await? {
                Some(c) => c,
                None => return Ok(()),
            };

            if command.trim().is_empty() {
                continue;
            }

            let result = self.emulator.handle_command(
                &command,
                &self.username,
                &self.config.hostname,
                &self.cwd,
            );

            let result = match result {
                Some(r) => r,
                None => {
                    self.writer.write_all(b"logout\n").await?;
                    return Ok(());
                }
            };

            self.cwd = result.cwd;
            self.commands_run.push(command.clone());
            self.history_index = self.commands_run.len();
            self.registry.record_command(&self.id, &command).await;
            self.logger.log_command(
                &self.username,
                &self.config.hostname,
                &self.cwd,
                &command,
                &result.output,
            );

            // 즉답은 기계 티가 납니다 — 약간의 지연
            let delay_ms: u64 = {
                let mut rng = rand::rng();
                rng.random_range(50..=200)
            };
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            if !result.output.is_empty() {
                self.writer.write_all(result.output.as_bytes()).await?;
                if !result.output.ends_with('\n') {
                    self.writer.write_all(b"\n").await?;
                }
            }
        }
    }

    /// 줄 단위 읽기 (로그인 프롬프트용). EOF면 None.
    async fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buf).trim().to_string()))
    }

    /// 바이트 단위 셸 입력 — 에코, 백스페이스, 방향키 처리.
    /// Enter에서 완성된 줄을 돌려주고, EOF면 None.
    async fn read_interactive_line(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        let mut input_buf: Vec<char> = Vec::new();
        let mut cursor = 0usize;

        loop {
            let mut byte = [0u8; 1];
            let n = self.reader.read(&mut byte).await?;
            if n == 0 {
                return Ok(None);
            }

            match byte[0] {
                b'\n' | b'\r' => {
                    self.writer.write_all(b"\n").await?;
                    return Ok(Some(input_buf.iter().collect()));
                }

                // Backspace (BS 또는 DEL)
                0x08 | 0x7f => {
                    if cursor > 0 {
                        cursor -= 1;
                        input_buf.remove(cursor);
                        self.writer.write_all(b"\x08 \x08").await?;
                    }
                }

                // ESC 시퀀스 — 방향키
                0x1b => {
                    let mut seq = [0u8; 2];
                    if self.reader.read_exact(&mut seq).await.is_err() {
                        return Ok(None);
                    }
                    match &seq {
                        b"[A" => {
                            if self.history_index > 0 {
                                self.history_index -= 1;
                                input_buf =
                                    self.commands_run[self.history_index].chars().collect();
                                cursor = input_buf.len();
                                self.redraw(prompt, &input_buf).await?;
                            }
                        }
                        b"[B" => {
                            if self.history_index + 1 < self.commands_run.len() {
                                self.history_index += 1;
                                input_buf =
                                    self.commands_run[self.history_index].chars().collect();
                            } else {
                                self.history_index = self.commands_run.len();
                                input_buf.clear();
                            }
                            cursor = input_buf.len();
                            self.redraw(prompt, &input_buf).await?;
                        }
                        b"[C" => {
                            if cursor < input_buf.len() {
                                cursor += 1;
                                self.writer.write_all(b"\x1b[C").await?;
                            }
                        }
                        b"[D" => {
                            if cursor > 0 {
                                cursor -= 1;
                                self.writer.write_all(b"\x1b[D").await?;
                            }
                        }
                        _ => {}
                    }
                }

                other => {
                    input_buf.insert(cursor, other as char);
                    cursor += 1;
                    self.writer.write_all(&[other]).await?;
                }
            }
        }
    }

    async fn redraw(&mut self, prompt: &str, input_buf: &[char]) -> anyhow::Result<()> {
        let line: String = input_buf.iter().collect();
        self.writer
            .write_all(format!("\r{}{}", prompt, line).as_bytes())
            .await?;
        Ok(())
    }
}

fn pick_banner(variants: &[String]) -> String {
    if variants.is_empty() {
        return DEFAULT_BANNER.to_string();
    }
    let idx = {
        let mut rng = rand::rng();
        rng.random_range(0..variants.len())
    };
    variants[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_banner_single_variant() {
        let variants = vec!["SSH-2.0-OpenSSH_9.6".to_string()];
        assert_eq!(pick_banner(&variants), "SSH-2.0-OpenSSH_9.6");
    }

    #[test]
    fn test_pick_banner_empty_falls_back() {
        assert_eq!(pick_banner(&[]), DEFAULT_BANNER);
    }

    #[test]
    fn test_pick_banner_from_set() {
        let variants: Vec<String> = vec![
            "SSH-2.0-OpenSSH_8.2p1".into(),
            "SSH-2.0-OpenSSH_7.4".into(),
        ];
        for _ in 0..20 {
            assert!(variants.contains(&pick_banner(&variants)));
        }
    }
}
