use std::sync::Arc;
use std::time::Duration;

use kkultong_core::config::HoneypotConfig;
use kkultong_core::ipc;
use kkultong_core::registry::SessionRegistry;
use kkultong_core::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("kkultong core daemon starting");

    let config = Arc::new(HoneypotConfig::load()?);
    let registry = Arc::new(SessionRegistry::new(&config.log_dir, &config.hostname));

    // 관리 API 인증 토큰 — 실패해도 데몬은 뜬다 (API가 전부 거부될 뿐)
    if let Err(e) = ipc::auth::generate_and_save_token() {
        tracing::warn!("failed to save IPC auth token: {}", e);
    }

    // 유휴 세션 reaper — 30초마다 오래 조용한 세션 정리
    let reg_reaper = registry.clone();
    let idle = Duration::from_secs(config.session_idle_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let reaped = reg_reaper.reap_idle(idle).await;
            if reaped > 0 {
                tracing::info!("reaped {} idle sessions", reaped);
            }
        }
    });

    // Graceful shutdown: Ctrl+C 시 열린 세션 요약까지 남기고 종료
    let reg_shutdown = registry.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received, cleaning up...");

        let closed = reg_shutdown.shutdown_all().await;
        if closed > 0 {
            tracing::info!("closed {} open sessions", closed);
        }

        println!("\u{1F6D1} Honeypot stopped.");
        std::process::exit(0);
    });

    // 관리용 IPC HTTP 서버
    let ipc_server = ipc::IpcServer::new(registry.clone(), config.clone());
    tracing::info!("Starting IPC server on {}", ipc_server.listen_addr);
    tokio::spawn(async move {
        if let Err(e) = ipc_server.start().await {
            tracing::error!("IPC server error: {}", e);
        }
    });

    // 미끼 서버 본체
    server::start(config, registry).await?;

    tracing::info!("kkultong core daemon shutting down");
    Ok(())
}
