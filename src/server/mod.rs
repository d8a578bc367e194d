//! 미끼 TCP 서버 — 접속을 받아 세션 태스크로 넘깁니다

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::HoneypotConfig;
use crate::registry::SessionRegistry;
use crate::session;

/// 설정된 주소로 바인드합니다. 포트 0이면 OS가 포트를 고릅니다(테스트용).
pub async fn bind(config: &HoneypotConfig) -> anyhow::Result<(TcpListener, SocketAddr)> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind honeypot listener on {}", addr))?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

/// accept 루프 — 접속마다 세션 태스크 하나. 정상적으로는 돌아오지 않습니다.
pub async fn serve(
    listener: TcpListener,
    config: Arc<HoneypotConfig>,
    registry: Arc<SessionRegistry>,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    println!("\u{1F680} Honeypot listening on {}", local_addr);
    tracing::info!("honeypot listening on {}", local_addr);

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let cfg = config.clone();
        let reg = registry.clone();
        let sid = session_id.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = session::run(stream, peer, sid.clone(), cfg, reg.clone()).await {
                // 끊긴 소켓에 쓰다 난 에러가 대부분 — 조용히 정리
                tracing::debug!("session {} ended with error: {}", sid, e);
            }
            reg.remove(&sid).await;
            tracing::info!("session {} closed", sid);
        });

        registry
            .register(&session_id, peer.to_string(), handle.abort_handle())
            .await;
    }
}

/// bind + serve 한 번에 — 데몬 main 에서 사용
pub async fn start(
    config: Arc<HoneypotConfig>,
    registry: Arc<SessionRegistry>,
) -> anyhow::Result<()> {
    let (listener, _) = bind(&config).await?;
    serve(listener, config, registry).await
}
