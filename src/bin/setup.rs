//! kkultong-setup — Python 분석 도구 환경 부트스트랩 바이너리
//!
//! 인자 없이 실행합니다. 현재 디렉토리에 `honeypot/` venv를 만들고
//! pip 최신화 후 `requirements.txt`를 설치합니다. 전부 성공하면
//! 안내 두 줄을 출력하고 0으로 종료, 어느 단계든 실패하면 해당 도구의
//! 진단 출력을 stderr로 그대로 내보내고 그 종료 코드로 종료합니다.
//!
//! stdout은 성공 안내 문구 전용입니다. 로그는 stderr로만 나가고,
//! RUST_LOG를 주지 않으면 아무것도 출력하지 않습니다.

use kkultong_core::bootstrap;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match bootstrap::run().await {
        Ok(()) => {
            println!("{}", bootstrap::SETUP_COMPLETE_MESSAGE);
        }
        Err(e) => {
            // 실패한 도구의 진단을 래핑 없이 그대로 전달
            let diagnostic = e.diagnostic();
            if !diagnostic.is_empty() {
                if diagnostic.ends_with('\n') {
                    eprint!("{}", diagnostic);
                } else {
                    eprintln!("{}", diagnostic);
                }
            }
            std::process::exit(e.exit_code());
        }
    }
}
