//! Python 분석 도구용 가상환경 부트스트랩
//!
//! 꿀통 데몬 옆에서 쓰는 Python 도구(세션 로그 분석 스크립트 등)를 위해
//! 격리된 가상환경(venv)을 재현 가능하게 준비합니다. `kkultong-setup`
//! 바이너리가 이 모듈의 [`run`]을 그대로 호출합니다.
//!
//! ## 부트스트랩 흐름 (순차, fail-fast)
//! 1. 시스템 Python ≥ 3.10 탐색 (`python` / `python3` / `py`)
//! 2. 현재 작업 디렉토리에 `honeypot/` venv 생성
//! 3. 이후 모든 단계는 venv 내부 인터프리터로 실행 — 별도의 activate
//!    스크립트 없이 프로세스 로컬로만 도구 해석 경로가 바뀝니다
//! 4. venv 안에서 pip 최신화
//! 5. `requirements.txt` 의존성 설치
//!
//! 어느 단계든 실패하면 나머지 단계는 실행되지 않고, 실패한 도구의
//! 진단 출력과 종료 코드가 호출자에게 그대로 전달됩니다.

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::utils::apply_creation_flags;

/// venv 디렉토리 이름 — 현재 작업 디렉토리 바로 아래에 생성됩니다.
pub const ENV_DIR_NAME: &str = "honeypot";

/// 의존성 매니페스트 파일 이름 (pip 형식, 내용은 pip 소관)
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// 시스템 Python 사용 시 최소 요구 버전
const MIN_PYTHON_VERSION: (u32, u32) = (3, 10);

/// 모든 단계 성공 시 표준 출력으로 내보내는 안내 문구.
/// 문구 자체가 사용자 인터페이스이므로 글자 하나도 바꾸지 않습니다.
pub const SETUP_COMPLETE_MESSAGE: &str = "\u{2705} Setup complete.\n\u{1F449} Run the honeypot with:\n   source honeypot/bin/activate && python honeypot/main.py";

/// 셋업 단계별 에러 — 단계당 하나의 변형, 실패한 도구의 진단 출력과
/// 종료 코드를 그대로 담습니다. 재시도나 복구는 하지 않습니다.
#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("environment creation failed: {diagnostic}")]
    EnvironmentCreation {
        diagnostic: String,
        exit_code: Option<i32>,
    },

    #[error("installer upgrade failed: {diagnostic}")]
    InstallerUpgrade {
        diagnostic: String,
        exit_code: Option<i32>,
    },

    #[error("dependency install failed: {diagnostic}")]
    DependencyInstall {
        diagnostic: String,
        exit_code: Option<i32>,
    },
}

impl SetupError {
    /// 실패한 도구가 남긴 진단 출력 (래핑 없이 그대로)
    pub fn diagnostic(&self) -> &str {
        match self {
            Self::EnvironmentCreation { diagnostic, .. }
            | Self::InstallerUpgrade { diagnostic, .. }
            | Self::DependencyInstall { diagnostic, .. } => diagnostic,
        }
    }

    /// 프로세스 종료 코드 — 도구의 코드를 전파하고, 없으면 1
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EnvironmentCreation { exit_code, .. }
            | Self::InstallerUpgrade { exit_code, .. }
            | Self::DependencyInstall { exit_code, .. } => match exit_code {
                Some(code) if *code != 0 => *code,
                _ => 1,
            },
        }
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EnvironmentCreation { .. } => "ENVIRONMENT_CREATION_ERROR",
            Self::InstallerUpgrade { .. } => "INSTALLER_UPGRADE_ERROR",
            Self::DependencyInstall { .. } => "DEPENDENCY_INSTALL_ERROR",
        }
    }
}

/// 외부 도구 한 번 실행의 실패 정보
struct ToolFailure {
    diagnostic: String,
    exit_code: Option<i32>,
}

// ═══════════════════════════════════════════════════════════════
//  Public API
// ═══════════════════════════════════════════════════════════════

/// 현재 작업 디렉토리에서 전체 부트스트랩을 수행합니다.
pub async fn run() -> Result<(), SetupError> {
    run_in(Path::new(".")).await
}

/// `workdir` 기준으로 부트스트랩을 수행합니다.
/// venv는 `workdir/honeypot`, 매니페스트는 `workdir/requirements.txt`.
pub async fn run_in(workdir: &Path) -> Result<(), SetupError> {
    let venv_dir = workdir.join(ENV_DIR_NAME);

    create_env(&venv_dir).await?;

    // "활성화" — 이후 단계는 전부 venv 자신의 인터프리터로 실행
    let python_exe = venv_python_exe(&venv_dir);

    upgrade_installer(&python_exe).await?;
    install_requirements(&python_exe, &workdir.join(REQUIREMENTS_FILE)).await?;

    Ok(())
}

/// 진단 정보를 JSON으로 반환합니다. (IPC `/api/pyenv/status` 용)
pub async fn status() -> serde_json::Value {
    let venv_dir = PathBuf::from(ENV_DIR_NAME);
    let python_exe = venv_python_exe(&venv_dir);
    let venv_ok = python_exe.exists() && verify_python(&python_exe).await;

    let mut info = serde_json::json!({
        "available": venv_ok,
        "env_dir": venv_dir.to_string_lossy(),
        "env_python": python_exe.to_string_lossy(),
        "requirements_present": Path::new(REQUIREMENTS_FILE).exists(),
    });

    if venv_ok {
        if let Ok(ver) = get_version(&python_exe).await {
            info["python_version"] = serde_json::json!(ver);
        }
    }

    match detect_system_python().await {
        Ok(cmd) => info["system_python"] = serde_json::json!(cmd),
        Err(_) => info["system_python"] = serde_json::json!(null),
    }

    info
}

/// 시스템에서 Python ≥ 3.10 을 탐지합니다.
pub async fn detect_system_python() -> anyhow::Result<String> {
    let candidates = ["python", "python3", "py"];
    for cmd_name in candidates {
        let mut cmd = Command::new(cmd_name);
        cmd.arg("--version");
        apply_creation_flags(&mut cmd);

        if let Ok(output) = cmd.output().await {
            if output.status.success() {
                let ver = String::from_utf8_lossy(&output.stdout);
                if let Some((major, minor)) = parse_python_version(&ver) {
                    if (major, minor) >= MIN_PYTHON_VERSION {
                        tracing::info!("시스템 Python 발견: {} → {}", cmd_name, ver.trim());
                        return Ok(cmd_name.to_string());
                    }
                    tracing::debug!(
                        "{} → {}.{} (최소 {}.{} 필요, 건너뜀)",
                        cmd_name,
                        major,
                        minor,
                        MIN_PYTHON_VERSION.0,
                        MIN_PYTHON_VERSION.1
                    );
                }
            }
        }
    }
    Err(anyhow::anyhow!(
        "no Python >= {}.{} interpreter found on this system",
        MIN_PYTHON_VERSION.0,
        MIN_PYTHON_VERSION.1
    ))
}

// ═══════════════════════════════════════════════════════════════
//  Steps
// ═══════════════════════════════════════════════════════════════

/// 1단계: venv 생성. 기존 venv가 있으면 `python -m venv`가 알아서
/// 재사용하므로 두 번 돌려도 결과는 같습니다.
async fn create_env(venv_dir: &Path) -> Result<(), SetupError> {
    let base_python =
        detect_system_python()
            .await
            .map_err(|e| SetupError::EnvironmentCreation {
                diagnostic: e.to_string(),
                exit_code: None,
            })?;

    tracing::info!(
        "venv 생성 중: {} (base: {})",
        venv_dir.display(),
        base_python
    );

    let mut cmd = Command::new(&base_python);
    cmd.args(["-m", "venv"]).arg(venv_dir);
    apply_creation_flags(&mut cmd);

    run_tool(cmd)
        .await
        .map_err(|f| SetupError::EnvironmentCreation {
            diagnostic: f.diagnostic,
            exit_code: f.exit_code,
        })?;

    // 생성 후 검증 — 인터프리터가 실제로 돌아야 환경이 존재하는 것
    let python_exe = venv_python_exe(venv_dir);
    if !verify_python(&python_exe).await {
        return Err(SetupError::EnvironmentCreation {
            diagnostic: format!(
                "virtual environment created but interpreter failed verification: {}",
                python_exe.display()
            ),
            exit_code: None,
        });
    }

    Ok(())
}

/// 3단계: venv 안에서 pip 최신화
async fn upgrade_installer(python_exe: &Path) -> Result<(), SetupError> {
    tracing::info!("pip 업그레이드 중");
    run_pip(python_exe, &["install", "--upgrade", "pip"])
        .await
        .map_err(|f| SetupError::InstallerUpgrade {
            diagnostic: f.diagnostic,
            exit_code: f.exit_code,
        })
}

/// 4단계: requirements.txt 설치. 매니페스트가 없으면 pip을 부르기 전에
/// 실패를 확정합니다 — 네트워크 호출이 일어나면 안 되는 경우.
async fn install_requirements(
    python_exe: &Path,
    requirements_path: &Path,
) -> Result<(), SetupError> {
    if !requirements_path.is_file() {
        return Err(SetupError::DependencyInstall {
            diagnostic: format!(
                "requirements manifest not found: {}",
                requirements_path.display()
            ),
            exit_code: None,
        });
    }

    tracing::info!("requirements 설치: {}", requirements_path.display());
    run_pip(
        python_exe,
        &["install", "-r", &requirements_path.to_string_lossy()],
    )
    .await
    .map_err(|f| SetupError::DependencyInstall {
        diagnostic: f.diagnostic,
        exit_code: f.exit_code,
    })
}

// ═══════════════════════════════════════════════════════════════
//  Internal: 도구 실행 & 경로
// ═══════════════════════════════════════════════════════════════

/// pip 명령 실행 (venv 인터프리터 경유)
async fn run_pip(python_exe: &Path, args: &[&str]) -> Result<(), ToolFailure> {
    let mut cmd = Command::new(python_exe);
    cmd.arg("-m").arg("pip");
    for arg in args {
        cmd.arg(arg);
    }
    apply_creation_flags(&mut cmd);
    run_tool(cmd).await
}

/// 외부 도구 한 번 실행. 실패 시 stderr와 종료 코드를 그대로 보존합니다.
async fn run_tool(mut cmd: Command) -> Result<(), ToolFailure> {
    let output = cmd.output().await.map_err(|e| ToolFailure {
        diagnostic: e.to_string(),
        exit_code: None,
    })?;

    if !output.status.success() {
        return Err(ToolFailure {
            diagnostic: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        });
    }
    Ok(())
}

/// venv 내 Python 실행 파일 경로
pub fn venv_python_exe(venv_dir: &Path) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        venv_dir.join("Scripts").join("python.exe")
    }
    #[cfg(not(target_os = "windows"))]
    {
        venv_dir.join("bin").join("python")
    }
}

/// Python 실행 파일이 정상 동작하는지 확인
async fn verify_python(exe: &Path) -> bool {
    let mut cmd = Command::new(exe);
    cmd.args([
        "-c",
        "import sys; v=sys.version_info; print(f'{v.major}.{v.minor}.{v.micro}')",
    ]);
    apply_creation_flags(&mut cmd);
    matches!(cmd.output().await, Ok(o) if o.status.success())
}

/// Python --version 문자열 반환
async fn get_version(exe: &Path) -> anyhow::Result<String> {
    let mut cmd = Command::new(exe);
    cmd.arg("--version");
    apply_creation_flags(&mut cmd);
    let output = cmd.output().await?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// "Python 3.12.8" → (3, 12)
fn parse_python_version(s: &str) -> Option<(u32, u32)> {
    let s = s.trim();
    let ver_part = s
        .strip_prefix("Python ")
        .or_else(|| s.strip_prefix("python "))
        .unwrap_or(s);
    let parts: Vec<&str> = ver_part.split('.').collect();
    if parts.len() >= 2 {
        let major = parts[0].trim().parse().ok()?;
        let minor = parts[1].trim().parse().ok()?;
        Some((major, minor))
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
