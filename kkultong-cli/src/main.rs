mod client;

use client::DaemonClient;

fn print_usage() {
    eprintln!("usage: kkultong-cli [--url <base_url>] <command>");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  status          데몬 상태");
    eprintln!("  sessions        활성 세션 목록");
    eprintln!("  session <id>    세션 상세");
    eprintln!("  pyenv           Python 도구 환경 상태");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let mut base_url: Option<String> = None;
    if args.first().map(String::as_str) == Some("--url") {
        if args.len() < 2 {
            print_usage();
            anyhow::bail!("--url requires a value");
        }
        base_url = Some(args[1].clone());
        args.drain(0..2);
    }

    let client = DaemonClient::new(base_url.as_deref());

    match args.first().map(String::as_str) {
        Some("status") | None => {
            let v = client.status().await?;
            println!("hostname:        {}", v["hostname"].as_str().unwrap_or("?"));
            println!("listen:          {}", v["listen"].as_str().unwrap_or("?"));
            println!("active sessions: {}", v["active_sessions"]);
            println!("total sessions:  {}", v["total_sessions"]);
            println!("uptime:          {}s", v["uptime_secs"]);
        }

        Some("sessions") => {
            let sessions = client.sessions().await?;
            if sessions.is_empty() {
                println!("no active sessions");
                return Ok(());
            }
            for s in sessions {
                println!(
                    "{}  {:<21}  {:<10}  {} cmds",
                    s["id"].as_str().unwrap_or("?"),
                    s["peer_addr"].as_str().unwrap_or("?"),
                    s["username"].as_str().unwrap_or("-"),
                    s["commands_run"]
                );
            }
        }

        Some("session") => {
            let id = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("usage: kkultong-cli session <id>"))?;
            let v = client.session(id).await?;
            println!("{}", serde_json::to_string_pretty(&v)?);
        }

        Some("pyenv") => {
            let v = client.pyenv_status().await?;
            println!("{}", serde_json::to_string_pretty(&v)?);
        }

        Some(other) => {
            print_usage();
            anyhow::bail!("unknown command: {}", other);
        }
    }

    Ok(())
}
