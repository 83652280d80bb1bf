use crate::env::DeployEnv;
use crate::error::{Error, Result};
use crate::shell;
use std::process::Command;

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the target host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl SshClient {
    pub fn from_env(env: &DeployEnv) -> Result<Self> {
        let host = env.require_host()?.to_string();

        let identity_file = match &env.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::IdentityFileNotFound { path: expanded });
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", host);
        }

        Ok(Self {
            host,
            user: env.user.clone(),
            port: env.port,
            identity_file,
            is_local,
        })
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Timeout and keepalive options prevent hangs on stalled
        // connections or unexpected prompts.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_stdin(command, None)
    }

    /// Run a command under sudo, optionally as a specific user.
    /// The command is wrapped for `sh -c` so operators and pipelines survive
    /// the elevation boundary intact.
    pub fn execute_sudo(&self, user: Option<&str>, command: &str) -> CommandOutput {
        self.execute(&sudo_command(user, command))
    }

    /// Whether a path exists on the remote host.
    pub fn path_exists(&self, path: &str) -> bool {
        self.execute(&format!("test -e {}", shell::quote_path(path)))
            .success
    }

    pub fn upload_file(&self, local_path: &str, remote_path: &str) -> CommandOutput {
        let remote_command = format!("cat > {}", shell::quote_path(remote_path));
        self.execute_with_stdin(&remote_command, Some(local_path))
    }

    fn execute_with_stdin(&self, command: &str, stdin_file: Option<&str>) -> CommandOutput {
        self.execute_with_retry(command, stdin_file, 3)
    }

    fn execute_with_retry(
        &self,
        command: &str,
        stdin_file: Option<&str>,
        max_attempts: u32,
    ) -> CommandOutput {
        let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3

        for attempt in 0..max_attempts {
            let result = self.execute_once(command, stdin_file);

            // Only retry on transient connection errors, not command failures
            if result.success || attempt + 1 >= max_attempts || !is_transient_ssh_error(&result) {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize + 1).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection failed (attempt {}/{}), retrying in {}s...",
                attempt + 1,
                max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
        }

        // Unreachable, but satisfy the compiler
        CommandOutput {
            stdout: String::new(),
            stderr: "SSH retry exhausted".to_string(),
            success: false,
            exit_code: -1,
        }
    }

    fn execute_once(&self, command: &str, stdin_file: Option<&str>) -> CommandOutput {
        // Local execution: run command directly instead of over SSH
        if self.is_local {
            if let Some(stdin_file_path) = stdin_file {
                // For stdin piping (used by upload_file), use shell redirection
                let local_cmd = format!("cat {} | {}", shell::quote_path(stdin_file_path), command);
                return execute_local_command(&local_cmd);
            }
            return execute_local_command(command);
        }

        let args = self.build_ssh_args(command);

        let mut cmd = Command::new("ssh");
        cmd.args(&args);

        if let Some(stdin_file_path) = stdin_file {
            match std::fs::File::open(stdin_file_path) {
                Ok(file) => {
                    cmd.stdin(file);
                }
                Err(err) => {
                    return CommandOutput {
                        stdout: String::new(),
                        stderr: format!("Failed to open stdin file: {}", err),
                        success: false,
                        exit_code: -1,
                    };
                }
            }
        }

        match cmd.output() {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput {
                stdout: String::new(),
                stderr: format!("SSH error: {}", e),
                success: false,
                exit_code: -1,
            },
        }
    }
}

/// Wrap a command for privilege-elevated dispatch.
pub fn sudo_command(user: Option<&str>, command: &str) -> String {
    match user {
        Some(user) => format!(
            "sudo -u {} sh -c {}",
            shell::quote_arg(user),
            shell::escape_command_for_shell(command)
        ),
        None => format!("sudo sh -c {}", shell::escape_command_for_shell(command)),
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);

    match cmd.output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput {
            stdout: String::new(),
            stderr: format!("Command error: {}", e),
            success: false,
            exit_code: -1,
        },
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve hostname",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sudo_command_without_user() {
        assert_eq!(
            sudo_command(None, "apt-get install dtach"),
            "sudo sh -c 'apt-get install dtach'"
        );
    }

    #[test]
    fn sudo_command_as_user_quotes_payload() {
        assert_eq!(
            sudo_command(Some("onepercent"), "git reset --hard"),
            "sudo -u onepercent sh -c 'git reset --hard'"
        );
    }

    #[test]
    fn sudo_command_escapes_embedded_quotes() {
        assert_eq!(
            sudo_command(None, "echo 'flush_all' | nc -q1 localhost 11211"),
            "sudo sh -c 'echo '\\''flush_all'\\'' | nc -q1 localhost 11211'"
        );
    }

    #[test]
    fn local_host_detection() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(!is_local_host("production.onepercentclub.com"));
    }

    #[test]
    fn execute_local_command_captures_output() {
        let output = execute_local_command("echo warm");
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "warm");
    }

    #[test]
    fn transient_error_matches_connection_exit() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "ssh: connect to host: Connection refused".to_string(),
            success: false,
            exit_code: 255,
        };
        assert!(is_transient_ssh_error(&output));
    }

    #[test]
    fn command_failure_is_not_transient() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "supervisorctl: command not found".to_string(),
            success: false,
            exit_code: 127,
        };
        assert!(!is_transient_ssh_error(&output));
    }
}
