mod client;

pub use client::{execute_local_command, is_local_host, CommandOutput, SshClient};

/// Remote-execution seam.
///
/// Every operation in this crate dispatches shell commands through this trait
/// so tests can substitute a recording double for a live SSH connection.
pub trait Transport {
    /// Run a command as the connection user.
    fn run(&self, command: &str) -> CommandOutput;

    /// Run a command under sudo, optionally as a specific user.
    fn sudo(&self, user: Option<&str>, command: &str) -> CommandOutput;

    /// Whether a path exists on the remote host.
    fn exists(&self, path: &str) -> bool;

    /// Copy a local file to a remote path.
    fn put(&self, local_path: &str, remote_path: &str) -> CommandOutput;
}

impl Transport for SshClient {
    fn run(&self, command: &str) -> CommandOutput {
        self.execute(command)
    }

    fn sudo(&self, user: Option<&str>, command: &str) -> CommandOutput {
        self.execute_sudo(user, command)
    }

    fn exists(&self, path: &str) -> bool {
        self.path_exists(path)
    }

    fn put(&self, local_path: &str, remote_path: &str) -> CommandOutput {
        self.upload_file(local_path, remote_path)
    }
}
