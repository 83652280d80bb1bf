use crate::background::{run_bg, BackgroundCommand};
use crate::env::DeployEnv;
use crate::error::{Error, Result};
use crate::shell;
use crate::ssh::{execute_local_command, CommandOutput, Transport};

/// A deploy session against one target host.
///
/// Binds a transport to the environment's deployment parameters and turns
/// every non-zero exit into a fatal error: a deploy sequence halts on the
/// first failure, with no partial-failure recovery (the operator re-runs).
pub struct Session<'a, T: Transport> {
    transport: &'a T,
    env: &'a DeployEnv,
}

impl<'a, T: Transport> Session<'a, T> {
    pub fn new(transport: &'a T, env: &'a DeployEnv) -> Self {
        Self { transport, env }
    }

    pub fn env(&self) -> &DeployEnv {
        self.env
    }

    pub fn transport(&self) -> &T {
        self.transport
    }

    /// Run a command on the remote host as the connection user.
    pub fn run(&self, command: &str) -> Result<CommandOutput> {
        check_remote(command, self.transport.run(command))
    }

    /// Run a command on the remote host as root.
    pub fn sudo(&self, command: &str) -> Result<CommandOutput> {
        check_remote(command, self.transport.sudo(None, command))
    }

    /// Run a command on the remote host as the web user.
    pub fn run_web(&self, command: &str) -> Result<CommandOutput> {
        let user = self.env.require_web_user()?;
        check_remote(command, self.transport.sudo(Some(user), command))
    }

    /// Run a command on the machine initiating the deploy.
    pub fn local(&self, command: &str) -> Result<CommandOutput> {
        let output = execute_local_command(command);
        if !output.success {
            return Err(Error::LocalCommandFailed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    pub fn put(&self, local_path: &str, remote_path: &str) -> Result<CommandOutput> {
        check_remote(
            &format!("put {} -> {}", local_path, remote_path),
            self.transport.put(local_path, remote_path),
        )
    }

    pub fn exists(&self, path: &str) -> bool {
        self.transport.exists(path)
    }

    /// Launch a command detached from this session (fire-and-forget).
    pub fn run_bg(&self, command: &str) -> Result<CommandOutput> {
        run_bg(self.transport, command)
    }

    pub fn spawn_bg(&self, command: BackgroundCommand) -> Result<CommandOutput> {
        command.spawn(self.transport)
    }

    // Scoping helpers. Remote working directory and shell environment do not
    // persist across SSH round-trips, so a scope is a single composed line.

    /// Scope a command to the project directory.
    pub fn in_directory(&self, command: &str) -> Result<String> {
        let directory = self.env.require_directory()?;
        Ok(shell::and_then([
            format!("cd {}", shell::quote_path(directory)).as_str(),
            command,
        ]))
    }

    /// Scope a command to the project directory with the virtualenv active.
    pub fn in_virtualenv(&self, command: &str) -> Result<String> {
        let directory = self.env.require_directory()?;
        Ok(shell::and_then([
            format!("cd {}", shell::quote_path(directory)).as_str(),
            format!("source {}/bin/activate", self.env.virtualenv_dir_name).as_str(),
            command,
        ]))
    }

    /// Scope a command to the frontend subdirectory.
    pub fn in_frontend(&self, command: &str) -> Result<String> {
        let directory = self.env.require_directory()?;
        Ok(shell::and_then([
            format!("cd {}", shell::quote_path(&format!("{}/frontend", directory))).as_str(),
            command,
        ]))
    }
}

fn check_remote(command: &str, output: CommandOutput) -> Result<CommandOutput> {
    if !output.success {
        return Err(Error::RemoteCommandFailed {
            command: command.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::testing::RecordingTransport;

    fn env() -> DeployEnv {
        DeployEnv {
            host: "staging.onepercentclub.com".to_string(),
            user: "deploy".to_string(),
            directory: Some("/var/www/reef".to_string()),
            web_user: Some("onepercent".to_string()),
            service_name: Some("reef".to_string()),
            ..DeployEnv::default()
        }
    }

    #[test]
    fn run_web_dispatches_sudo_as_web_user() {
        let transport = RecordingTransport::new();
        let env = env();
        let session = Session::new(&transport, &env);

        session.run_web("git fetch -q -p").unwrap();

        assert_eq!(
            transport.sudo_calls(),
            vec![(Some("onepercent".to_string()), "git fetch -q -p".to_string())]
        );
        assert!(transport.run_calls().is_empty());
    }

    #[test]
    fn run_web_requires_web_user() {
        let transport = RecordingTransport::new();
        let env = DeployEnv::default();
        let session = Session::new(&transport, &env);

        let err = session.run_web("ls").unwrap_err();
        assert_eq!(err.code(), "config.missing_key");
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn in_directory_composes_single_line() {
        let transport = RecordingTransport::new();
        let env = env();
        let session = Session::new(&transport, &env);

        assert_eq!(
            session.in_directory("git reset --hard").unwrap(),
            "cd '/var/www/reef' && git reset --hard"
        );
    }

    #[test]
    fn in_virtualenv_activates_before_command() {
        let transport = RecordingTransport::new();
        let env = env();
        let session = Session::new(&transport, &env);

        assert_eq!(
            session.in_virtualenv("./manage.py compilepo").unwrap(),
            "cd '/var/www/reef' && source env/bin/activate && ./manage.py compilepo"
        );
    }

    #[test]
    fn in_frontend_targets_subdirectory() {
        let transport = RecordingTransport::new();
        let env = env();
        let session = Session::new(&transport, &env);

        assert_eq!(
            session.in_frontend("npm install").unwrap(),
            "cd '/var/www/reef/frontend' && npm install"
        );
    }

    #[test]
    fn scoping_without_directory_is_fatal() {
        let transport = RecordingTransport::new();
        let env = DeployEnv::default();
        let session = Session::new(&transport, &env);

        let err = session.in_directory("ls").unwrap_err();
        assert_eq!(err.code(), "config.missing_key");
    }
}
