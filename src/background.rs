//! Detached background command execution.
//!
//! Long-running commands (cache warming, endpoint pings after a restart)
//! must survive the end of the invoking SSH session. Each launch is wrapped
//! in `dtach` bound to a unique temp socket, so the deploy task returns as
//! soon as the detach starts and the command keeps running on the host.

use crate::error::{Error, Result};
use crate::ssh::{CommandOutput, Transport};

/// Where the detach tool lives once installed.
pub const DTACH_PATH: &str = "/usr/bin/dtach";

const DTACH_INSTALL: &str = "apt-get install dtach";

pub const DEFAULT_SOCKNAME: &str = "dtach";

/// Which execution path a detached launch is dispatched through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    #[default]
    Normal,
    Elevated,
}

/// A command to run detached on the remote host.
///
/// ```ignore
/// BackgroundCommand::new("./warm.sh")
///     .before("export FOO=1")
///     .sockname("warm")
///     .elevated()
///     .spawn(&client)?;
/// ```
#[derive(Debug, Clone)]
pub struct BackgroundCommand {
    command: String,
    before: Option<String>,
    sockname: String,
    dispatch: Dispatch,
}

impl BackgroundCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            before: None,
            sockname: DEFAULT_SOCKNAME.to_string(),
            dispatch: Dispatch::Normal,
        }
    }

    /// Setup command chained in front of the detach, e.g. exporting an
    /// environment variable. It has to share the shell invocation with the
    /// detach: environment state does not persist across remote calls.
    pub fn before(mut self, setup: impl Into<String>) -> Self {
        self.before = Some(setup.into());
        self
    }

    /// Label used to namespace the temp socket file.
    pub fn sockname(mut self, sockname: impl Into<String>) -> Self {
        self.sockname = sockname.into();
        self
    }

    /// Dispatch through the privilege-elevated path.
    pub fn elevated(mut self) -> Self {
        self.dispatch = Dispatch::Elevated;
        self
    }

    /// The single shell line sent to the host.
    pub fn shell_line(&self) -> String {
        let launch = format!(
            "dtach -n `mktemp -u /tmp/{}.XXXX` {}",
            self.sockname, self.command
        );
        match &self.before {
            Some(setup) => format!("{}; {}", setup, launch),
            None => launch,
        }
    }

    /// Launch the command detached. The returned output is that of starting
    /// the detach; the background command's eventual completion is
    /// intentionally unobserved.
    pub fn spawn<T: Transport>(&self, transport: &T) -> Result<CommandOutput> {
        if self.command.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }

        ensure_dtach(transport)?;

        let line = self.shell_line();
        let output = match self.dispatch {
            Dispatch::Normal => transport.run(&line),
            Dispatch::Elevated => transport.sudo(None, &line),
        };

        if !output.success {
            return Err(Error::RemoteCommandFailed {
                command: line,
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}

/// Run a command in the background with default socket label and dispatch.
pub fn run_bg<T: Transport>(transport: &T, command: &str) -> Result<CommandOutput> {
    BackgroundCommand::new(command).spawn(transport)
}

/// Install dtach if it is not already present.
///
/// The check-then-install is not atomic; concurrent callers may both reach
/// the install. Installing twice is idempotent, so the race only costs an
/// extra package-manager round-trip.
fn ensure_dtach<T: Transport>(transport: &T) -> Result<()> {
    if transport.exists(DTACH_PATH) {
        return Ok(());
    }

    log_status!("bg", "dtach not found, installing");
    let output = transport.sudo(None, DTACH_INSTALL);
    if !output.success {
        return Err(Error::ToolInstallFailed {
            tool: "dtach".to_string(),
            stderr: output.stderr,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::testing::{Call, RecordingTransport};

    #[test]
    fn shell_line_without_setup() {
        let line = BackgroundCommand::new("sleep 60").shell_line();
        assert_eq!(line, "dtach -n `mktemp -u /tmp/dtach.XXXX` sleep 60");
        assert_eq!(line.matches("dtach -n").count(), 1);
    }

    #[test]
    fn shell_line_uses_sockname_as_temp_pattern() {
        let line = BackgroundCommand::new("./warm.sh")
            .sockname("warm")
            .shell_line();
        assert!(line.contains("mktemp -u /tmp/warm.XXXX"));
        assert!(line.ends_with("./warm.sh"));
    }

    #[test]
    fn setup_is_chained_before_the_detach() {
        let line = BackgroundCommand::new("./warm.sh")
            .before("export FOO=1")
            .shell_line();
        assert_eq!(
            line,
            "export FOO=1; dtach -n `mktemp -u /tmp/dtach.XXXX` ./warm.sh"
        );
    }

    #[test]
    fn run_bg_dispatches_once_through_normal_path() {
        let transport = RecordingTransport::new();
        run_bg(&transport, "sleep 60").unwrap();

        let runs = transport.run_calls();
        assert_eq!(runs, vec!["dtach -n `mktemp -u /tmp/dtach.XXXX` sleep 60"]);
        assert!(transport.sudo_calls().is_empty());
    }

    #[test]
    fn elevated_spawn_dispatches_once_through_sudo_path() {
        let transport = RecordingTransport::new();
        BackgroundCommand::new("./warm.sh")
            .before("export FOO=1")
            .sockname("warm")
            .elevated()
            .spawn(&transport)
            .unwrap();

        assert!(transport.run_calls().is_empty());
        assert_eq!(
            transport.sudo_calls(),
            vec![(
                None,
                "export FOO=1; dtach -n `mktemp -u /tmp/warm.XXXX` ./warm.sh".to_string()
            )]
        );
    }

    #[test]
    fn presence_check_precedes_every_launch() {
        let transport = RecordingTransport::new();
        run_bg(&transport, "sleep 60").unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0], Call::Exists(DTACH_PATH.to_string()));
        assert!(matches!(calls[1], Call::Run(_)));
    }

    #[test]
    fn missing_tool_is_installed_exactly_once_before_launch() {
        let transport = RecordingTransport::without_dtach();
        run_bg(&transport, "sleep 60").unwrap();

        let calls = transport.calls();
        assert_eq!(
            calls,
            vec![
                Call::Exists(DTACH_PATH.to_string()),
                Call::Sudo(None, DTACH_INSTALL.to_string()),
                Call::Run("dtach -n `mktemp -u /tmp/dtach.XXXX` sleep 60".to_string()),
            ]
        );
    }

    #[test]
    fn failed_install_aborts_before_launch() {
        let transport = RecordingTransport::without_dtach();
        transport.fail_sudo.set(true);

        let err = run_bg(&transport, "sleep 60").unwrap_err();
        assert_eq!(err.code(), "remote.tool_install_failed");
        assert!(transport.run_calls().is_empty());
    }

    #[test]
    fn empty_command_is_rejected() {
        let transport = RecordingTransport::new();
        let err = run_bg(&transport, "  ").unwrap_err();
        assert_eq!(err.code(), "validation.empty_command");
        assert!(transport.calls().is_empty());
    }
}
