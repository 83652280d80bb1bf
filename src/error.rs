use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required configuration key: {key}")]
    MissingConfig { key: String },

    #[error("Invalid configuration at {path}: {message}")]
    InvalidConfig { path: String, message: String },

    #[error("Empty command")]
    EmptyCommand,

    #[error("SSH identity file not found: {path}")]
    IdentityFileNotFound { path: String },

    #[error("Remote command failed with exit code {exit_code}: {command}")]
    RemoteCommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Local command failed with exit code {exit_code}: {command}")]
    LocalCommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to install {tool}: {stderr}")]
    ToolInstallFailed { tool: String, stderr: String },

    #[error("Git command failed: {0}")]
    Git(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn missing_config(key: impl Into<String>) -> Self {
        Error::MissingConfig { key: key.into() }
    }

    pub fn invalid_config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the task runner's error reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingConfig { .. } => "config.missing_key",
            Error::InvalidConfig { .. } => "config.invalid_value",
            Error::EmptyCommand => "validation.empty_command",
            Error::IdentityFileNotFound { .. } => "ssh.identity_file_not_found",
            Error::RemoteCommandFailed { .. } => "remote.command_failed",
            Error::LocalCommandFailed { .. } => "local.command_failed",
            Error::ToolInstallFailed { .. } => "remote.tool_install_failed",
            Error::Git(_) => "git.command_failed",
            Error::Io(_) => "internal.io_error",
            Error::Json(_) => "internal.json_error",
        }
    }
}
