/// Macro for prefixed status logging to stderr (only when stderr is a terminal).
///
/// Usage:
/// ```ignore
/// log_status!("scm", "Updating git repository to {}", commit);
/// log_status!("db", "Backing up database {}", db_name);
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        if ::std::io::IsTerminal::is_terminal(&::std::io::stderr()) {
            eprintln!(concat!("[", $prefix, "] {}"), format_args!($($arg)*));
        }
    };
}

pub mod background;
pub mod db;
pub mod django;
pub mod env;
pub mod error;
pub mod prompt;
pub mod scm;
pub mod session;
pub mod shell;
pub mod ssh;
pub mod system;

// Re-export the types every deploy task touches
pub use background::{run_bg, BackgroundCommand, Dispatch};
pub use env::DeployEnv;
pub use error::{Error, Result};
pub use prompt::PromptEngine;
pub use session::Session;
pub use ssh::{CommandOutput, SshClient, Transport};
