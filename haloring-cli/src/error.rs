//! CLI error handling.

use std::fmt;
use std::process;

use haloring::board::pgm::PgmError;
use haloring::controller::ControllerError;

/// CLI-level errors with user-facing messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialise logging
    LoggingInit(std::io::Error),
    /// Failed to bind the listen port
    Bind { port: u16, error: std::io::Error },
    /// The server loop died
    Serve(std::io::Error),
    /// Failed to read the initial board
    Image { path: String, error: PgmError },
    /// The controller session failed
    Controller(ControllerError),
}

impl CliError {
    /// Prints the error and exits nonzero.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Bind { port, .. } = self {
            eprintln!();
            eprintln!("Is another broker or worker already listening on port {port}?");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "failed to initialise logging: {e}"),
            CliError::Bind { port, error } => write!(f, "failed to bind port {port}: {error}"),
            CliError::Serve(e) => write!(f, "server error: {e}"),
            CliError::Image { path, error } => {
                write!(f, "failed to read board image '{path}': {error}")
            }
            CliError::Controller(e) => write!(f, "controller failed: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) | CliError::Serve(e) => Some(e),
            CliError::Bind { error, .. } => Some(error),
            CliError::Image { error, .. } => Some(error),
            CliError::Controller(e) => Some(e),
        }
    }
}
