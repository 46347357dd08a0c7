use thiserror::Error;

/// Connectivity failures.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("timed out waiting for vehicle heartbeat")]
    Timeout,
    #[error("transport could not be opened: {0}")]
    Refused(String),
    #[error("link is closed")]
    Closed,
}

/// Decode/validation failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unknown mode '{0}'")]
    UnknownMode(String),
}

/// Command-level failures reported by the vehicle side. Most commands are
/// fire-and-forget, so these are best-effort.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("vehicle is not armed")]
    NotArmed,
    #[error("command rejected by vehicle")]
    Rejected,
}
