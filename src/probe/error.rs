use std::io;
use thiserror::Error;

/// Faults in the probe attempt itself. A target that is closed, silent, or
/// simply not PostgreSQL is never reported through this type.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("short write: sent {written} of {expected} probe bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("failed to write probe: {0}")]
    Write(#[source] io::Error),

    #[error("failed to read response: {0}")]
    Read(#[source] io::Error),
}

impl ProbeError {
    /// Whether retrying the same target could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProbeError::ShortWrite { .. } => true,
            ProbeError::Write(err) | ProbeError::Read(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Peer-initiated teardown. These end the exchange without faulting it.
pub(crate) fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
