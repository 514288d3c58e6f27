//! Error taxonomy shared by every crate in the workspace

use std::path::PathBuf;

/// Errors raised while building games, learning or persisting runs
#[derive(Debug, thiserror::Error)]
pub enum NashError {
    /// Bad game shape, missing payoff function, invalid configuration.
    /// Detected before the first iteration.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// Cumulative-distribution inversion failed on every attempt
    #[error("could not sample a strategy after {attempts} attempts")]
    SamplingFailure { attempts: usize },

    /// A probability row lost all of its positive mass
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Checkpoint read or write failed
    #[error("checkpoint I/O failed for {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Text game format could not be parsed
    #[error("malformed input at line {line}: {reason}")]
    MalformedInput { line: usize, reason: String },
}

impl NashError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        NashError::PreconditionViolation(msg.into())
    }

    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        NashError::MalformedInput {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NashError::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// True for errors that must halt a run
    ///
    /// Checkpoint writes are the only failures a run survives, and the
    /// engines handle those before they reach the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NashError::IoFailure { .. })
    }
}

/// Result alias used throughout the workspace
pub type Result<T> = std::result::Result<T, NashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = NashError::precondition("game needs at least 2 players");
        assert_eq!(
            err.to_string(),
            "precondition violated: game needs at least 2 players"
        );

        let err = NashError::malformed(3, "expected 2 values per cell");
        assert_eq!(
            err.to_string(),
            "malformed input at line 3: expected 2 values per cell"
        );
    }

    #[test]
    fn test_fatality() {
        let io = NashError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(!io.is_fatal());
        assert!(NashError::SamplingFailure { attempts: 3 }.is_fatal());
        assert!(NashError::InvariantViolation("row 0".into()).is_fatal());
    }
}
