//! Failure classification.
//!
//! Every fallible operation returns [`anyhow::Result`]. Where a failure is
//! first observed, a [`Failure`] is attached as context so the caller can
//! tell a rejected push from a broken template without parsing messages.

use std::fmt;

/// Category of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or contradictory configuration, raised before any I/O.
    Config,
    /// Requested transport kind disagrees with the remote URI scheme.
    AuthMismatch,
    /// Local filesystem read, write or delete failed.
    Io,
    /// Clone directory exists and could not be removed.
    DirectoryNotEmpty,
    /// Query execution or row decoding failed.
    Database,
    /// Network, authentication or protocol failure against the remote.
    Transport,
    /// Remote refused the pushed reference.
    RejectedByRemote,
    /// Page rendering failed.
    Template,
}

impl ErrorKind {
    /// Short identifier used in log lines and error output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::AuthMismatch => "auth-mismatch",
            Self::Io => "io",
            Self::DirectoryNotEmpty => "directory-not-empty",
            Self::Database => "database",
            Self::Transport => "transport",
            Self::RejectedByRemote => "rejected-by-remote",
            Self::Template => "template",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure attached to an error chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    kind: ErrorKind,
    message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// Builds an [`anyhow::Error`] carrying a [`Failure`] as its root.
pub fn failure(kind: ErrorKind, message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(Failure::new(kind, message))
}

/// Returns the kind of the outermost [`Failure`] in the chain.
///
/// Works both for failures created with [`failure`] and for failures
/// attached through `anyhow::Context`.
pub fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<Failure>().map(Failure::kind)
}
