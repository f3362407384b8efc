//! Git publication: authenticated transports and the working copy that is
//! cloned, staged, committed and pushed on every run.

mod transport;
mod working_copy;

pub use transport::{
    GitCredentials, GitTransport, HttpTransport, LocalTransport, RemoteScheme, SshTransport,
    SshUserInfo, TransportKind, transport_for,
};
pub use working_copy::{CommitAuthor, CopyState, ORIGIN, WorkingCopy};
