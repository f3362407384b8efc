//! Transport authentication for clone and push.

use anyhow::Result;
use git2::{CertificateCheckStatus, Cred, CredentialType, RemoteCallbacks};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ErrorKind, failure};

/// Credentials selected once per run from configuration.
#[derive(Clone, PartialEq, Eq)]
pub enum GitCredentials {
    /// Passphrase protected private key.
    Ssh {
        passphrase: String,
        private_key: PathBuf,
        username: String,
    },
    /// Basic authentication over HTTP(S).
    Http { username: String, password: String },
}

impl GitCredentials {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Ssh { .. } => TransportKind::Ssh,
            Self::Http { .. } => TransportKind::Http,
        }
    }
}

impl fmt::Debug for GitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh {
                private_key,
                username,
                ..
            } => f
                .debug_struct("Ssh")
                .field("passphrase", &"<redacted>")
                .field("private_key", private_key)
                .field("username", username)
                .finish(),
            Self::Http { username, .. } => f
                .debug_struct("Http")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Transport family of a remote or a credential set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Ssh,
    Http,
    Local,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ssh => "ssh",
            Self::Http => "http",
            Self::Local => "local",
        })
    }
}

/// Scheme of a remote URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteScheme {
    /// `ssh://` or scp-like `user@host:path`.
    Ssh,
    /// `http://` or `https://`.
    Http,
    /// `file://` or a filesystem path.
    Local,
    Unknown,
}

impl RemoteScheme {
    /// Classifies a remote URI.
    pub fn detect(uri: &str) -> Self {
        let lower = uri.to_ascii_lowercase();
        if lower.starts_with("ssh://") || lower.starts_with("git+ssh://") {
            return Self::Ssh;
        }
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Self::Http;
        }
        if lower.starts_with("file://") {
            return Self::Local;
        }
        if uri.contains("://") {
            return Self::Unknown;
        }
        if is_scp_like(uri) {
            return Self::Ssh;
        }
        if uri.starts_with('/') || uri.starts_with('.') || Path::new(uri).is_absolute() {
            return Self::Local;
        }
        Self::Unknown
    }

    pub fn transport_kind(self) -> Option<TransportKind> {
        match self {
            Self::Ssh => Some(TransportKind::Ssh),
            Self::Http => Some(TransportKind::Http),
            Self::Local => Some(TransportKind::Local),
            Self::Unknown => None,
        }
    }
}

/// `user@host:path`, with no slash before the colon.
fn is_scp_like(uri: &str) -> bool {
    let Some((authority, path)) = uri.split_once(':') else {
        return false;
    };
    let Some((user, host)) = authority.split_once('@') else {
        return false;
    };
    !user.is_empty() && !host.is_empty() && !path.is_empty() && !authority.contains('/')
}

/// Authentication capability consumed by clone and push.
pub trait GitTransport {
    fn kind(&self) -> TransportKind;

    /// Builds the callbacks for one remote operation.
    ///
    /// Credentials are offered once; a repeated request from the remote
    /// fails the operation instead of retrying.
    fn callbacks(&self) -> RemoteCallbacks<'_>;
}

/// Session user info for SSH, answering every interactive request with a
/// refusal. Only the key passphrase is ever supplied.
#[derive(Clone, PartialEq, Eq)]
pub struct SshUserInfo {
    passphrase: String,
}

impl SshUserInfo {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    pub fn password(&self) -> Option<&str> {
        None
    }

    pub fn prompt_password(&self, _message: &str) -> bool {
        false
    }

    pub fn prompt_passphrase(&self, _message: &str) -> bool {
        false
    }

    pub fn prompt_yes_no(&self, _message: &str) -> bool {
        false
    }

    pub fn show_message(&self, message: &str) {
        debug!(message, "Discarded ssh session message");
    }
}

impl fmt::Debug for SshUserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshUserInfo")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// SSH transport authenticating with a passphrase protected key.
#[derive(Debug, Clone)]
pub struct SshTransport {
    user_info: SshUserInfo,
    private_key: PathBuf,
    username: String,
}

impl SshTransport {
    pub fn new(
        user_info: SshUserInfo,
        private_key: impl Into<PathBuf>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            user_info,
            private_key: private_key.into(),
            username: username.into(),
        }
    }

    pub fn user_info(&self) -> &SshUserInfo {
        &self.user_info
    }
}

impl GitTransport for SshTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0u32;
        callbacks.credentials(move |url, username_from_url, allowed| {
            let username = username_from_url.unwrap_or(self.username.as_str());
            if allowed.contains(CredentialType::USERNAME) {
                return Cred::username(username);
            }
            attempts += 1;
            if attempts > 1 {
                warn!(url, "Remote rejected ssh key");
                return Err(git2::Error::from_str("ssh key was rejected by the remote"));
            }
            if !allowed.contains(CredentialType::SSH_KEY) {
                return Err(git2::Error::from_str("remote does not accept ssh keys"));
            }
            debug!(url, username, key = %self.private_key.display(), "Offering ssh key");
            Cred::ssh_key(
                username,
                None,
                &self.private_key,
                Some(self.user_info.passphrase()),
            )
        });
        // Host keys are checked against known_hosts by libgit2; an unknown
        // host fails rather than asking.
        callbacks.certificate_check(move |_cert, host| {
            self.user_info
                .show_message(&format!("checking host key of {}", host));
            Ok(CertificateCheckStatus::CertificatePassthrough)
        });
        callbacks
    }
}

/// HTTP(S) transport with basic authentication.
#[derive(Clone)]
pub struct HttpTransport {
    username: String,
    password: String,
}

impl HttpTransport {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl GitTransport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0u32;
        callbacks.credentials(move |url, _username_from_url, allowed| {
            attempts += 1;
            if attempts > 1 {
                warn!(url, username = %self.username, "Remote rejected http credentials");
                return Err(git2::Error::from_str("http credentials were rejected by the remote"));
            }
            if !allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Err(git2::Error::from_str("remote does not accept username/password"));
            }
            Cred::userpass_plaintext(&self.username, &self.password)
        });
        callbacks
    }
}

/// Credential free transport for `file://` and path remotes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl GitTransport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        RemoteCallbacks::new()
    }
}

/// Builds the transport for `uri` from the configured credentials.
///
/// # Errors
///
/// Returns an auth mismatch failure when the credential kind disagrees with
/// the URI scheme.
pub fn transport_for(credentials: &GitCredentials, uri: &str) -> Result<Box<dyn GitTransport>> {
    let scheme = RemoteScheme::detect(uri);
    let requested = credentials.kind();
    if scheme.transport_kind() != Some(requested) {
        return Err(failure(
            ErrorKind::AuthMismatch,
            format!(
                "{} credentials cannot be used with remote {} ({:?} scheme)",
                requested, uri, scheme
            ),
        ));
    }

    Ok(match credentials {
        GitCredentials::Ssh {
            passphrase,
            private_key,
            username,
        } => Box::new(SshTransport::new(
            SshUserInfo::new(passphrase.clone()),
            private_key.clone(),
            username.clone(),
        )),
        GitCredentials::Http { username, password } => {
            Box::new(HttpTransport::new(username.clone(), password.clone()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;

    fn ssh_credentials() -> GitCredentials {
        GitCredentials::Ssh {
            passphrase: "secret".to_string(),
            private_key: PathBuf::from("/home/blog/.ssh/id_rsa"),
            username: "git".to_string(),
        }
    }

    fn http_credentials() -> GitCredentials {
        GitCredentials::Http {
            username: "blog".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn test_detect_schemes() {
        assert_eq!(RemoteScheme::detect("ssh://git@example.com/site.git"), RemoteScheme::Ssh);
        assert_eq!(RemoteScheme::detect("git@github.com:blog/site.git"), RemoteScheme::Ssh);
        assert_eq!(RemoteScheme::detect("https://example.com/site.git"), RemoteScheme::Http);
        assert_eq!(RemoteScheme::detect("HTTP://example.com/site.git"), RemoteScheme::Http);
        assert_eq!(RemoteScheme::detect("file:///srv/site.git"), RemoteScheme::Local);
        assert_eq!(RemoteScheme::detect("/srv/site.git"), RemoteScheme::Local);
        assert_eq!(RemoteScheme::detect("ftp://example.com/site.git"), RemoteScheme::Unknown);
        assert_eq!(RemoteScheme::detect("site.git"), RemoteScheme::Unknown);
    }

    #[test]
    fn test_scp_like_requires_user_and_path() {
        assert!(is_scp_like("git@host:repo.git"));
        assert!(!is_scp_like("host:repo.git"), "User part is required");
        assert!(!is_scp_like("git@host:"), "Path part is required");
        assert!(!is_scp_like("dir/git@host:repo"), "Slash before colon is a path");
    }

    #[test]
    fn test_transport_for_matching_schemes() {
        // Act
        let ssh = transport_for(&ssh_credentials(), "git@github.com:blog/site.git")
            .expect("ssh transport");
        let http = transport_for(&http_credentials(), "https://example.com/site.git")
            .expect("http transport");

        // Assert
        assert_eq!(ssh.kind(), TransportKind::Ssh);
        assert_eq!(http.kind(), TransportKind::Http);
    }

    #[test]
    fn test_transport_for_ssh_on_http_uri_is_auth_mismatch() {
        // Act
        let err = transport_for(&ssh_credentials(), "https://example.com/site.git")
            .err()
            .expect("should fail");

        // Assert
        assert_eq!(kind_of(&err), Some(ErrorKind::AuthMismatch));
    }

    #[test]
    fn test_transport_for_http_on_ssh_uri_is_auth_mismatch() {
        // Act
        let err = transport_for(&http_credentials(), "ssh://git@example.com/site.git")
            .err()
            .expect("should fail");

        // Assert
        assert_eq!(kind_of(&err), Some(ErrorKind::AuthMismatch));
    }

    #[test]
    fn test_ssh_user_info_never_prompts() {
        // Arrange
        let info = SshUserInfo::new("passphrase");

        // Act & Assert
        assert_eq!(info.passphrase(), "passphrase");
        assert_eq!(info.password(), None);
        assert!(!info.prompt_password("Password for git@host"));
        assert!(!info.prompt_passphrase("Passphrase for id_rsa"));
        assert!(!info.prompt_yes_no("The authenticity of host can't be established"));
        info.show_message("Welcome");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        // Act
        let ssh = format!("{:?}", ssh_credentials());
        let http = format!("{:?}", http_credentials());
        let transport = format!("{:?}", HttpTransport::new("blog", "hunter2"));

        // Assert
        assert!(!ssh.contains("secret"), "Passphrase should be redacted");
        assert!(!http.contains("secret"), "Password should be redacted");
        assert!(!transport.contains("hunter2"), "Password should be redacted");
        assert!(http.contains("blog"), "Username is not secret");
    }
}
