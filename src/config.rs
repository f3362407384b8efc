//! Command line and file configuration.
//!
//! The YAML file is deserialized into [`FileConfig`], secrets are overlaid
//! from the environment and the result is validated into [`Settings`]
//! before anything touches the network or the disk.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

use crate::components::layout::FrameOptions;
use crate::error::{ErrorKind, Failure, failure};
use crate::git::{CommitAuthor, GitCredentials};
use crate::source::DEFAULT_FETCH_SIZE;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "bookmark-site.yaml";
/// Default commit message template.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Site regenerated at {timestamp}";

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_SSH_PASSWORD: &str = "GIT_SSH_PASSWORD";
pub const ENV_HTTP_USERNAME: &str = "GIT_HTTP_USERNAME";
pub const ENV_HTTP_PASSWORD: &str = "GIT_HTTP_PASSWORD";

/// Command line arguments for bookmark-site.
#[derive(Debug, Clone, Parser)]
#[command(name = "bookmark-site", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Local clone directory, overrides git.localCloneDirectory
    #[arg(long)]
    pub clone_dir: Option<PathBuf>,

    /// IANA time zone for month and day grouping, overrides site.timeZone
    #[arg(long)]
    pub time_zone: Option<String>,
}

impl Cli {
    /// Parses arguments from the command line.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// Raw contents of the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
    pub git: GitSection,
    pub site: SiteSection,
    pub database: DatabaseSection,
    pub blog: BlogSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GitSection {
    pub uri: Option<String>,
    pub local_clone_directory: Option<PathBuf>,
    pub ssh: SshSection,
    pub http: HttpSection,
    pub author: AuthorSection,
    pub commit_message: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SshSection {
    pub enabled: bool,
    /// Passphrase of the private key.
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub username: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpSection {
    pub enabled: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthorSection {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteSection {
    pub content_directory: Option<PathBuf>,
    pub time_zone: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub fetch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlogSection {
    pub title: Option<String>,
    pub stylesheet: Option<String>,
    pub templates: TemplatesSection,
}

/// Template resource names, kept for compatibility with older files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplatesSection {
    pub daily: Option<String>,
    pub index: Option<String>,
    pub monthly: Option<String>,
    pub frame: Option<String>,
    pub charset: Option<String>,
}

impl fmt::Debug for SshSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSection")
            .field("enabled", &self.enabled)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("username", &self.username)
            .finish()
    }
}

impl fmt::Debug for HttpSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSection")
            .field("enabled", &self.enabled)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for DatabaseSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSection")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("fetch_size", &self.fetch_size)
            .finish()
    }
}

impl FileConfig {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns a config failure if the document is not valid YAML or has
    /// values of the wrong type.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .context(Failure::new(ErrorKind::Config, "invalid configuration file"))
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path).context(Failure::new(
            ErrorKind::Config,
            format!("cannot read configuration file {}", path.display()),
        ))?;
        let config = Self::from_yaml(&yaml)?;
        info!(config_path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Applies command line overrides.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.clone_dir {
            self.git.local_clone_directory = Some(dir.clone());
        }
        if let Some(tz) = &cli.time_zone {
            self.site.time_zone = Some(tz.clone());
        }
        self
    }
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub git: GitSettings,
    pub site: SiteSettings,
    pub database: DatabaseSettings,
    pub blog: FrameOptions,
}

#[derive(Debug, Clone)]
pub struct GitSettings {
    pub uri: String,
    pub clone_dir: PathBuf,
    pub credentials: GitCredentials,
    pub author: CommitAuthor,
    /// Message template; `{timestamp}` is replaced at commit time.
    pub commit_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSettings {
    /// Page directory relative to the working copy root.
    pub content_dir: PathBuf,
    pub time_zone: Tz,
}

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub url: String,
    pub fetch_size: usize,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &"<redacted>")
            .field("fetch_size", &self.fetch_size)
            .finish()
    }
}

impl Settings {
    /// Loads the file named on the command line, overlays the process
    /// environment and validates the result.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = FileConfig::load(&cli.config)?.with_overrides(cli);
        Self::from_file_config(file, |name| std::env::var(name).ok())
    }

    /// Validates `file`, reading secrets through `env` first.
    ///
    /// An empty environment variable falls back to the file value. HTTP
    /// credentials only need to be present; the passphrase and database URL
    /// must also be non-empty.
    ///
    /// # Errors
    ///
    /// Returns a config failure for missing, contradictory or malformed
    /// values.
    pub fn from_file_config<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str, fallback: &Option<String>| {
            env(name)
                .filter(|value| !value.is_empty())
                .or_else(|| fallback.clone())
        };

        let FileConfig {
            git,
            site,
            database,
            blog,
        } = file;

        let uri = git
            .uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| failure(ErrorKind::Config, "git.uri is required"))?;

        let credentials = credentials(&git.ssh, &git.http, &lookup)?;

        let clone_dir = match git.local_clone_directory {
            Some(dir) => dir,
            None => home_dir()?.join("blog-clone"),
        };

        let author = CommitAuthor::new(
            git.author
                .name
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
            git.author
                .email
                .unwrap_or_else(|| format!("{}@localhost", env!("CARGO_PKG_NAME"))),
        );

        let content_dir = site.content_directory.unwrap_or_default();
        check_content_dir(&content_dir)?;

        let time_zone = match site.time_zone.as_deref() {
            Some(name) => parse_time_zone(name)?,
            None => Tz::UTC,
        };

        let url = lookup(ENV_DATABASE_URL, &database.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                failure(
                    ErrorKind::Config,
                    format!("database.url or {} is required", ENV_DATABASE_URL),
                )
            })?;
        let fetch_size = database.fetch_size.unwrap_or(DEFAULT_FETCH_SIZE);
        if fetch_size == 0 {
            return Err(failure(
                ErrorKind::Config,
                "database.fetchSize must be positive",
            ));
        }

        check_templates(&blog.templates)?;

        let defaults = FrameOptions::default();
        Ok(Self {
            git: GitSettings {
                uri,
                clone_dir,
                credentials,
                author,
                commit_message: git
                    .commit_message
                    .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string()),
            },
            site: SiteSettings {
                content_dir,
                time_zone,
            },
            database: DatabaseSettings { url, fetch_size },
            blog: FrameOptions {
                title: blog.title.unwrap_or(defaults.title),
                stylesheet: blog.stylesheet.or(defaults.stylesheet),
            },
        })
    }
}

/// Selects exactly one credential variant.
fn credentials<L>(ssh: &SshSection, http: &HttpSection, lookup: &L) -> Result<GitCredentials>
where
    L: Fn(&str, &Option<String>) -> Option<String>,
{
    let http_enabled = http.enabled.unwrap_or(!ssh.enabled);

    match (ssh.enabled, http_enabled) {
        (true, true) => Err(failure(
            ErrorKind::Config,
            "git.ssh.enabled and git.http.enabled are mutually exclusive",
        )),
        (false, false) => Err(failure(
            ErrorKind::Config,
            "one of git.ssh.enabled or git.http.enabled must be true",
        )),
        (true, false) => {
            let passphrase = lookup(ENV_SSH_PASSWORD, &ssh.password)
                .filter(|passphrase| !passphrase.is_empty())
                .ok_or_else(|| {
                    failure(
                        ErrorKind::Config,
                        format!(
                            "git.ssh.password or {} is required when ssh is enabled",
                            ENV_SSH_PASSWORD
                        ),
                    )
                })?;
            let private_key = match &ssh.private_key {
                Some(path) => path.clone(),
                None => home_dir()?.join(".ssh").join("id_rsa"),
            };
            Ok(GitCredentials::Ssh {
                passphrase,
                private_key,
                username: ssh.username.clone().unwrap_or_else(|| "git".to_string()),
            })
        }
        (false, true) => {
            let username = lookup(ENV_HTTP_USERNAME, &http.username).ok_or_else(|| {
                failure(
                    ErrorKind::Config,
                    format!(
                        "git.http.username or {} is required when http is enabled",
                        ENV_HTTP_USERNAME
                    ),
                )
            })?;
            let password = lookup(ENV_HTTP_PASSWORD, &http.password).ok_or_else(|| {
                failure(
                    ErrorKind::Config,
                    format!(
                        "git.http.password or {} is required when http is enabled",
                        ENV_HTTP_PASSWORD
                    ),
                )
            })?;
            Ok(GitCredentials::Http { username, password })
        }
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        failure(
            ErrorKind::Config,
            "cannot determine home directory for default paths",
        )
    })
}

fn parse_time_zone(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|_| {
        failure(
            ErrorKind::Config,
            format!("unknown time zone {:?}", name),
        )
    })
}

/// Content directory must stay inside the working copy.
fn check_content_dir(dir: &Path) -> Result<()> {
    let inside = dir
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !inside {
        return Err(failure(
            ErrorKind::Config,
            format!(
                "site.contentDirectory {} must be relative to the working copy",
                dir.display()
            ),
        ));
    }
    Ok(())
}

fn check_templates(templates: &TemplatesSection) -> Result<()> {
    if let Some(charset) = &templates.charset {
        let normalized = charset.to_ascii_lowercase().replace('-', "");
        if normalized != "utf8" {
            return Err(failure(
                ErrorKind::Config,
                format!("blog.templates.charset {:?} is not supported, pages are UTF-8", charset),
            ));
        }
    }

    let named = [
        ("daily", &templates.daily),
        ("index", &templates.index),
        ("monthly", &templates.monthly),
        ("frame", &templates.frame),
    ];
    for (key, value) in named {
        if let Some(value) = value {
            warn!(key, value = %value, "Ignoring blog.templates entry, templates are built in");
        }
    }
    Ok(())
}
