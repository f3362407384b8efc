//! Shared test utilities for integration tests.
//!
//! Builds throwaway bare remotes with the git CLI and settings pointing at
//! them, so publication can run end to end without a network or database.

use anyhow::{Result, bail};
use bookmark_site::Settings;
use bookmark_site::components::layout::FrameOptions;
use bookmark_site::config::{DatabaseSettings, GitSettings, SiteSettings};
use bookmark_site::git::{CommitAuthor, GitCredentials};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Bare repository seeded with one commit on `main`.
pub struct Remote {
    dir: TempDir,
}

impl Remote {
    /// Path of the bare repository, usable as a clone URI.
    pub fn uri(&self) -> String {
        self.bare().display().to_string()
    }

    pub fn bare(&self) -> PathBuf {
        self.dir.path().join("remote.git")
    }

    /// Scratch directory that lives as long as the remote.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Reads `path` at the tip of `main`.
    pub fn read_file(&self, path: &str) -> Result<String> {
        let object = format!("main:{}", path);
        git_at_bare(&self.bare(), &["show", &object])
    }

    /// Lists files at the tip of `main`.
    pub fn files(&self) -> Result<Vec<String>> {
        let output = git_at_bare(&self.bare(), &["ls-tree", "-r", "--name-only", "main"])?;
        Ok(output.lines().map(str::to_string).collect())
    }

    /// Number of commits reachable from `main`.
    pub fn commit_count(&self) -> Result<usize> {
        let output = git_at_bare(&self.bare(), &["rev-list", "--count", "main"])?;
        Ok(output.trim().parse()?)
    }

    /// Pushes an unrelated commit to `main` from a separate clone.
    pub fn push_foreign_commit(&self, file: &str) -> Result<()> {
        let clone = self.dir.path().join(format!("foreign-{}", file));
        git(self.dir.path(), &["clone", &self.uri(), &clone.display().to_string()])?;
        write_file(&clone, file, "foreign\n")?;
        git(&clone, &["add", "."])?;
        git(&clone, &["commit", "-m", "Foreign commit"])?;
        git(&clone, &["push", "origin", "main"])?;
        Ok(())
    }
}

/// Creates a bare remote whose `main` holds a single README commit.
///
/// # Errors
///
/// Returns error if any git command fails
pub fn create_remote() -> Result<Remote> {
    let dir = TempDir::new()?;
    let seed = dir.path().join("seed");
    std::fs::create_dir_all(&seed)?;

    git(&seed, &["init"])?;
    write_file(&seed, "README.md", "# Bookmarks\n")?;
    git(&seed, &["add", "."])?;
    git(&seed, &["commit", "-m", "Initial commit"])?;
    git(&seed, &["branch", "-M", "main"])?;
    git(
        dir.path(),
        &["clone", "--bare", "seed", "remote.git"],
    )?;

    Ok(Remote { dir })
}

/// Settings for publishing into `remote` through a local clone.
///
/// The credentials are never used by local transports.
pub fn settings(remote: &Remote, clone_dir: &Path) -> Settings {
    Settings {
        git: GitSettings {
            uri: remote.uri(),
            clone_dir: clone_dir.to_path_buf(),
            credentials: GitCredentials::Http {
                username: "test".to_string(),
                password: "test".to_string(),
            },
            author: CommitAuthor::new("Test User", "test@example.com"),
            commit_message: "Site regenerated at {timestamp}".to_string(),
        },
        site: SiteSettings {
            content_dir: PathBuf::new(),
            time_zone: Tz::UTC,
        },
        database: DatabaseSettings {
            url: "postgres://unused".to_string(),
            fetch_size: 100,
        },
        blog: FrameOptions::default(),
    }
}

/// Runs git in `dir` with a fixed identity and returns stdout.
///
/// # Errors
///
/// Returns error if git exits with a failure status
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()?;

    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(String::from_utf8(output.stdout)?)
}

fn git_at_bare(bare: &Path, args: &[&str]) -> Result<String> {
    let git_dir = format!("--git-dir={}", bare.display());
    let mut full = vec![git_dir.as_str()];
    full.extend_from_slice(args);
    git(bare, &full)
}

/// Writes file to repository, creating parent directories as needed.
///
/// # Errors
///
/// Returns error if directory creation or file write fails
pub fn write_file(repo_path: &Path, path: &str, content: &str) -> Result<()> {
    let file_path = repo_path.join(path);
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(file_path, content)?;
    Ok(())
}
