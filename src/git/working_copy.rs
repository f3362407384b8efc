//! Local clone of the publication remote.

use anyhow::{Context, Result};
use git2::build::RepoBuilder;
use git2::{ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions, Repository};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use super::transport::GitTransport;
use crate::error::{ErrorKind, Failure, failure};

/// Remote every push goes to.
pub const ORIGIN: &str = "origin";

/// Identity recorded on generated commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Lifecycle of a working copy within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyState {
    Uninitialized,
    Clean,
    Dirty,
    Staged,
    Committed,
    Pushed,
}

/// Last completed operation; each one requires its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Cloned,
    Staged,
    Committed,
}

/// A writable clone owned exclusively by one run.
///
/// [`WorkingCopy::init`] erases the directory and clones the remote;
/// generated files are then staged, committed and pushed back to
/// [`ORIGIN`].
pub struct WorkingCopy {
    directory: PathBuf,
    uri: String,
    transport: Box<dyn GitTransport>,
    author: CommitAuthor,
    repository: Option<Repository>,
    state: CopyState,
    step: Option<Step>,
}

impl WorkingCopy {
    pub fn new(
        directory: impl Into<PathBuf>,
        uri: impl Into<String>,
        transport: Box<dyn GitTransport>,
        author: CommitAuthor,
    ) -> Self {
        Self {
            directory: directory.into(),
            uri: uri.into(),
            transport,
            author,
            repository: None,
            state: CopyState::Uninitialized,
            step: None,
        }
    }

    /// Root of the working tree.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn state(&self) -> CopyState {
        self.state
    }

    /// Deletes the local directory if present and clones the remote into it.
    ///
    /// # Errors
    ///
    /// Returns a directory-not-empty failure if the old directory cannot be
    /// removed, and a transport failure if the clone fails.
    #[instrument(skip(self), fields(uri = %self.uri, directory = %self.directory.display()))]
    pub fn init(&mut self) -> Result<()> {
        if self.directory.exists() {
            debug!("Removing previous clone");
            fs::remove_dir_all(&self.directory).context(Failure::new(
                ErrorKind::DirectoryNotEmpty,
                format!(
                    "directory {} already exists and couldn't be deleted",
                    self.directory.display()
                ),
            ))?;
        }
        if let Some(parent) = self.directory.parent() {
            fs::create_dir_all(parent).context(Failure::new(
                ErrorKind::Io,
                format!("cannot create {}", parent.display()),
            ))?;
        }

        let repository = {
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(self.transport.callbacks());
            RepoBuilder::new()
                .fetch_options(fetch)
                .clone(&self.uri, &self.directory)
                .context(Failure::new(
                    ErrorKind::Transport,
                    format!("cannot clone {}", self.uri),
                ))?
        };

        info!(transport = %self.transport.kind(), "Cloned remote");
        self.repository = Some(repository);
        self.state = CopyState::Clean;
        self.step = Some(Step::Cloned);
        Ok(())
    }

    /// Whether the working tree differs from the index or HEAD.
    pub fn is_dirty(&self) -> Result<bool> {
        let repository = self.repository()?;
        let mut options = git2::StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = repository
            .statuses(Some(&mut options))
            .context(Failure::new(ErrorKind::Io, "cannot read working tree status"))?;
        Ok(!statuses.is_empty())
    }

    /// Stages every addition, modification and deletion in the working tree.
    #[instrument(skip(self), fields(directory = %self.directory.display()))]
    pub fn stage_all(&mut self) -> Result<()> {
        if self.is_dirty()? {
            self.state = CopyState::Dirty;
        }

        let staged = {
            let repository = self.repository()?;
            let mut index = repository
                .index()
                .context(Failure::new(ErrorKind::Io, "cannot open index"))?;
            index
                .add_all(["*"], IndexAddOption::DEFAULT, None)
                .context(Failure::new(ErrorKind::Io, "cannot stage working tree"))?;
            index
                .update_all(["*"], None)
                .context(Failure::new(ErrorKind::Io, "cannot stage removed files"))?;
            index
                .write()
                .context(Failure::new(ErrorKind::Io, "cannot write index"))?;
            has_staged_changes(repository)?
        };

        self.state = if staged {
            CopyState::Staged
        } else {
            CopyState::Clean
        };
        self.step = Some(Step::Staged);
        info!(staged, "Staged working tree");
        Ok(())
    }

    /// Commits the index on the current branch.
    ///
    /// Returns the new commit id, or `None` when the index matches HEAD and
    /// nothing was committed.
    ///
    /// # Errors
    ///
    /// Returns an io failure unless [`WorkingCopy::stage_all`] ran last.
    #[instrument(skip(self, message), fields(directory = %self.directory.display()))]
    pub fn commit(&mut self, message: &str) -> Result<Option<String>> {
        self.require(Step::Staged, "commit")?;
        let oid = commit_index(self.repository()?, &self.author, message)?;
        self.step = Some(Step::Committed);
        match oid {
            Some(oid) => {
                info!(commit = %oid, "Created commit");
                self.state = CopyState::Committed;
                Ok(Some(oid.to_string()))
            }
            None => {
                info!("Nothing staged, skipping commit");
                self.state = CopyState::Clean;
                Ok(None)
            }
        }
    }

    /// Pushes the current branch to `origin`.
    ///
    /// Returns the branch name that was pushed.
    ///
    /// # Errors
    ///
    /// Returns an io failure unless [`WorkingCopy::commit`] ran last, a
    /// rejected-by-remote failure for non fast forward updates or hook
    /// rejections, and a transport failure for everything else.
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub fn push(&mut self) -> Result<String> {
        self.require(Step::Committed, "push")?;
        let repository = self.repository()?;
        let branch = current_branch(repository)?;
        let local_ref = format!("refs/heads/{}", branch);
        if repository.find_reference(&local_ref).is_err() {
            info!(branch = %branch, "Branch has no commits, nothing to push");
            self.state = CopyState::Clean;
            return Ok(branch);
        }

        let refspec = format!("{0}:{0}", local_ref);
        let rejections: RefCell<Vec<String>> = RefCell::new(Vec::new());
        {
            let mut callbacks = self.transport.callbacks();
            callbacks.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    rejections
                        .borrow_mut()
                        .push(format!("{}: {}", reference, message));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let mut remote = repository.find_remote(ORIGIN).context(Failure::new(
                ErrorKind::Io,
                format!("working copy has no remote named {}", ORIGIN),
            ))?;
            remote
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| classify_push_error(e, &refspec))?;
        }

        let rejections = rejections.into_inner();
        if !rejections.is_empty() {
            return Err(failure(
                ErrorKind::RejectedByRemote,
                format!("push rejected: {}", rejections.join("; ")),
            ));
        }

        info!(branch = %branch, "Pushed to {}", ORIGIN);
        self.state = CopyState::Pushed;
        Ok(branch)
    }

    /// Short name of the branch HEAD points at.
    pub fn current_branch(&self) -> Result<String> {
        current_branch(self.repository()?)
    }

    fn require(&self, step: Step, operation: &str) -> Result<()> {
        self.repository()?;
        if self.step != Some(step) {
            let previous = match step {
                Step::Cloned => "init",
                Step::Staged => "stage_all",
                Step::Committed => "commit",
            };
            return Err(failure(
                ErrorKind::Io,
                format!(
                    "{} called out of order, {} must run first (state {:?})",
                    operation, previous, self.state
                ),
            ));
        }
        Ok(())
    }

    fn repository(&self) -> Result<&Repository> {
        self.repository.as_ref().ok_or_else(|| {
            failure(
                ErrorKind::Io,
                format!(
                    "working copy {} is not initialized",
                    self.directory.display()
                ),
            )
        })
    }
}

fn head_commit(repository: &Repository) -> Result<Option<git2::Commit<'_>>> {
    match repository.head() {
        Ok(head) => Ok(Some(head.peel_to_commit().context(Failure::new(
            ErrorKind::Io,
            "HEAD does not point at a commit",
        ))?)),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(anyhow::Error::new(e).context(Failure::new(ErrorKind::Io, "cannot read HEAD"))),
    }
}

fn has_staged_changes(repository: &Repository) -> Result<bool> {
    let mut index = repository
        .index()
        .context(Failure::new(ErrorKind::Io, "cannot open index"))?;
    let tree = index
        .write_tree()
        .context(Failure::new(ErrorKind::Io, "cannot write tree"))?;
    Ok(match head_commit(repository)? {
        Some(head) => head.tree_id() != tree,
        None => !index.is_empty(),
    })
}

fn commit_index(
    repository: &Repository,
    author: &CommitAuthor,
    message: &str,
) -> Result<Option<Oid>> {
    if !has_staged_changes(repository)? {
        return Ok(None);
    }

    let mut index = repository
        .index()
        .context(Failure::new(ErrorKind::Io, "cannot open index"))?;
    let tree_id = index
        .write_tree()
        .context(Failure::new(ErrorKind::Io, "cannot write tree"))?;
    let tree = repository
        .find_tree(tree_id)
        .context(Failure::new(ErrorKind::Io, "cannot read written tree"))?;
    let signature = git2::Signature::now(&author.name, &author.email).context(Failure::new(
        ErrorKind::Io,
        format!("invalid commit author {} <{}>", author.name, author.email),
    ))?;

    let parent = head_commit(repository)?;
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repository
        .commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )
        .context(Failure::new(ErrorKind::Io, "cannot create commit"))?;
    Ok(Some(oid))
}

fn current_branch(repository: &Repository) -> Result<String> {
    let head = repository
        .find_reference("HEAD")
        .context(Failure::new(ErrorKind::Io, "cannot read HEAD"))?;
    let target = head
        .symbolic_target()
        .ok_or_else(|| failure(ErrorKind::Io, "HEAD is detached"))?;
    target
        .strip_prefix("refs/heads/")
        .map(str::to_string)
        .ok_or_else(|| failure(ErrorKind::Io, format!("HEAD points at {}", target)))
}

fn classify_push_error(error: git2::Error, refspec: &str) -> anyhow::Error {
    let rejected = error.code() == ErrorCode::NotFastForward
        || error.message().contains("non-fastforward")
        || error.message().contains("non-fast-forward");
    let kind = if rejected {
        ErrorKind::RejectedByRemote
    } else {
        ErrorKind::Transport
    };
    anyhow::Error::new(error).context(Failure::new(kind, format!("cannot push {}", refspec)))
}
