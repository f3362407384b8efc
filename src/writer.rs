//! Site writer
//!
//! Materializes one HTML page per month under the content directory.
//! Every page is written to a temporary sibling, flushed to disk and renamed
//! over the destination, so a reader never observes a partially written
//! page.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{ErrorKind, Failure};
use crate::model::{Bookmarks, DayGroup};
use crate::templates::TemplateService;

/// Writes monthly pages through a [`TemplateService`].
pub struct SiteWriter<'a> {
    content_dir: PathBuf,
    templates: &'a dyn TemplateService,
    time_zone: Tz,
}

impl<'a> SiteWriter<'a> {
    pub fn new(
        content_dir: impl Into<PathBuf>,
        templates: &'a dyn TemplateService,
        time_zone: Tz,
    ) -> Self {
        Self {
            content_dir: content_dir.into(),
            templates,
            time_zone,
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// Renders and writes `{content_dir}/{YYYY-MM}.html`.
    ///
    /// # Errors
    ///
    /// Returns a template failure if rendering fails, or an io failure if
    /// the page cannot be written. A failed write leaves any previous page
    /// at the destination untouched.
    pub fn write_monthly(&self, bookmarks: &Bookmarks) -> Result<PathBuf> {
        let year_month = bookmarks.year_month();
        let days = DayGroup::from_bookmarks(bookmarks, self.time_zone);

        let html = self
            .templates
            .monthly(year_month, &days)
            .with_context(|| {
                Failure::new(
                    ErrorKind::Template,
                    format!("cannot render monthly page for {}", year_month),
                )
            })?;

        let path = self.content_dir.join(year_month.file_name());
        write_atomic(&path, html.as_bytes())?;

        debug!(
            year_month = %year_month,
            days = days.len(),
            links = days.link_count(),
            path = %path.display(),
            "Wrote monthly page"
        );

        Ok(path)
    }
}

/// Replaces `path` with `contents` through a synced temporary sibling.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let io_failure = |what: &str| {
        Failure::new(
            ErrorKind::Io,
            format!("cannot {} {}", what, path.display()),
        )
    };

    fs::create_dir_all(dir).with_context(|| io_failure("create directory for"))?;

    let mut tmp = NamedTempFile::new_in(dir).with_context(|| io_failure("stage"))?;
    tmp.write_all(contents)
        .with_context(|| io_failure("write"))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| io_failure("sync"))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| io_failure("rename into"))?;

    sync_dir(dir).with_context(|| io_failure("sync directory of"))?;

    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
