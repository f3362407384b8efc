//! Run orchestration: clone, regenerate, commit and push.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, instrument};

use crate::config::Settings;
use crate::git::{GitTransport, WorkingCopy, transport_for};
use crate::pipeline::{CHUNK_SIZE, PipelineReport, run_pipeline};
use crate::source::BookmarkSource;
use crate::templates::TemplateService;
use crate::writer::SiteWriter;

/// Placeholder in the commit message template.
pub const TIMESTAMP_PLACEHOLDER: &str = "{timestamp}";

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub pipeline: PipelineReport,
    /// New commit id, `None` when the regenerated site matched HEAD.
    pub commit: Option<String>,
    /// Branch pushed to origin.
    pub branch: String,
}

/// Runs one full publication with the transport selected by `settings`.
///
/// # Errors
///
/// Returns an auth-mismatch failure if the configured credentials do not
/// fit the remote URI, otherwise see [`publish_with_transport`].
pub fn publish(
    settings: &Settings,
    source: &mut dyn BookmarkSource,
    templates: &dyn TemplateService,
    now: DateTime<Utc>,
) -> Result<PublishReport> {
    let transport = transport_for(&settings.git.credentials, &settings.git.uri)?;
    publish_with_transport(settings, transport, source, templates, now)
}

/// Runs one full publication over an explicit transport.
///
/// Clones the remote into the configured directory, writes every monthly
/// page, then stages, commits and pushes. Any failure ends the run; the
/// working copy is left as it was when the failure occurred.
#[instrument(skip_all, fields(uri = %settings.git.uri, transport = %transport.kind()))]
pub fn publish_with_transport(
    settings: &Settings,
    transport: Box<dyn GitTransport>,
    source: &mut dyn BookmarkSource,
    templates: &dyn TemplateService,
    now: DateTime<Utc>,
) -> Result<PublishReport> {
    let mut copy = WorkingCopy::new(
        &settings.git.clone_dir,
        &settings.git.uri,
        transport,
        settings.git.author.clone(),
    );

    copy.init().context("Failed to prepare working copy")?;

    let content_dir = copy.directory().join(&settings.site.content_dir);
    let writer = SiteWriter::new(content_dir, templates, settings.site.time_zone);
    let pipeline = run_pipeline(source, &writer, CHUNK_SIZE).context("Failed to generate site")?;

    copy.stage_all().context("Failed to stage generated site")?;

    let message = commit_message(&settings.git.commit_message, now);
    let commit = copy
        .commit(&message)
        .context("Failed to commit generated site")?;

    let branch = copy.push().context("Failed to push generated site")?;

    info!(
        months = pipeline.months,
        bookmarks = pipeline.bookmarks,
        commit = commit.as_deref().unwrap_or("none"),
        branch = %branch,
        "Published site"
    );

    Ok(PublishReport {
        pipeline,
        commit,
        branch,
    })
}

/// Fills `{timestamp}` in the template with `now` as RFC 3339 UTC.
pub fn commit_message(template: &str, now: DateTime<Utc>) -> String {
    template.replace(
        TIMESTAMP_PLACEHOLDER,
        &now.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_commit_message_fills_timestamp() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        // Act
        let message = commit_message("Site regenerated at {timestamp}", now);

        // Assert
        assert_eq!(message, "Site regenerated at 2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_commit_message_without_placeholder() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        assert_eq!(commit_message("Update", now), "Update");
    }
}
