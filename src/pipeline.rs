//! Chunked Reader, Processor and Writer pipeline.
//!
//! The reader pulls year/month pairs from the source cursor until a chunk is
//! full, the processor loads the bookmarks of each pair, and the writer
//! materializes the whole chunk before the next one is read. The first
//! failure aborts the run; pages already written stay on disk.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::model::{Bookmarks, YearMonth};
use crate::source::BookmarkSource;
use crate::writer::SiteWriter;

/// Number of year/month aggregates handed to the writer at once.
pub const CHUNK_SIZE: usize = 100;

/// Summary of a completed pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Writer invocations.
    pub chunks: usize,
    /// Monthly pages written.
    pub months: usize,
    /// Bookmarks rendered across all pages.
    pub bookmarks: usize,
    /// Written page paths in emission order.
    pub files: Vec<PathBuf>,
}

/// Runs the pipeline to completion with the given chunk size.
///
/// A `chunk_size` of zero is treated as one.
///
/// # Errors
///
/// Returns the first source, template or write failure.
#[instrument(skip_all, fields(chunk_size = chunk_size, content_dir = %writer.content_dir().display()))]
pub fn run_pipeline(
    source: &mut dyn BookmarkSource,
    writer: &SiteWriter<'_>,
    chunk_size: usize,
) -> Result<PipelineReport> {
    let chunk_size = chunk_size.max(1);
    let mut report = PipelineReport::default();

    source
        .open_year_months()
        .context("Failed to open year/month cursor")?;

    loop {
        let year_months = read_chunk(source, chunk_size)?;
        if year_months.is_empty() {
            break;
        }

        let chunk = process_chunk(source, &year_months)?;
        write_chunk(writer, &chunk, &mut report)?;
        report.chunks += 1;

        info!(
            chunk = report.chunks,
            months = chunk.len(),
            "Wrote chunk"
        );
    }

    info!(
        chunks = report.chunks,
        months = report.months,
        bookmarks = report.bookmarks,
        "Pipeline complete"
    );

    Ok(report)
}

/// Reader: fills one chunk from the cursor.
fn read_chunk(source: &mut dyn BookmarkSource, chunk_size: usize) -> Result<Vec<YearMonth>> {
    let mut year_months = Vec::with_capacity(chunk_size);

    while year_months.len() < chunk_size {
        let batch = source
            .next_year_months(chunk_size - year_months.len())
            .context("Failed to read year/month cursor")?;
        if batch.is_empty() {
            break;
        }
        year_months.extend(batch);
    }

    Ok(year_months)
}

/// Processor: expands every pair to its full aggregate.
fn process_chunk(
    source: &mut dyn BookmarkSource,
    year_months: &[YearMonth],
) -> Result<Vec<Bookmarks>> {
    year_months
        .iter()
        .map(|&year_month| {
            let bookmarks = source
                .bookmarks_for(year_month)
                .with_context(|| format!("Failed to load bookmarks for {}", year_month))?;
            Ok(Bookmarks::new(year_month, bookmarks))
        })
        .collect()
}

/// Writer: writes the chunk in order, stopping at the first failure.
fn write_chunk(
    writer: &SiteWriter<'_>,
    chunk: &[Bookmarks],
    report: &mut PipelineReport,
) -> Result<()> {
    for bookmarks in chunk {
        let path = writer
            .write_monthly(bookmarks)
            .with_context(|| format!("Failed to write page for {}", bookmarks.year_month()))?;
        report.months += 1;
        report.bookmarks += bookmarks.len();
        report.files.push(path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, failure, kind_of};
    use crate::model::{Bookmark, DayGroup, Link};
    use crate::source::InMemorySource;
    use crate::templates::{MaudTemplates, TemplateService};
    use chrono::{NaiveDate, TimeZone, Utc};
    use chrono_tz::Tz;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Fails rendering the n-th monthly page (1 based).
    struct FailOnNth {
        inner: MaudTemplates,
        fail_on: usize,
        calls: Cell<usize>,
    }

    impl TemplateService for FailOnNth {
        fn monthly(&self, ym: YearMonth, links: &DayGroup) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == self.fail_on {
                return Err(anyhow::anyhow!("boom"));
            }
            self.inner.monthly(ym, links)
        }

        fn daily(&self, date: NaiveDate, links: &[Link]) -> Result<String> {
            self.inner.daily(date, links)
        }

        fn index(&self, year_months: &[YearMonth]) -> Result<String> {
            self.inner.index(year_months)
        }
    }

    /// Source whose detail query always fails.
    struct BrokenDetails(InMemorySource);

    impl BookmarkSource for BrokenDetails {
        fn open_year_months(&mut self) -> Result<()> {
            self.0.open_year_months()
        }

        fn next_year_months(&mut self, max: usize) -> Result<Vec<YearMonth>> {
            self.0.next_year_months(max)
        }

        fn bookmarks_for(&mut self, _: YearMonth) -> Result<Vec<Bookmark>> {
            Err(failure(ErrorKind::Database, "connection reset"))
        }
    }

    /// One bookmark in each of `count` consecutive months from 2000-01.
    fn monthly_bookmarks(count: usize) -> Vec<Bookmark> {
        (0..count)
            .map(|i| {
                let year = 2000 + (i / 12) as i32;
                let month = (i % 12) as u32 + 1;
                let time = Utc.with_ymd_and_hms(year, month, 15, 12, 0, 0).unwrap();
                Bookmark::new(i as i64, format!("https://example.com/{}", i), "x", time)
            })
            .collect()
    }

    #[test]
    fn test_pipeline_chunks_by_size() {
        // Arrange
        let dir = TempDir::new().expect("temp dir");
        let templates = MaudTemplates::default();
        let writer = SiteWriter::new(dir.path(), &templates, Tz::UTC);
        let mut source = InMemorySource::new(monthly_bookmarks(250), Tz::UTC);

        // Act
        let report = run_pipeline(&mut source, &writer, CHUNK_SIZE).expect("run");

        // Assert
        assert_eq!(report.chunks, 3, "250 months should need three chunks");
        assert_eq!(report.months, 250);
        assert_eq!(report.bookmarks, 250);
        assert!(dir.path().join("2000-01.html").exists());
        assert!(dir.path().join("2020-10.html").exists());
    }

    #[test]
    fn test_pipeline_with_empty_source_writes_nothing() {
        // Arrange
        let dir = TempDir::new().expect("temp dir");
        let templates = MaudTemplates::default();
        let writer = SiteWriter::new(dir.path(), &templates, Tz::UTC);
        let mut source = InMemorySource::new(vec![], Tz::UTC);

        // Act
        let report = run_pipeline(&mut source, &writer, CHUNK_SIZE).expect("run");

        // Assert
        assert_eq!(report, PipelineReport::default());
        assert_eq!(std::fs::read_dir(dir.path()).expect("list").count(), 0);
    }

    #[test]
    fn test_pipeline_fails_fast_and_keeps_written_pages() {
        // Arrange
        let dir = TempDir::new().expect("temp dir");
        let templates = FailOnNth {
            inner: MaudTemplates::default(),
            fail_on: 2,
            calls: Cell::new(0),
        };
        let writer = SiteWriter::new(dir.path(), &templates, Tz::UTC);
        let mut source = InMemorySource::new(monthly_bookmarks(3), Tz::UTC);

        // Act
        let err = run_pipeline(&mut source, &writer, CHUNK_SIZE).unwrap_err();

        // Assert
        assert_eq!(kind_of(&err), Some(ErrorKind::Template));
        assert_eq!(templates.calls.get(), 2, "Third month should never render");
        let written = std::fs::read_dir(dir.path()).expect("list").count();
        assert_eq!(written, 1, "First page should remain on disk");
    }

    #[test]
    fn test_pipeline_propagates_database_failure() {
        // Arrange
        let dir = TempDir::new().expect("temp dir");
        let templates = MaudTemplates::default();
        let writer = SiteWriter::new(dir.path(), &templates, Tz::UTC);
        let mut source = BrokenDetails(InMemorySource::new(monthly_bookmarks(2), Tz::UTC));

        // Act
        let err = run_pipeline(&mut source, &writer, CHUNK_SIZE).unwrap_err();

        // Assert
        assert_eq!(kind_of(&err), Some(ErrorKind::Database));
        assert!(format!("{:#}", err).contains("connection reset"));
    }

    #[test]
    fn test_pipeline_writes_month_without_bookmarks() {
        // Arrange
        let dir = TempDir::new().expect("temp dir");
        let templates = MaudTemplates::default();
        let writer = SiteWriter::new(dir.path(), &templates, Tz::UTC);
        let empty = YearMonth::new(2019, 5).expect("valid");
        let mut source = InMemorySource::new(vec![], Tz::UTC).with_year_month(empty);

        // Act
        let report = run_pipeline(&mut source, &writer, CHUNK_SIZE).expect("run");

        // Assert
        assert_eq!(report.months, 1);
        assert_eq!(report.bookmarks, 0);
        assert!(dir.path().join("2019-05.html").exists());
    }
}
