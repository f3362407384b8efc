//! Bookmark sources feeding the pipeline.
//!
//! A source exposes a forward-only cursor over the distinct year/month
//! pairs that have bookmarks, and a detail query returning the bookmarks of
//! one pair. The cursor and the detail query share one handle, so the cursor
//! is driven in batches rather than borrowed as an iterator.

mod pg;

use anyhow::Result;
use chrono_tz::Tz;
use std::collections::{BTreeSet, VecDeque};

use crate::error::{ErrorKind, failure};
use crate::model::{Bookmark, YearMonth};

pub use self::pg::{BOOKMARKS_QUERY, PgBookmarkSource, YEAR_MONTHS_QUERY};

/// Default number of rows fetched per cursor round trip.
pub const DEFAULT_FETCH_SIZE: usize = 100;

/// Reads bookmarks grouped by calendar month.
pub trait BookmarkSource {
    /// Opens a fresh cursor over the distinct year/month pairs.
    ///
    /// A previously opened cursor is discarded.
    fn open_year_months(&mut self) -> Result<()>;

    /// Returns up to `max` further pairs. An empty batch means the cursor is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns error if the cursor was never opened or the fetch fails.
    fn next_year_months(&mut self, max: usize) -> Result<Vec<YearMonth>>;

    /// Returns every bookmark whose time falls into `year_month`, ordered by
    /// time then id.
    fn bookmarks_for(&mut self, year_month: YearMonth) -> Result<Vec<Bookmark>>;
}

/// Source backed by a list of bookmarks held in memory.
///
/// Applies the same month predicate and ordering as the database query.
/// Year/month pairs are reported in the order their first bookmark appears,
/// which mirrors an unordered view.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    bookmarks: Vec<Bookmark>,
    time_zone: Tz,
    cursor: Option<VecDeque<YearMonth>>,
    extra_year_months: Vec<YearMonth>,
}

impl InMemorySource {
    pub fn new(bookmarks: Vec<Bookmark>, time_zone: Tz) -> Self {
        Self {
            bookmarks,
            time_zone,
            cursor: None,
            extra_year_months: Vec::new(),
        }
    }

    /// Also reports `year_month` from the cursor even when no bookmark
    /// falls into it, as a stale view row would.
    pub fn with_year_month(mut self, year_month: YearMonth) -> Self {
        self.extra_year_months.push(year_month);
        self
    }

    fn distinct_year_months(&self) -> VecDeque<YearMonth> {
        let mut seen = BTreeSet::new();
        self.bookmarks
            .iter()
            .map(|b| b.year_month(self.time_zone))
            .chain(self.extra_year_months.iter().copied())
            .filter(|ym| seen.insert(*ym))
            .collect()
    }
}

impl BookmarkSource for InMemorySource {
    fn open_year_months(&mut self) -> Result<()> {
        self.cursor = Some(self.distinct_year_months());
        Ok(())
    }

    fn next_year_months(&mut self, max: usize) -> Result<Vec<YearMonth>> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| failure(ErrorKind::Database, "year/month cursor is not open"))?;
        let take = max.min(cursor.len());
        Ok(cursor.drain(..take).collect())
    }

    fn bookmarks_for(&mut self, year_month: YearMonth) -> Result<Vec<Bookmark>> {
        let mut matching: Vec<Bookmark> = self
            .bookmarks
            .iter()
            .filter(|b| b.year_month(self.time_zone) == year_month)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.time
                .cmp(&b.time)
                .then_with(|| a.bookmark_id.cmp(&b.bookmark_id))
        });
        Ok(matching)
    }
}
