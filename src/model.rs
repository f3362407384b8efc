//! Bookmark records and the values derived from them for rendering.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Earliest year a bookmark can be filed under.
pub const MIN_YEAR: i32 = 1970;

/// A saved URL with its metadata, as stored in the `bookmark` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub bookmark_id: i64,
    pub href: String,
    pub description: String,
    pub extended: String,
    pub meta: String,
    pub hash: String,
    pub publish_key: String,
    pub tags: BTreeSet<String>,
    pub time: DateTime<Utc>,
}

impl Bookmark {
    /// Creates a bookmark with empty passthrough fields and no tags.
    pub fn new(
        bookmark_id: i64,
        href: impl Into<String>,
        description: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            bookmark_id,
            href: href.into(),
            description: description.into(),
            extended: String::new(),
            meta: String::new(),
            hash: String::new(),
            publish_key: String::new(),
            tags: BTreeSet::new(),
            time,
        }
    }

    /// Calendar month of the bookmark in the given time zone.
    pub fn year_month(&self, time_zone: Tz) -> YearMonth {
        let local = self.time.with_timezone(&time_zone);
        YearMonth {
            year: local.year(),
            month: local.month(),
        }
    }

    /// Calendar date key (`YYYY-MM-DD`) of the bookmark in the given time zone.
    pub fn day_key(&self, time_zone: Tz) -> String {
        self.time
            .with_timezone(&time_zone)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Projects the bookmark onto the link shape handed to templates.
    pub fn to_link(&self) -> Link {
        Link {
            id: self.bookmark_id.to_string(),
            href: self.href.clone(),
            description: self.description.clone(),
            publish_key: self.publish_key.clone(),
            time: self.time,
        }
    }
}

/// A calendar (year, month) pair, written canonically as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Creates a year/month pair.
    ///
    /// # Errors
    ///
    /// Returns error if the year is before 1970 or the month is outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if year < MIN_YEAR {
            bail!("Year {} is before {}", year, MIN_YEAR);
        }
        if !(1..=12).contains(&month) {
            bail!("Month {} is outside 1..=12", month);
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// File name of the monthly page, e.g. `2023-07.html`.
    pub fn file_name(&self) -> String {
        format!("{}.html", self)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .split_once('-')
            .with_context(|| format!("Expected YYYY-MM, got {:?}", s))?;
        let year = year
            .parse()
            .with_context(|| format!("Invalid year in {:?}", s))?;
        let month = month
            .parse()
            .with_context(|| format!("Invalid month in {:?}", s))?;
        Self::new(year, month)
    }
}

/// All bookmarks filed under one year/month, ordered by time then id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmarks {
    year_month: YearMonth,
    bookmarks: Vec<Bookmark>,
}

impl Bookmarks {
    /// Creates the aggregate, restoring `(time, bookmark_id)` order.
    pub fn new(year_month: YearMonth, mut bookmarks: Vec<Bookmark>) -> Self {
        bookmarks.sort_by(|a, b| {
            a.time
                .cmp(&b.time)
                .then_with(|| a.bookmark_id.cmp(&b.bookmark_id))
        });
        Self {
            year_month,
            bookmarks,
        }
    }

    pub fn year_month(&self) -> YearMonth {
        self.year_month
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }
}

/// Bookmark projection used by templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Bookmark id in decimal.
    pub id: String,
    pub href: String,
    pub description: String,
    pub publish_key: String,
    pub time: DateTime<Utc>,
}

/// Links of one month bucketed by calendar day (`YYYY-MM-DD`).
///
/// Keys iterate in ascending date order. Links inside a day keep the order
/// of the [`Bookmarks`] they were built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayGroup {
    days: BTreeMap<String, Vec<Link>>,
}

impl DayGroup {
    /// Buckets bookmarks by their calendar date in `time_zone`.
    pub fn from_bookmarks(bookmarks: &Bookmarks, time_zone: Tz) -> Self {
        let mut days: BTreeMap<String, Vec<Link>> = BTreeMap::new();
        for bookmark in bookmarks.bookmarks() {
            days.entry(bookmark.day_key(time_zone))
                .or_default()
                .push(bookmark.to_link());
        }
        Self { days }
    }

    /// Day keys with their links, oldest day first.
    pub fn days(&self) -> impl DoubleEndedIterator<Item = (&str, &[Link])> {
        self.days
            .iter()
            .map(|(day, links)| (day.as_str(), links.as_slice()))
    }

    pub fn get(&self, day: &str) -> Option<&[Link]> {
        self.days.get(day).map(Vec::as_slice)
    }

    /// Number of distinct days.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Total number of links across all days.
    pub fn link_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }
}
