//! PostgreSQL bookmark source.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use postgres::{Client, NoTls, Row, SimpleQueryMessage, SimpleQueryRow};
use std::collections::VecDeque;
use tracing::{debug, info, instrument};

use super::BookmarkSource;
use crate::error::{ErrorKind, Failure, failure};
use crate::model::{Bookmark, YearMonth};

/// Distinct year/month pairs, read through a server side cursor.
pub const YEAR_MONTHS_QUERY: &str =
    "select year::int4 as year, month::int4 as month from bookmark_years_months";

/// Bookmarks of one month; `$1` month, `$2` year, `$3` time zone name.
pub const BOOKMARKS_QUERY: &str = "select bookmark_id, href, description, extended, meta, hash, \
     publish_key, tags, time from bookmark \
     where date_part('month', time at time zone $3) = $1 \
     and date_part('year', time at time zone $3) = $2 \
     order by time asc, bookmark_id asc";

const CURSOR_NAME: &str = "bookmark_year_months";

/// Session setting that makes the view bucket months in `time_zone`.
fn set_time_zone_sql(time_zone: Tz) -> String {
    format!("set time zone '{}'", time_zone.name())
}

/// Bookmark source reading the `bookmark` table and the
/// `bookmark_years_months` view.
///
/// The year/month cursor is declared `WITH HOLD`, so it survives the
/// autocommit of each statement and can be fetched from between detail
/// queries on the same connection. The session time zone is set to the
/// configured zone, so the view and the detail query agree on month
/// boundaries.
pub struct PgBookmarkSource {
    client: Client,
    time_zone: Tz,
    cursor: CursorBuffer,
}

/// Client side bookkeeping of the year/month cursor.
///
/// A batch shorter than the fetch size is the last one; after it the server
/// cursor is closed and only buffered pairs remain.
#[derive(Debug)]
struct CursorBuffer {
    fetch_size: usize,
    pending: VecDeque<YearMonth>,
    open: bool,
    exhausted: bool,
}

impl CursorBuffer {
    fn new(fetch_size: usize) -> Self {
        Self {
            fetch_size: fetch_size.max(1),
            pending: VecDeque::new(),
            open: false,
            exhausted: false,
        }
    }

    fn opened(&mut self) {
        self.pending.clear();
        self.open = true;
        self.exhausted = false;
    }

    fn closed(&mut self) {
        self.open = false;
    }

    fn ensure_readable(&self) -> Result<()> {
        if !self.open && !self.exhausted {
            return Err(failure(ErrorKind::Database, "year/month cursor is not open"));
        }
        Ok(())
    }

    fn needs_fetch(&self, max: usize) -> bool {
        self.pending.len() < max && !self.exhausted
    }

    /// Buffers one fetched batch; true when the server cursor should close.
    fn accept(&mut self, batch: Vec<YearMonth>) -> bool {
        let last = batch.len() < self.fetch_size;
        self.pending.extend(batch);
        if last {
            self.exhausted = true;
        }
        last
    }

    fn take(&mut self, max: usize) -> Vec<YearMonth> {
        let take = max.min(self.pending.len());
        self.pending.drain(..take).collect()
    }
}

impl PgBookmarkSource {
    /// Connects to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns a database failure if the connection cannot be established
    /// or the session time zone cannot be set.
    #[instrument(skip(url), level = "debug")]
    pub fn connect(url: &str, time_zone: Tz, fetch_size: usize) -> Result<Self> {
        let client = Client::connect(url, NoTls)
            .context(Failure::new(ErrorKind::Database, "cannot connect to database"))?;
        let source = Self::from_client(client, time_zone, fetch_size)?;
        info!(time_zone = %time_zone, fetch_size, "Connected to bookmark database");
        Ok(source)
    }

    /// Wraps an existing connection and sets its session time zone.
    pub fn from_client(mut client: Client, time_zone: Tz, fetch_size: usize) -> Result<Self> {
        client
            .batch_execute(&set_time_zone_sql(time_zone))
            .context(Failure::new(
                ErrorKind::Database,
                format!("cannot set session time zone to {}", time_zone),
            ))?;
        Ok(Self {
            client,
            time_zone,
            cursor: CursorBuffer::new(fetch_size),
        })
    }

    fn close_cursor(&mut self) -> Result<()> {
        if self.cursor.open {
            self.client
                .batch_execute(&format!("close {}", CURSOR_NAME))
                .context(Failure::new(ErrorKind::Database, "cannot close year/month cursor"))?;
            self.cursor.closed();
        }
        Ok(())
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let sql = format!("fetch forward {} from {}", self.cursor.fetch_size, CURSOR_NAME);
        let messages = self
            .client
            .simple_query(&sql)
            .context(Failure::new(ErrorKind::Database, "cannot fetch from year/month cursor"))?;

        let mut batch = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let year = parse_column(read_simple(&row, "year")?, "year")?;
                let month = parse_column(read_simple(&row, "month")?, "month")?;
                let year_month = u32::try_from(month)
                    .map_err(anyhow::Error::from)
                    .and_then(|month| YearMonth::new(year, month))
                    .context(Failure::new(
                        ErrorKind::Database,
                        format!("invalid year/month row ({}, {})", year, month),
                    ))?;
                batch.push(year_month);
            }
        }

        debug!(fetched = batch.len(), "Fetched year/month batch");
        if self.cursor.accept(batch) {
            self.close_cursor()?;
        }
        Ok(())
    }
}

impl BookmarkSource for PgBookmarkSource {
    fn open_year_months(&mut self) -> Result<()> {
        self.close_cursor()?;
        self.client
            .batch_execute(&format!(
                "declare {} no scroll cursor with hold for {}",
                CURSOR_NAME, YEAR_MONTHS_QUERY
            ))
            .context(Failure::new(ErrorKind::Database, "cannot open year/month cursor"))?;
        self.cursor.opened();
        Ok(())
    }

    fn next_year_months(&mut self, max: usize) -> Result<Vec<YearMonth>> {
        self.cursor.ensure_readable()?;
        while self.cursor.needs_fetch(max) {
            self.fetch_batch()?;
        }
        Ok(self.cursor.take(max))
    }

    #[instrument(skip(self), fields(year_month = %year_month), level = "debug")]
    fn bookmarks_for(&mut self, year_month: YearMonth) -> Result<Vec<Bookmark>> {
        let month = f64::from(year_month.month());
        let year = f64::from(year_month.year());
        let rows = self
            .client
            .query(BOOKMARKS_QUERY, &[&month, &year, &self.time_zone.name()])
            .context(Failure::new(
                ErrorKind::Database,
                format!("cannot query bookmarks for {}", year_month),
            ))?;

        let time_zone = self.time_zone;
        let bookmarks = rows
            .iter()
            .map(|row| bookmark_from_row(row, time_zone))
            .collect::<Result<Vec<_>>>()
            .context(Failure::new(
                ErrorKind::Database,
                format!("cannot decode bookmarks for {}", year_month),
            ))?;
        debug!(count = bookmarks.len(), "Loaded bookmarks");
        Ok(bookmarks)
    }
}

fn read_simple<'a>(row: &'a SimpleQueryRow, column: &str) -> Result<Option<&'a str>> {
    row.try_get(column).context(Failure::new(
        ErrorKind::Database,
        format!("column {} missing from bookmark_years_months", column),
    ))
}

fn parse_column(value: Option<&str>, column: &str) -> Result<i32> {
    let value = value.ok_or_else(|| {
        failure(
            ErrorKind::Database,
            format!("column {} is null in bookmark_years_months", column),
        )
    })?;
    value.parse().context(Failure::new(
        ErrorKind::Database,
        format!("column {} is not an integer: {:?}", column, value),
    ))
}

/// Reads `timestamp` values as wall clock time in `time_zone`, the way the
/// session interprets them. Times skipped by a DST gap move forward an hour.
fn local_to_utc(local: NaiveDateTime, time_zone: Tz) -> Result<DateTime<Utc>> {
    time_zone
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            time_zone
                .from_local_datetime(&(local + TimeDelta::hours(1)))
                .earliest()
        })
        .map(|time| time.with_timezone(&Utc))
        .ok_or_else(|| {
            failure(
                ErrorKind::Database,
                format!("{} does not exist in {}", local, time_zone),
            )
        })
}

fn read_time(row: &Row, time_zone: Tz) -> Result<DateTime<Utc>> {
    if let Ok(time) = row.try_get::<_, DateTime<Utc>>("time") {
        return Ok(time);
    }
    let local: NaiveDateTime = row.try_get("time").context("Failed to read column time")?;
    local_to_utc(local, time_zone)
}

fn bookmark_from_row(row: &Row, time_zone: Tz) -> Result<Bookmark> {
    let text = |column: &str| -> Result<String> {
        Ok(row
            .try_get::<_, Option<String>>(column)
            .with_context(|| format!("Failed to read column {}", column))?
            .unwrap_or_default())
    };

    let tags: Option<Vec<String>> = row.try_get("tags").context("Failed to read column tags")?;
    let time = read_time(row, time_zone)?;

    Ok(Bookmark {
        bookmark_id: row
            .try_get("bookmark_id")
            .context("Failed to read column bookmark_id")?,
        href: row.try_get("href").context("Failed to read column href")?,
        description: text("description")?,
        extended: text("extended")?,
        meta: text("meta")?,
        hash: text("hash")?,
        publish_key: text("publish_key")?,
        tags: tags.unwrap_or_default().into_iter().collect(),
        time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use chrono::NaiveDate;

    #[test]
    fn test_bookmarks_query_orders_by_time_then_id() {
        assert!(BOOKMARKS_QUERY.ends_with("order by time asc, bookmark_id asc"));
        assert!(BOOKMARKS_QUERY.contains("time at time zone $3"));
    }

    #[test]
    fn test_year_months_query_reads_view() {
        assert!(YEAR_MONTHS_QUERY.contains("from bookmark_years_months"));
    }

    #[test]
    fn test_session_time_zone_matches_configured_zone() {
        assert_eq!(
            set_time_zone_sql(Tz::Europe__Berlin),
            "set time zone 'Europe/Berlin'"
        );
        assert_eq!(set_time_zone_sql(Tz::UTC), "set time zone 'UTC'");
    }

    /// Consecutive months starting at 2000-01.
    fn months(range: std::ops::Range<usize>) -> Vec<YearMonth> {
        range
            .map(|i| YearMonth::new(2000 + (i / 12) as i32, (i % 12) as u32 + 1).unwrap())
            .collect()
    }

    /// Drives `cursor` like the source does against a server holding `rows`.
    fn drain(cursor: &mut CursorBuffer, rows: &[YearMonth], max: usize) -> Vec<Vec<YearMonth>> {
        let mut served = 0;
        let mut chunks = Vec::new();
        cursor.opened();
        loop {
            cursor.ensure_readable().expect("readable");
            while cursor.needs_fetch(max) {
                let end = (served + cursor.fetch_size).min(rows.len());
                let batch = rows[served..end].to_vec();
                served = end;
                if cursor.accept(batch) {
                    cursor.closed();
                }
            }
            let chunk = cursor.take(max);
            if chunk.is_empty() {
                return chunks;
            }
            chunks.push(chunk);
        }
    }

    #[test]
    fn test_cursor_serves_every_row_across_batches() {
        // Arrange
        let rows = months(0..250);
        let mut cursor = CursorBuffer::new(30);

        // Act
        let chunks = drain(&mut cursor, &rows, 100);

        // Assert
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![100, 100, 50]);
        assert_eq!(chunks.concat(), rows);
        assert!(!cursor.open, "Short batch should close the server cursor");
    }

    #[test]
    fn test_cursor_exhausts_on_empty_batch_after_full_ones() {
        // Arrange
        let rows = months(0..200);
        let mut cursor = CursorBuffer::new(100);

        // Act
        let chunks = drain(&mut cursor, &rows, 100);

        // Assert
        assert_eq!(chunks.concat(), rows);
        assert!(cursor.exhausted);
        assert!(!cursor.open);
    }

    #[test]
    fn test_full_batch_keeps_cursor_open() {
        // Arrange
        let mut cursor = CursorBuffer::new(2);
        cursor.opened();

        // Act
        let close = cursor.accept(months(0..2));

        // Assert
        assert!(!close);
        assert!(cursor.needs_fetch(3));
        assert_eq!(cursor.take(1), months(0..1));
        assert_eq!(cursor.take(5), months(1..2));
    }

    #[test]
    fn test_exhausted_cursor_still_drains_buffer() {
        // Arrange
        let mut cursor = CursorBuffer::new(10);
        cursor.opened();
        assert!(cursor.accept(months(0..3)));
        cursor.closed();

        // Act
        let readable = cursor.ensure_readable();
        let first = cursor.take(2);
        let rest = cursor.take(2);

        // Assert
        assert!(readable.is_ok());
        assert!(!cursor.needs_fetch(2));
        assert_eq!(first, months(0..2));
        assert_eq!(rest, months(2..3));
        assert!(cursor.take(2).is_empty());
    }

    #[test]
    fn test_unopened_cursor_is_database_error() {
        // Arrange
        let cursor = CursorBuffer::new(100);

        // Act
        let err = cursor.ensure_readable().unwrap_err();

        // Assert
        assert_eq!(kind_of(&err), Some(ErrorKind::Database));
    }

    #[test]
    fn test_reopening_discards_buffered_rows() {
        // Arrange
        let mut cursor = CursorBuffer::new(10);
        cursor.opened();
        cursor.accept(months(0..3));
        cursor.closed();

        // Act
        cursor.opened();

        // Assert
        assert!(cursor.open);
        assert!(cursor.needs_fetch(1));
        assert!(cursor.take(10).is_empty());
    }

    #[test]
    fn test_local_timestamp_is_read_in_configured_zone() {
        // Arrange
        let local = NaiveDate::from_ymd_opt(2023, 7, 31)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap();

        // Act
        let time = local_to_utc(local, Tz::Europe__Berlin).expect("valid");

        // Assert
        assert_eq!(time, Utc.with_ymd_and_hms(2023, 7, 31, 21, 30, 0).unwrap());
    }

    #[test]
    fn test_local_timestamp_in_dst_gap_moves_forward() {
        // Arrange
        let skipped = NaiveDate::from_ymd_opt(2023, 3, 26)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();

        // Act
        let time = local_to_utc(skipped, Tz::Europe__Berlin).expect("valid");

        // Assert
        assert_eq!(time, Utc.with_ymd_and_hms(2023, 3, 26, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_column_null_is_database_error() {
        // Act
        let err = parse_column(None, "year").unwrap_err();

        // Assert
        assert_eq!(kind_of(&err), Some(ErrorKind::Database));
    }

    #[test]
    fn test_parse_column_rejects_text() {
        // Act
        let err = parse_column(Some("twenty"), "month").unwrap_err();

        // Assert
        assert_eq!(kind_of(&err), Some(ErrorKind::Database));
        assert_eq!(parse_column(Some("2023"), "year").unwrap(), 2023);
    }
}
