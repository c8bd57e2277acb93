//! Seasons: numbered date ranges within a year, named `S{year}-{number}`.
//!
//! When adding a season the stored seasons are trusted over the caller,
//! and dates are trusted over names: missing values are derived from the
//! neighbouring seasons and the new season must fit between them.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};
use serde::{Serialize, Serializer};
use tracing::info;

use super::{timestamp, Catalog, SnapshotRecord, SNAPSHOT_COLUMNS};
use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A season's name: its year and its number within the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeasonName {
    /// Calendar year.
    pub year: i32,
    /// 1-based number within the year.
    pub number: u32,
}

impl SeasonName {
    /// The name for `number` in `year`.
    #[must_use]
    pub fn new(year: i32, number: u32) -> Self {
        Self { year, number }
    }
}

impl fmt::Display for SeasonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}-{}", self.year, self.number)
    }
}

impl FromStr for SeasonName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidSeason(format!("'{s}' is not a season name like S2021-3"));
        let (year, number) = s
            .strip_prefix('S')
            .and_then(|rest| rest.split_once('-'))
            .ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let number = number.parse().map_err(|_| invalid())?;
        if number == 0 {
            return Err(invalid());
        }
        Ok(Self { year, number })
    }
}

impl Serialize for SeasonName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A stored season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Season {
    /// Year and number.
    pub name: SeasonName,
    /// First day, inclusive.
    pub start: NaiveDate,
    /// Last day, inclusive.
    pub end: NaiveDate,
    /// Name of a linked external playlist.
    pub ext_name: Option<String>,
    /// ID of a linked external playlist.
    pub ext_id: Option<String>,
}

impl Season {
    fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= end && self.end >= start
    }
}

fn day_after(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| Error::InvalidSeason(format!("no day after {date}")))
}

/// The stored form of the instant a local calendar day begins.
///
/// Season dates are local days while `taken_at` is UTC. A midnight skipped
/// by a clock change falls back to UTC midnight.
fn local_day_start(date: NaiveDate) -> String {
    let midnight = date.and_time(NaiveTime::MIN);
    let start = Local
        .from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| Utc.from_utc_datetime(&midnight), |at| at.with_timezone(&Utc));
    timestamp(start)
}

fn parse_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_season(row: &rusqlite::Row) -> rusqlite::Result<Season> {
    Ok(Season {
        name: SeasonName::new(row.get(0)?, row.get(1)?),
        start: parse_date(row, 2)?,
        end: parse_date(row, 3)?,
        ext_name: row.get(4)?,
        ext_id: row.get(5)?,
    })
}

const SEASON_COLUMNS: &str = r#"year, number, start, "end", ext_name, ext_id"#;

/// Check that a season fits among the stored seasons of its year.
fn validate(season: &Season, year_seasons: &[Season]) -> Result<()> {
    let name = season.name;
    if season.start >= season.end {
        return Err(Error::InvalidSeason(format!(
            "{name} must start before it ends ({} to {})",
            season.start, season.end
        )));
    }
    if season.start.year() != name.year || season.end.year() != name.year {
        return Err(Error::InvalidSeason(format!(
            "{name} must fall within {}",
            name.year
        )));
    }
    if year_seasons.iter().any(|s| s.name == name) {
        return Err(Error::SeasonDuplicate {
            name: name.to_string(),
        });
    }
    if let Some(existing) = year_seasons
        .iter()
        .find(|s| s.overlaps(season.start, season.end))
    {
        return Err(Error::SeasonIntersection {
            name: name.to_string(),
            existing: existing.name.to_string(),
        });
    }

    let previous = year_seasons
        .iter()
        .filter(|s| s.end < season.start)
        .max_by_key(|s| s.end);
    let next = year_seasons
        .iter()
        .filter(|s| s.start > season.end)
        .min_by_key(|s| s.start);

    if let Some(previous) = previous {
        if previous.name.number >= name.number {
            return Err(Error::SeasonOrder {
                name: name.to_string(),
                message: format!("it must be numbered after {}", previous.name),
            });
        }
        let adjacent = day_after(previous.end)? == season.start;
        let consecutive = previous.name.number + 1 == name.number;
        check_neighbour(name, previous.name, adjacent, consecutive)?;
    }
    if let Some(next) = next {
        if next.name.number <= name.number {
            return Err(Error::SeasonOrder {
                name: name.to_string(),
                message: format!("it must be numbered before {}", next.name),
            });
        }
        let adjacent = day_after(season.end)? == next.start;
        let consecutive = name.number + 1 == next.name.number;
        check_neighbour(name, next.name, adjacent, consecutive)?;
    }
    Ok(())
}

fn check_neighbour(name: SeasonName, neighbour: SeasonName, adjacent: bool, consecutive: bool) -> Result<()> {
    if consecutive && !adjacent {
        return Err(Error::SeasonGap {
            name: name.to_string(),
            neighbour: neighbour.to_string(),
        });
    }
    if adjacent && !consecutive {
        return Err(Error::SeasonMissing {
            name: name.to_string(),
            neighbour: neighbour.to_string(),
        });
    }
    Ok(())
}

impl Catalog {
    /// Seasons of one year, by number.
    fn year_seasons(&self, year: i32) -> Result<Vec<Season>> {
        self.seasons(Some(year))
    }

    /// Stored seasons, optionally of one year, in name order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn seasons(&self, year: Option<i32>) -> Result<Vec<Season>> {
        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {SEASON_COLUMNS} FROM seasons
            WHERE ?1 IS NULL OR year = ?1
            ORDER BY year, number
            "
        ))?;
        let seasons = stmt
            .query_map([year], row_to_season)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(seasons)
    }

    /// The season containing `date`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn season_at(&self, date: NaiveDate) -> Result<Option<Season>> {
        let date = date.format(DATE_FORMAT).to_string();
        let season = self
            .conn
            .query_row(
                &format!(r#"SELECT {SEASON_COLUMNS} FROM seasons WHERE start <= ?1 AND "end" >= ?1"#),
                [date],
                row_to_season,
            )
            .optional()?;
        Ok(season)
    }

    /// Add a season, deriving whatever is not given.
    ///
    /// The end defaults to today. The start defaults to the day after the
    /// latest season of the year that ends before `end`, or January 1. The
    /// name defaults to the number after the season preceding `start`.
    ///
    /// # Errors
    ///
    /// Returns a season error if the result would not fit among the stored
    /// seasons, or a database error.
    pub fn add_season(
        &self,
        end: Option<NaiveDate>,
        start: Option<NaiveDate>,
        name: Option<SeasonName>,
    ) -> Result<Season> {
        self.add_season_on(Local::now().date_naive(), end, start, name)
    }

    /// [`Catalog::add_season`] with an explicit "today".
    pub(crate) fn add_season_on(
        &self,
        today: NaiveDate,
        end: Option<NaiveDate>,
        start: Option<NaiveDate>,
        name: Option<SeasonName>,
    ) -> Result<Season> {
        let end = end.unwrap_or(today);
        let stored = self.year_seasons(name.map_or(end.year(), |n| n.year))?;
        let latest_before = |date: NaiveDate| stored.iter().filter(|s| s.end < date).max_by_key(|s| s.end);

        let start = match start {
            Some(start) => start,
            None => match latest_before(end) {
                Some(previous) => day_after(previous.end)?,
                None => NaiveDate::from_ymd_opt(end.year(), 1, 1)
                    .ok_or_else(|| Error::InvalidSeason(format!("no January 1 in {}", end.year())))?,
            },
        };
        let name = name.unwrap_or_else(|| {
            let number = latest_before(start).map_or(1, |s| s.name.number + 1);
            SeasonName::new(end.year(), number)
        });

        let season = Season {
            name,
            start,
            end,
            ext_name: None,
            ext_id: None,
        };
        validate(&season, &stored)?;

        self.conn.execute(
            r#"
            INSERT INTO seasons (name, year, number, start, "end")
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                name.to_string(),
                name.year,
                name.number,
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string(),
            ],
        )?;
        info!("Added season {name} ({start} to {end})");
        Ok(season)
    }

    /// Check that the stored seasons of `year` consecutive in name are also
    /// consecutive in date.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DbSeasonGap`] for the first offending pair.
    pub fn verify_seasons(&self, year: i32) -> Result<()> {
        let seasons = self.year_seasons(year)?;
        for pair in seasons.windows(2) {
            let (first, second) = (&pair[0], &pair[1]);
            if first.name.number + 1 == second.name.number && day_after(first.end)? != second.start {
                return Err(Error::DbSeasonGap {
                    first: first.name.to_string(),
                    second: second.name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Snapshots taken during a season, oldest first. The season covers
    /// its first and last day in local time.
    ///
    /// # Errors
    ///
    /// Returns an error if the season does not exist or the database
    /// operation fails.
    pub fn snapshots_in_season(&self, name: SeasonName) -> Result<Vec<SnapshotRecord>> {
        let season = self
            .conn
            .query_row(
                &format!("SELECT {SEASON_COLUMNS} FROM seasons WHERE name = ?1"),
                [name.to_string()],
                row_to_season,
            )
            .optional()?
            .ok_or_else(|| Error::InvalidSeason(format!("{name} does not exist")))?;

        let mut stmt = self.conn.prepare(&format!(
            r"
            SELECT {SNAPSHOT_COLUMNS} FROM snapshots s
            WHERE s.taken_at >= ?1 AND s.taken_at < ?2
            ORDER BY s.taken_at, s.id
            "
        ))?;
        let until = day_after(season.end)?;
        let snapshots = stmt
            .query_map(
                [local_day_start(season.start), local_day_start(until)],
                Self::row_to_snapshot,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }
}
