//! Loading price histories.
//!
//! A [`HistoryLoader`] hands back the raw pieces of a [`PriceHistory`]: chronological bars, the date of each bar
//! and the split schedule. [`PriceHistoryBuilder`] assembles them in memory; [`CsvHistoryLoader`] reads them from a
//! price file and an optional split file *(feature `loader`)*.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::engine::{PriceBar, PriceHistory};
use crate::errors::{Error, Result};

#[cfg(feature = "loader")]
pub use csv_loader::*;

/// Raw output of a [`HistoryLoader`].
#[derive(Debug, Clone, Default)]
pub struct RawHistory {
    /// Bars, oldest first.
    pub bars: Vec<PriceBar>,
    /// Calendar date of each bar mapped to its position in `bars`.
    pub date_index: HashMap<NaiveDate, usize>,
    /// Split ratio per effective date.
    pub splits: BTreeMap<NaiveDate, f64>,
}

/// Source of the bars and split schedule of one instrument.
pub trait HistoryLoader {
    /// Loads the raw history.
    fn load(&self) -> Result<RawHistory>;
}

/// Sorts dated bars chronologically and indexes them by date.
fn index_bars(mut rows: Vec<(NaiveDate, PriceBar)>) -> Result<(Vec<PriceBar>, HashMap<NaiveDate, usize>)> {
    rows.sort_by_key(|(date, _)| *date);

    let mut bars = Vec::with_capacity(rows.len());
    let mut date_index = HashMap::with_capacity(rows.len());
    for (date, bar) in rows {
        if date_index.insert(date, bars.len()).is_some() {
            return Err(Error::DuplicateDate(date));
        }
        bars.push(bar);
    }
    Ok((bars, date_index))
}

/// Collects a split schedule, rejecting two splits on the same day.
fn index_splits(rows: impl IntoIterator<Item = (NaiveDate, f64)>) -> Result<BTreeMap<NaiveDate, f64>> {
    let mut splits = BTreeMap::new();
    for (date, ratio) in rows {
        if splits.insert(date, ratio).is_some() {
            return Err(Error::DuplicateDate(date));
        }
    }
    Ok(splits)
}

/// In-memory builder for a [`PriceHistory`].
///
/// Bars may be added in any order; they are sorted by date on build.
///
/// ### Example
/// ```rust
/// use swing_bts::prelude::*;
/// use chrono::NaiveDate;
///
/// let day = |d| NaiveDate::from_ymd_opt(2015, 6, d).unwrap();
/// let history = PriceHistoryBuilder::builder()
///     .bar(day(2), (50.0, 51.0, 49.0, 50.5))
///     .bar(day(1), (100.0, 102.0, 99.0, 101.0))
///     .split(day(2), 2.0)
///     .build()
///     .unwrap();
///
/// assert_eq!(history.start_date(), day(1));
/// assert_eq!(history.bar(1).unwrap().close_normalized(), 101.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PriceHistoryBuilder {
    bars: Vec<(NaiveDate, PriceBar)>,
    splits: Vec<(NaiveDate, f64)>,
    range: Option<(NaiveDate, NaiveDate)>,
}

impl PriceHistoryBuilder {
    /// Creates an empty builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Adds the bar traded on `date`.
    pub fn bar(mut self, date: NaiveDate, bar: impl Into<PriceBar>) -> Self {
        self.bars.push((date, bar.into()));
        self
    }

    /// Adds a split effective on `date`.
    pub fn split(mut self, date: NaiveDate, ratio: f64) -> Self {
        self.splits.push((date, ratio));
        self
    }

    /// Declares the bounds of the series. Defaults to the first and last bar dates.
    pub fn range(mut self, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        self.range = Some((start_date, end_date));
        self
    }

    /// Builds the history.
    ///
    /// ### Returns
    /// The normalized history, or an error when the data is empty, duplicated or invalid.
    pub fn build(self) -> Result<PriceHistory> {
        match self.range {
            Some((start_date, end_date)) => {
                let raw = self.load()?;
                PriceHistory::new(raw.bars, raw.date_index, raw.splits, start_date, end_date)
            }
            None => PriceHistory::load(&self),
        }
    }
}

impl HistoryLoader for PriceHistoryBuilder {
    fn load(&self) -> Result<RawHistory> {
        let (bars, date_index) = index_bars(self.bars.clone())?;
        let splits = index_splits(self.splits.iter().copied())?;
        Ok(RawHistory {
            bars,
            date_index,
            splits,
        })
    }
}

#[cfg(feature = "loader")]
mod csv_loader {
    use std::path::{Path, PathBuf};

    use chrono::NaiveDate;
    use csv::{ReaderBuilder, Trim};
    use serde::Deserialize;
    use tracing::{debug, info};

    use super::{HistoryLoader, RawHistory, index_bars, index_splits};
    use crate::engine::PriceBar;
    use crate::errors::{Error, Result};

    /// One row of a daily price file. Extra columns (`Volume`, `Adj Close`) are ignored.
    #[derive(Debug, Deserialize)]
    struct PriceRow {
        #[serde(rename = "Date")]
        date: NaiveDate,
        #[serde(rename = "Open")]
        open: f64,
        #[serde(rename = "High")]
        high: f64,
        #[serde(rename = "Low")]
        low: f64,
        #[serde(rename = "Close")]
        close: f64,
    }

    /// Reads a daily price file and an optional split file.
    ///
    /// The price file has a `Date,Open,High,Low,Close[,Volume,Adj Close]` header and `YYYY-MM-DD` dates, in any
    /// row order (downloads usually list the newest day first). The split file has a header line followed by
    /// `SPLIT, YYYYMMDD, N:D` rows, each giving a split ratio of `N / D` effective on that date.
    #[derive(Debug, Clone)]
    pub struct CsvHistoryLoader {
        prices: PathBuf,
        splits: Option<PathBuf>,
    }

    impl CsvHistoryLoader {
        /// Creates a loader for the price file at `prices`.
        pub fn new(prices: impl Into<PathBuf>) -> Self {
            Self {
                prices: prices.into(),
                splits: None,
            }
        }

        /// Adds the split file at `splits`.
        pub fn with_splits(mut self, splits: impl Into<PathBuf>) -> Self {
            self.splits = Some(splits.into());
            self
        }

        fn read_prices(path: &Path) -> Result<Vec<(NaiveDate, PriceBar)>> {
            let mut reader = ReaderBuilder::new().has_headers(true).trim(Trim::All).from_path(path)?;
            let rows = reader
                .deserialize::<PriceRow>()
                .map(|row| row.map(|row| (row.date, PriceBar::from((row.open, row.high, row.low, row.close)))))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            debug!(path = %path.display(), rows = rows.len(), "prices read");
            Ok(rows)
        }

        fn read_splits(path: &Path) -> Result<Vec<(NaiveDate, f64)>> {
            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .trim(Trim::All)
                .flexible(true)
                .from_path(path)?;

            let mut splits = Vec::new();
            for record in reader.records() {
                let record = record?;
                let field = |i: usize| {
                    record
                        .get(i)
                        .ok_or_else(|| Error::Parse(format!("split row {record:?}: missing column {i}")))
                };
                if !field(0)?.eq_ignore_ascii_case("SPLIT") {
                    continue;
                }
                let raw_date = field(1)?;
                let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d")
                    .map_err(|e| Error::Parse(format!("split date {raw_date:?}: {e}")))?;
                splits.push((date, parse_ratio(field(2)?)?));
            }
            debug!(path = %path.display(), splits = splits.len(), "splits read");
            Ok(splits)
        }
    }

    /// Parses an `N:D` split ratio into `N / D`.
    pub(crate) fn parse_ratio(value: &str) -> Result<f64> {
        let invalid = || Error::Parse(format!("split ratio {value:?}: expected N:D"));
        let (numerator, denominator) = value.split_once(':').ok_or_else(invalid)?;
        let numerator = numerator.trim().parse::<f64>().map_err(|_| invalid())?;
        let denominator = denominator.trim().parse::<f64>().map_err(|_| invalid())?;
        if denominator == 0.0 {
            return Err(invalid());
        }
        Ok(numerator / denominator)
    }

    impl HistoryLoader for CsvHistoryLoader {
        fn load(&self) -> Result<RawHistory> {
            let (bars, date_index) = index_bars(Self::read_prices(&self.prices)?)?;
            let splits = match &self.splits {
                Some(path) => index_splits(Self::read_splits(path)?)?,
                None => Default::default(),
            };
            info!(path = %self.prices.display(), bars = bars.len(), splits = splits.len(), "history loaded");
            Ok(RawHistory {
                bars,
                date_index,
                splits,
            })
        }
    }
}
