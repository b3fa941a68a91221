use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::engine::{AdjustedBar, BuyPointRule, EntrySignal, PriceBar, fluctuation_counts};
use crate::errors::{Error, Result};
use crate::loader::HistoryLoader;
use crate::utils::calendar_days;

/// Minimum move, as a fraction of the base price, that counts as a zig-zag step.
pub const FLUCTUATION_THRESHOLD: f64 = 0.05;

/// Intraday range, as a fraction of the low, above which a day counts as active.
pub const ACTIVE_DAY_THRESHOLD: f64 = 0.05;

/// A resolved range of bar indices, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Index of the first bar.
    pub start: usize,
    /// Index of the last bar.
    pub end: usize,
}

impl Window {
    /// Number of trading days covered.
    pub fn days(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Daily price history of one instrument.
///
/// Bars are kept raw. Split ratios are folded into one cumulative multiplier per bar at construction,
/// and every indicator reads the normalized (raw × multiplier) prices so that a split never looks like
/// a price move.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    bars: Vec<PriceBar>,
    split_factors: Vec<f64>,
    date_index: HashMap<NaiveDate, usize>,
    splits: BTreeMap<NaiveDate, f64>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    fluctuation_counts: OnceLock<Vec<u64>>,
}

impl PriceHistory {
    /// Creates a history over `[start_date, end_date]` and normalizes it against the split schedule.
    ///
    /// ### Arguments
    /// * `bars` - Chronological bars, oldest first.
    /// * `date_index` - Calendar date of each bar mapped to its position in `bars`.
    /// * `splits` - Split ratio per effective date (e.g. `5.0` for a 5-for-1 split, `0.2` for 1-for-5).
    /// * `start_date` / `end_date` - Declared bounds of the series.
    ///
    /// ### Returns
    /// The history, or an error when the data is empty or inconsistent.
    pub fn new(
        bars: Vec<PriceBar>,
        date_index: HashMap<NaiveDate, usize>,
        splits: BTreeMap<NaiveDate, f64>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self> {
        if bars.is_empty() {
            return Err(Error::HistoryEmpty);
        }
        if start_date > end_date {
            return Err(Error::InvalidDateRange(start_date, end_date));
        }

        for (&date, &index) in &date_index {
            let bar = bars.get(index).ok_or(Error::IndexOutOfRange {
                date,
                index,
                len: bars.len(),
            })?;
            if !bar.is_valid() {
                return Err(Error::InvalidBar(date));
            }
            if !bar.is_sane() {
                warn!(%date, ?bar, "bar prices out of order");
            }
        }

        for (&date, &ratio) in &splits {
            if ratio <= 0.0 || !ratio.is_finite() {
                return Err(Error::InvalidSplitRatio(date, ratio));
            }
        }

        let mut split_factors = vec![1.0; bars.len()];
        let mut multiplier = 1.0;
        for day in calendar_days(start_date, end_date) {
            if let Some(ratio) = splits.get(&day) {
                multiplier *= ratio;
            }
            if let Some(&index) = date_index.get(&day) {
                split_factors[index] = multiplier;
            }
        }

        Ok(Self {
            bars,
            split_factors,
            date_index,
            splits,
            start_date,
            end_date,
            fluctuation_counts: OnceLock::new(),
        })
    }

    /// Loads a history from `loader`, bounded by its first and last indexed dates.
    pub fn load<L: HistoryLoader + ?Sized>(loader: &L) -> Result<Self> {
        let raw = loader.load()?;
        let start_date = raw.date_index.keys().min().copied().ok_or(Error::HistoryEmpty)?;
        let end_date = raw.date_index.keys().max().copied().ok_or(Error::HistoryEmpty)?;
        Self::new(raw.bars, raw.date_index, raw.splits, start_date, end_date)
    }

    /// Returns the number of bars.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always `false`: a history holds at least one bar.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Returns the first date of the series.
    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    /// Returns the last date of the series.
    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Returns an iterator over the split schedule.
    pub fn splits(&self) -> std::collections::btree_map::Iter<'_, NaiveDate, f64> {
        self.splits.iter()
    }

    /// Returns the split ratio effective on `date`, if any.
    pub fn split_ratio(&self, date: NaiveDate) -> Option<f64> {
        self.splits.get(&date).copied()
    }

    /// Returns the bar at `index` with its split multiplier.
    pub fn bar(&self, index: usize) -> Option<AdjustedBar> {
        let bar = self.bars.get(index)?;
        let factor = self.split_factors.get(index)?;
        Some(bar.adjusted(*factor))
    }

    /// Returns an iterator over every bar with its split multiplier.
    pub fn adjusted_bars(&self) -> impl Iterator<Item = AdjustedBar> + '_ {
        self.bars
            .iter()
            .zip(self.split_factors.iter())
            .map(|(bar, factor)| bar.adjusted(*factor))
    }

    /// Returns `true` when a bar exists exactly on `date`.
    pub fn is_market_open(&self, date: NaiveDate) -> bool {
        self.date_index.contains_key(&date)
    }

    /// Returns the bar traded exactly on `date`.
    pub fn bar_on(&self, date: NaiveDate) -> Option<AdjustedBar> {
        self.date_index.get(&date).and_then(|&index| self.bar(index))
    }

    /// Index of the bar at or immediately before `date`, scanning back one calendar day at a time.
    pub fn resolve_index(&self, date: NaiveDate) -> Option<usize> {
        let mut day = date.min(self.end_date);
        while day >= self.start_date {
            if let Some(&index) = self.date_index.get(&day) {
                return Some(index);
            }
            day = day.pred_opt()?;
        }
        None
    }

    /// Resolves the window of `size` trading days ending at or before `date`.
    ///
    /// The window spans `max(0, end - size)..=end`; `None` spans the whole history up to `end`.
    pub fn window(&self, date: NaiveDate, size: Option<usize>) -> Result<Window> {
        let end = self.resolve_index(date).ok_or(Error::LookupFailure(date))?;
        let start = size.map_or(0, |size| end.saturating_sub(size));
        Ok(Window { start, end })
    }

    /// Returns the bar at or immediately before `date`.
    pub fn get_stock_price(&self, date: NaiveDate) -> Result<AdjustedBar> {
        self.resolve_index(date)
            .and_then(|index| self.bar(index))
            .ok_or(Error::LookupFailure(date))
    }

    /// Returns the raw close of the bar at or immediately before `date`.
    pub fn previous_close(&self, date: NaiveDate) -> Result<f64> {
        Ok(self.get_stock_price(date)?.raw().close())
    }

    /// Product of every split ratio effective from the start of the history through `date`.
    pub fn split_multiplier(&self, date: NaiveDate) -> f64 {
        if date < self.start_date {
            return 1.0;
        }
        self.splits.range(self.start_date..=date).map(|(_, ratio)| ratio).product()
    }

    /// Close of the bar at or before `date`, restated in the share scale in force on `date`.
    ///
    /// Equals [`previous_close`](Self::previous_close) unless a split takes effect after that bar and on or
    /// before `date` (e.g. a weekend split), in which case the close is divided by those ratios.
    pub fn restated_close(&self, date: NaiveDate) -> Result<f64> {
        let bar = self.get_stock_price(date)?;
        Ok(bar.close_normalized() / self.split_multiplier(date))
    }

    /// Reversal prefix sums, computed on first use.
    pub fn fluctuation_counts(&self) -> &[u64] {
        self.fluctuation_counts.get_or_init(|| {
            let prices = self
                .adjusted_bars()
                .map(|bar| (bar.open_normalized(), bar.close_normalized()));
            let counts = fluctuation_counts(prices, FLUCTUATION_THRESHOLD);
            debug!(
                bars = counts.len(),
                reversals = counts.last().copied().unwrap_or_default(),
                "fluctuation counts computed"
            );
            counts
        })
    }

    /// Reversals per trading day over the window.
    pub fn fluctuation_percentile(&self, date: NaiveDate, window: Option<usize>) -> Result<f64> {
        let window = self.window(date, window)?;
        let counts = self.fluctuation_counts();
        let reversals = counts[window.end] - counts[window.start];
        Ok(reversals as f64 / window.days() as f64)
    }

    /// Fraction of days in the window whose intraday range exceeds [`ACTIVE_DAY_THRESHOLD`].
    pub fn active_day_count_percentile(&self, date: NaiveDate, window: Option<usize>) -> Result<f64> {
        let window = self.window(date, window)?;
        let active = (window.start..=window.end)
            .filter_map(|index| self.bar(index))
            .filter(|bar| bar.normalized().is_active(ACTIVE_DAY_THRESHOLD))
            .count();
        Ok(active as f64 / window.days() as f64)
    }

    /// Position of the window's last close inside the window's `[min low, max high]` range.
    ///
    /// `0.0` is the window low, `1.0` the window high.
    pub fn end_price_percentile(&self, date: NaiveDate, window: Option<usize>) -> Result<f64> {
        let window = self.window(date, window)?;
        let (low, high) = (window.start..=window.end)
            .filter_map(|index| self.bar(index))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), bar| {
                (low.min(bar.low_normalized()), high.max(bar.high_normalized()))
            });

        let range = high - low;
        if range <= 0.0 || !range.is_finite() {
            return Err(Error::DegenerateWindow {
                date,
                indicator: "end price",
            });
        }

        let last = self.bar(window.end).ok_or(Error::LookupFailure(date))?;
        Ok((last.close_normalized() - low) / range)
    }

    /// Fraction of day-over-day close decreases in the window.
    pub fn price_down_percentile(&self, date: NaiveDate, window: Option<usize>) -> Result<f64> {
        let window = self.window(date, window)?;
        if window.start == window.end {
            return Err(Error::DegenerateWindow {
                date,
                indicator: "price down",
            });
        }

        let closes = (window.start..=window.end)
            .filter_map(|index| self.bar(index))
            .map(|bar| bar.close_normalized())
            .collect::<Vec<_>>();
        let downs = closes.windows(2).filter(|pair| pair[1] < pair[0]).count();
        Ok(downs as f64 / (window.end - window.start) as f64)
    }

    /// Evaluates the default [`BuyPointRule`] on `date`.
    pub fn is_buy_point(&self, date: NaiveDate) -> Result<bool> {
        BuyPointRule::default().is_entry(self, date)
    }
}
