use chrono::NaiveDate;
use tracing::debug;

use crate::engine::PriceHistory;
use crate::errors::{Error, Result};

/// Minimum reversals per trading day for a buy point.
pub const BUY_POINT_FLUCTUATION_PERCENTILE: f64 = 0.2;
/// Minimum share of active days for a buy point.
pub const BUY_POINT_ACTIVE_DAY_PERCENTILE: f64 = 0.3;
/// Maximum position of the last close inside the window range for a buy point.
pub const BUY_POINT_END_PRICE_PERCENTILE: f64 = 0.2;
/// Maximum share of down closes for a buy point.
pub const BUY_POINT_PRICE_DOWN_PERCENTILE: f64 = 0.5;

/// Trading days covered by the fluctuation percentile.
pub const FLUCTUATION_WINDOW: usize = 90;
/// Trading days covered by the active-day percentile.
pub const ACTIVE_DAY_WINDOW: usize = 90;
/// Trading days covered by the end-price percentile.
pub const END_PRICE_WINDOW: usize = 90;
/// Trading days covered by the price-down percentile.
pub const PRICE_DOWN_WINDOW: usize = 30;

/// Decides whether a flat simulator should open a ladder on a given day.
pub trait EntrySignal {
    /// Returns `true` when `date` is an entry day.
    fn is_entry(&self, history: &PriceHistory, date: NaiveDate) -> Result<bool>;
}

impl<F> EntrySignal for F
where
    F: Fn(&PriceHistory, NaiveDate) -> Result<bool>,
{
    fn is_entry(&self, history: &PriceHistory, date: NaiveDate) -> Result<bool> {
        self(history, date)
    }
}

/// The four windowed percentiles read on one day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyPointReading {
    /// Reversals per trading day.
    pub fluctuation: f64,
    /// Share of active days.
    pub active_day: f64,
    /// Last close inside the window range.
    pub end_price: f64,
    /// Share of down closes.
    pub price_down: f64,
}

/// Buy point: a choppy, active market whose price sits near the bottom of its recent range
/// without a persistent down trend.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuyPointRule {
    /// Minimum reversals per trading day.
    pub fluctuation_min: f64,
    /// Minimum share of active days.
    pub active_day_min: f64,
    /// Maximum position of the last close in the window range.
    pub end_price_max: f64,
    /// Maximum share of down closes.
    pub price_down_max: f64,
    /// Trading days read by the fluctuation percentile.
    pub fluctuation_window: usize,
    /// Trading days read by the active-day percentile.
    pub active_day_window: usize,
    /// Trading days read by the end-price percentile.
    pub end_price_window: usize,
    /// Trading days read by the price-down percentile.
    pub price_down_window: usize,
}

impl Default for BuyPointRule {
    fn default() -> Self {
        Self {
            fluctuation_min: BUY_POINT_FLUCTUATION_PERCENTILE,
            active_day_min: BUY_POINT_ACTIVE_DAY_PERCENTILE,
            end_price_max: BUY_POINT_END_PRICE_PERCENTILE,
            price_down_max: BUY_POINT_PRICE_DOWN_PERCENTILE,
            fluctuation_window: FLUCTUATION_WINDOW,
            active_day_window: ACTIVE_DAY_WINDOW,
            end_price_window: END_PRICE_WINDOW,
            price_down_window: PRICE_DOWN_WINDOW,
        }
    }
}

/// Maps a degenerate window to `None` and keeps every other error.
fn defined(value: Result<f64>) -> Result<Option<f64>> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(Error::DegenerateWindow { date, indicator }) => {
            debug!(%date, indicator, "degenerate window");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl BuyPointRule {
    /// Reads the four percentiles on `date`.
    ///
    /// ### Returns
    /// `None` when any of the windows is degenerate, or a lookup error when `date` precedes the history.
    pub fn evaluate(&self, history: &PriceHistory, date: NaiveDate) -> Result<Option<BuyPointReading>> {
        let fluctuation = defined(history.fluctuation_percentile(date, Some(self.fluctuation_window)))?;
        let active_day = defined(history.active_day_count_percentile(date, Some(self.active_day_window)))?;
        let end_price = defined(history.end_price_percentile(date, Some(self.end_price_window)))?;
        let price_down = defined(history.price_down_percentile(date, Some(self.price_down_window)))?;

        Ok(match (fluctuation, active_day, end_price, price_down) {
            (Some(fluctuation), Some(active_day), Some(end_price), Some(price_down)) => Some(BuyPointReading {
                fluctuation,
                active_day,
                end_price,
                price_down,
            }),
            _ => None,
        })
    }

    /// Returns `true` when every percentile of `reading` is on the passing side of its threshold.
    pub fn passes(&self, reading: &BuyPointReading) -> bool {
        reading.fluctuation >= self.fluctuation_min
            && reading.active_day >= self.active_day_min
            && reading.end_price <= self.end_price_max
            && reading.price_down <= self.price_down_max
    }
}

impl EntrySignal for BuyPointRule {
    fn is_entry(&self, history: &PriceHistory, date: NaiveDate) -> Result<bool> {
        let Some(reading) = self.evaluate(history, date)? else {
            return Ok(false);
        };
        let passes = self.passes(&reading);
        debug!(
            %date,
            fluctuation = reading.fluctuation,
            active_day = reading.active_day,
            end_price = reading.end_price,
            price_down = reading.price_down,
            passes,
            "buy point"
        );
        Ok(passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PriceHistoryBuilder;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 6, d).unwrap()
    }

    fn short_rule() -> BuyPointRule {
        BuyPointRule {
            fluctuation_window: 5,
            active_day_window: 5,
            end_price_window: 5,
            price_down_window: 5,
            ..Default::default()
        }
    }

    /// Swings 100 -> 107 -> 100 -> 107 -> 100, closing near the low of the window.
    fn choppy_history() -> PriceHistory {
        PriceHistoryBuilder::builder()
            .bar(day(1), (100.0, 101.0, 99.0, 100.0))
            .bar(day(2), (100.0, 108.0, 99.0, 107.0))
            .bar(day(3), (107.0, 108.0, 99.0, 100.0))
            .bar(day(4), (100.0, 108.0, 99.0, 107.0))
            .bar(day(5), (107.0, 108.0, 99.0, 100.0))
            .bar(day(8), (100.0, 107.0, 99.0, 100.5))
            .build()
            .unwrap()
    }

    #[test]
    fn default_rule_uses_documented_constants() {
        let rule = BuyPointRule::default();
        assert_eq!(rule.fluctuation_min, 0.2);
        assert_eq!(rule.active_day_min, 0.3);
        assert_eq!(rule.end_price_max, 0.2);
        assert_eq!(rule.price_down_max, 0.5);
        assert_eq!(
            (rule.fluctuation_window, rule.active_day_window, rule.end_price_window, rule.price_down_window),
            (90, 90, 90, 30)
        );
    }

    #[test]
    fn passes_checks_every_threshold() {
        let rule = BuyPointRule::default();
        let reading = BuyPointReading {
            fluctuation: 0.2,
            active_day: 0.3,
            end_price: 0.2,
            price_down: 0.5,
        };
        assert!(rule.passes(&reading));
        assert!(!rule.passes(&BuyPointReading { fluctuation: 0.19, ..reading }));
        assert!(!rule.passes(&BuyPointReading { active_day: 0.29, ..reading }));
        assert!(!rule.passes(&BuyPointReading { end_price: 0.21, ..reading }));
        assert!(!rule.passes(&BuyPointReading { price_down: 0.51, ..reading }));
    }

    #[test]
    fn choppy_market_near_low_is_buy_point() {
        let history = choppy_history();
        let rule = short_rule();
        let reading = rule.evaluate(&history, day(8)).unwrap().unwrap();
        // reversals on days 3 and 5 over six days
        assert_eq!(reading.fluctuation, 2.0 / 6.0);
        assert_eq!(reading.active_day, 5.0 / 6.0);
        assert_eq!(reading.end_price, 1.5 / 9.0);
        // closes 100 107 100 107 100 100.5 -> two downs in five steps
        assert_eq!(reading.price_down, 0.4);
        assert!(rule.is_entry(&history, day(8)).unwrap());
        // the weekend resolves to day 5, whose close sits at the window low
        assert!(rule.is_entry(&history, day(6)).unwrap());
    }

    #[test]
    fn quiet_market_is_not_buy_point() {
        let history = PriceHistoryBuilder::builder()
            .bar(day(1), (100.0, 101.0, 99.0, 100.0))
            .bar(day(2), (100.0, 101.0, 99.0, 99.5))
            .bar(day(3), (99.5, 100.5, 98.5, 99.0))
            .build()
            .unwrap();
        assert!(!short_rule().is_entry(&history, day(3)).unwrap());
        assert!(!history.is_buy_point(day(3)).unwrap());
    }

    #[test]
    fn degenerate_window_is_not_buy_point() {
        let history = choppy_history();
        // first day: the price-down window holds a single bar
        assert_eq!(short_rule().evaluate(&history, day(1)).unwrap(), None);
        assert!(!short_rule().is_entry(&history, day(1)).unwrap());
    }

    #[test]
    fn lookup_failure_propagates() {
        let history = choppy_history();
        let before = NaiveDate::from_ymd_opt(2015, 5, 31).unwrap();
        assert!(matches!(short_rule().is_entry(&history, before), Err(Error::LookupFailure(_))));
    }

    #[test]
    fn closure_signal() {
        let history = choppy_history();
        let signal = |_: &PriceHistory, date: NaiveDate| -> Result<bool> { Ok(date == day(3)) };
        assert!(signal.is_entry(&history, day(3)).unwrap());
        assert!(!signal.is_entry(&history, day(4)).unwrap());
    }
}
