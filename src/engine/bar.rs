#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Raw (unadjusted) OHLC prices of one trading day.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl From<(f64, f64, f64, f64)> for PriceBar {
    fn from((open, high, low, close): (f64, f64, f64, f64)) -> Self {
        Self { open, high, low, close }
    }
}

impl PriceBar {
    /// Returns the opening price.
    pub fn open(&self) -> f64 {
        self.open
    }

    /// Returns the highest price.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Returns the lowest price.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Returns the closing price.
    pub fn close(&self) -> f64 {
        self.close
    }

    /// Returns `true` when the intraday range exceeds `threshold` of the low.
    pub fn is_active(&self, threshold: f64) -> bool {
        (self.high - self.low) / self.low > threshold
    }

    /// Every price is positive and finite.
    pub(crate) fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|p| p.is_finite() && *p > 0.0)
    }

    /// `low <= open, close <= high`.
    pub(crate) fn is_sane(&self) -> bool {
        self.low <= self.open && self.low <= self.close && self.high >= self.open && self.high >= self.close
    }

    /// Pairs the bar with its cumulative split multiplier.
    pub fn adjusted(self, split_factor: f64) -> AdjustedBar {
        AdjustedBar { bar: self, split_factor }
    }
}

/// A [`PriceBar`] seen through its cumulative split multiplier.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustedBar {
    bar: PriceBar,
    split_factor: f64,
}

impl AdjustedBar {
    /// Returns the raw bar.
    pub fn raw(&self) -> &PriceBar {
        &self.bar
    }

    /// Returns the bar with every price multiplied by the split factor.
    pub fn normalized(&self) -> PriceBar {
        PriceBar::from((
            self.open_normalized(),
            self.high_normalized(),
            self.low_normalized(),
            self.close_normalized(),
        ))
    }

    /// Returns the cumulative split multiplier of the bar's date.
    pub fn split_factor(&self) -> f64 {
        self.split_factor
    }

    /// Returns the split-normalized open.
    pub fn open_normalized(&self) -> f64 {
        self.bar.open * self.split_factor
    }

    /// Returns the split-normalized high.
    pub fn high_normalized(&self) -> f64 {
        self.bar.high * self.split_factor
    }

    /// Returns the split-normalized low.
    pub fn low_normalized(&self) -> f64 {
        self.bar.low * self.split_factor
    }

    /// Returns the split-normalized close.
    pub fn close_normalized(&self) -> f64 {
        self.bar.close * self.split_factor
    }
}

#[cfg(test)]
#[test]
fn bar_accessors() {
    let bar = PriceBar::from((100.0, 110.0, 95.0, 105.0));
    assert_eq!(bar.open(), 100.0);
    assert_eq!(bar.high(), 110.0);
    assert_eq!(bar.low(), 95.0);
    assert_eq!(bar.close(), 105.0);
}

#[cfg(test)]
#[test]
fn bar_is_active() {
    // (110 - 100) / 100 = 10%
    let bar = PriceBar::from((100.0, 110.0, 100.0, 105.0));
    assert!(bar.is_active(0.05));
    assert!(!bar.is_active(0.1));
    assert!(!bar.is_active(0.2));
}

#[cfg(test)]
#[test]
fn bar_validity() {
    assert!(PriceBar::from((1.0, 2.0, 0.5, 1.5)).is_valid());
    assert!(!PriceBar::from((1.0, 2.0, 0.0, 1.5)).is_valid());
    assert!(!PriceBar::from((f64::NAN, 2.0, 0.5, 1.5)).is_valid());
    assert!(!PriceBar::from((1.0, f64::INFINITY, 0.5, 1.5)).is_valid());
}

#[cfg(test)]
#[test]
fn bar_sanity() {
    assert!(PriceBar::from((100.0, 110.0, 95.0, 105.0)).is_sane());
    assert!(!PriceBar::from((100.0, 99.0, 95.0, 98.0)).is_sane());
    assert!(!PriceBar::from((100.0, 110.0, 101.0, 105.0)).is_sane());
}

#[cfg(test)]
#[test]
fn adjusted_bar_normalizes() {
    let adjusted = PriceBar::from((10.0, 12.0, 8.0, 11.0)).adjusted(5.0);
    assert_eq!(adjusted.split_factor(), 5.0);
    assert_eq!(adjusted.open_normalized(), 50.0);
    assert_eq!(adjusted.high_normalized(), 60.0);
    assert_eq!(adjusted.low_normalized(), 40.0);
    assert_eq!(adjusted.close_normalized(), 55.0);
    assert_eq!(adjusted.raw().close(), 11.0);
    assert_eq!(adjusted.normalized(), PriceBar::from((50.0, 60.0, 40.0, 55.0)));
}
