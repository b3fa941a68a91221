//! Zig-zag reversal counting.
//!
//! A [`ZigZag`] keeps a ratchet base price and a stack of swing directions. Each price fed through
//! [`ZigZag::step`] moves the base toward the price in discrete threshold-sized steps. A step in the
//! same direction as the top of the stack extends the run; a step against it cancels one entry and
//! counts one confirmed reversal. Moves smaller than the threshold never touch the base, so noise
//! inside the band is ignored.

use tracing::debug;

use crate::RatioCalculus;

/// Direction of one threshold crossing.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swing {
    /// Base moved up.
    Up,
    /// Base moved down.
    Down,
}

/// Down-move threshold matching an up-move threshold `t`: `t / (1 + t)`.
///
/// Going up by `t` then down by `down_threshold(t)` lands back on the starting price.
pub fn down_threshold(threshold: f64) -> f64 {
    threshold / (1.0 + threshold)
}

/// Incremental reversal counter over a price path.
#[derive(Debug, Clone)]
pub struct ZigZag {
    threshold: f64,
    base_price: f64,
    swings: Vec<Swing>,
}

impl ZigZag {
    /// Creates a counter anchored at `base_price` with an up-move threshold of `threshold` (e.g. 0.05).
    pub fn new(base_price: f64, threshold: f64) -> Self {
        Self {
            threshold,
            base_price,
            swings: Vec::new(),
        }
    }

    /// Returns the current ratchet base.
    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// Returns the pending swing stack, bottom first.
    pub fn swings(&self) -> &[Swing] {
        &self.swings
    }

    /// Threshold that applies to a move in `swing` direction.
    ///
    /// The down threshold is `T / (1 + T)` so that a full up-step followed by a move back to the
    /// starting level is exactly one down-step.
    pub fn threshold_for(&self, swing: Swing) -> f64 {
        match swing {
            Swing::Up => self.threshold,
            Swing::Down => down_threshold(self.threshold),
        }
    }

    fn distance(&self, price: f64) -> f64 {
        (price - self.base_price).abs() / self.base_price
    }

    /// Feeds one price and returns the number of reversals it confirmed.
    pub fn step(&mut self, price: f64) -> u64 {
        let swing = if price > self.base_price { Swing::Up } else { Swing::Down };
        let threshold = self.threshold_for(swing);

        let mut count = 0;
        while self.distance(price) >= threshold {
            self.base_price = match swing {
                Swing::Up => self.base_price.add_ratio(threshold),
                Swing::Down => self.base_price.sub_ratio(threshold),
            };

            match self.swings.last() {
                Some(top) if *top != swing => {
                    self.swings.pop();
                    count += 1;
                }
                _ => self.swings.push(swing),
            }
        }

        if count > 0 {
            debug!(price, base = self.base_price, count, depth = self.swings.len(), "zigzag reversal");
        }
        count
    }
}

/// Builds the reversal prefix-sum list for a sequence of `(open, close)` pairs.
///
/// Index `i` holds the total reversals observed through bar `i`. The counter is anchored at the
/// first open; every bar feeds its open then its close.
pub fn fluctuation_counts<I>(prices: I, threshold: f64) -> Vec<u64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut prices = prices.into_iter().peekable();
    let Some(&(first_open, _)) = prices.peek() else {
        return Vec::new();
    };

    let mut zigzag = ZigZag::new(first_open, threshold);
    let mut total = 0;
    prices
        .map(|(open, close)| {
            total += zigzag.step(open) + zigzag.step(close);
            total
        })
        .collect()
}
