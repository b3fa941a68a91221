//! # Swing BTS: zig-zag swing ladder backtesting
//!
//! **Swing BTS** replays a daily OHLC price history of one instrument, detects an entry signal from the
//! statistical shape of recent price action, and simulates a laddered limit-order strategy against the history
//! to produce a day-by-day account valuation.
//!
//! ## Core Components
//! | Component   | Description                                                                                     |
//! |-------------|-------------------------------------------------------------------------------------------------|
//! | **`PriceBar`** | Raw OHLC prices of one trading day.                                                          |
//! | **`PriceHistory`** | Ordered bars, split schedule, zig-zag fluctuation counts and windowed percentiles.       |
//! | **`ZigZag`** | Incremental reversal counter with a ratchet base price and threshold hysteresis.               |
//! | **`BuyPointRule`** | Entry signal combining the four windowed percentiles.                                    |
//! | **`Order`**  | Resting limit order of a buy or sell ladder.                                                   |
//! | **`TransactionSimulator`** | Day-stepped order matching with split adjustment and re-laddering.               |
//! | **`Metrics`** | Drawdown, Sharpe ratio and round-trip statistics *(feature `metrics`)*.                       |
//! | **`Optimizer`** | One independent simulation per instrument on a thread pool *(feature `optimizer`)*.         |
//!
//! ## The Fluctuation Count
//! Each bar feeds its split-normalized open then close into a [`ZigZag`](engine::ZigZag). The base price only moves
//! in threshold-sized steps (5% up, `5% / 1.05` down), so random walks inside the band never count. A step against
//! the direction of the previous step is one confirmed reversal. The running total is kept as a prefix sum so any
//! window is answered with one subtraction.
//!
//! ## The Ladder
//! 1. **Flat**: on the first day the entry signal fires, one buy order sized at 10% of cash is posted at the
//!    previous close.
//! 2. **Engaged**: every buy fill posts a sell 5% above the fill; every sell fill posts a buy one compounded step
//!    below it. Orders become active the day after they are posted.
//! 3. A sell that empties the sell ladder closes the round trip and re-arms the entry signal.
//!
//! ## Getting Started
//! ```rust
//! use swing_bts::prelude::*;
//! use chrono::NaiveDate;
//!
//! let day = |d| NaiveDate::from_ymd_opt(2015, 6, d).unwrap();
//! let history = PriceHistoryBuilder::builder()
//!     .bar(day(1), (100.0, 104.0, 98.0, 101.0))
//!     .bar(day(2), (101.0, 103.0, 95.0, 96.0))
//!     .bar(day(3), (96.0, 99.0, 94.0, 98.0))
//!     .build()
//!     .unwrap();
//!
//! let mut simulator = TransactionSimulator::new(history, STARTING_CASH).unwrap();
//! simulator.run(day(1)).unwrap();
//!
//! for valuation in simulator.trace() {
//!     println!("{} {:.2}", valuation.date, valuation.total);
//! }
//! ```
//!
//! ## Error Handling
//! Lookups before the first bar fail with [`Error::LookupFailure`](errors::Error::LookupFailure) and abort the run.
//! Percentile windows whose denominator is zero return
//! [`Error::DegenerateWindow`](errors::Error::DegenerateWindow); the default entry rule reads those as "no signal".
//!
//! ## License
//! MIT
#![warn(missing_docs)]

/// Price history, zig-zag counting, entry signals, orders and the transaction simulator.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Loading price histories from storage.
pub mod loader;

/// Utility functions and helpers.
mod utils;

/// Performance metrics: drawdown, Sharpe ratio, round trips, etc.
#[cfg(feature = "metrics")]
pub mod metrics;

/// Independent simulations over several instruments.
#[cfg(feature = "optimizer")]
pub mod optimizer;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::loader::*;

    #[cfg(feature = "metrics")]
    pub use crate::metrics::*;

    #[cfg(feature = "optimizer")]
    pub use crate::optimizer::*;
}

use std::ops::{Add, Div, Mul, Sub};

/// Trait for ratio-based price calculations.
///
/// Ratios are fractions: `0.05` is 5%.
pub trait RatioCalculus<Rhs = Self> {
    /// Returns the value increased by `ratio` (`value × (1 + ratio)`).
    fn add_ratio(self, ratio: Rhs) -> Self;

    /// Returns the value decreased by `ratio` (`value × (1 - ratio)`).
    fn sub_ratio(self, ratio: Rhs) -> Self;

    /// Returns the relative change from the value to `new`.
    fn change(self, new: Self) -> Self;
}

impl RatioCalculus for f64 {
    fn add_ratio(self, ratio: Self) -> Self {
        self.mul(ratio.add(1.0))
    }

    fn sub_ratio(self, ratio: Self) -> Self {
        self.mul(1.0_f64.sub(ratio))
    }

    fn change(self, new: Self) -> Self {
        new.sub(self).div(self)
    }
}
