use chrono::NaiveDate;

/// Result type used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading a history or running a simulation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The price history is empty. Simulation requires at least one price bar.
    #[error("History data is empty: simulation requires at least one price bar")]
    HistoryEmpty,

    /// No price bar exists at or before the requested date.
    #[error("No price bar at or before {0}")]
    LookupFailure(NaiveDate),

    /// A percentile's denominator is zero (single-day window or flat price range).
    #[error("Degenerate {indicator} window for {date}")]
    DegenerateWindow {
        /// Date the window was requested for.
        date: NaiveDate,
        /// Name of the indicator.
        indicator: &'static str,
    },

    /// A price bar holds a non-positive or non-finite value.
    #[error("Invalid price bar on {0}: prices must be positive and finite")]
    InvalidBar(NaiveDate),

    /// A split ratio is non-positive or non-finite.
    #[error("Invalid split ratio on {0} (got: {1})")]
    InvalidSplitRatio(NaiveDate, f64),

    /// A date is mapped to an index outside the bar sequence.
    #[error("Bar index {index} for {date} is out of range ({len} bars)")]
    IndexOutOfRange {
        /// Date mapped to the index.
        date: NaiveDate,
        /// Offending index.
        index: usize,
        /// Number of bars.
        len: usize,
    },

    /// Two bars or two splits share the same date.
    #[error("Duplicate entry for {0}")]
    DuplicateDate(NaiveDate),

    /// The declared date range is inverted.
    #[error("Invalid date range: {0} is after {1}")]
    InvalidDateRange(NaiveDate, NaiveDate),

    /// The initial cash balance is not positive.
    #[error("Balance must be positive (got: {0})")]
    NegZeroBalance(f64),

    /// A malformed value in an input file.
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV decoding error occurred.
    #[cfg(feature = "loader")]
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}
