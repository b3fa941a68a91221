//! Performance metrics for simulations.
//!
//! This module provides tools to calculate:
//! - Total return
//! - Max drawdown
//! - Sharpe ratio
//! - Round trips, profit factor and win rate
//!
//! Events generated during a simulation.
//!
//! The `Event` enum records what the simulator did on each day: entries, fills, splits, exits and the daily
//! valuation. It needs the `metrics` feature.

use std::fmt;

use chrono::NaiveDate;

use crate::RatioCalculus;
use crate::engine::*;

/// Events generated during a simulation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// The entry signal fired and the first buy was posted.
    Entry {
        /// Day of the signal.
        date: NaiveDate,
        /// Limit price of the entry buy.
        price: f64,
        /// Shares of the entry buy.
        amount: f64,
        /// Cash before the round trip.
        cash: f64,
    },

    /// A pending order filled.
    Fill {
        /// Day of the fill.
        date: NaiveDate,
        /// Ladder the order came from.
        side: OrderSide,
        /// Day the order was posted.
        placed_on: NaiveDate,
        /// Shares traded.
        amount: f64,
        /// Limit price of the order.
        order_price: f64,
        /// Price the order traded at.
        deal_price: f64,
    },

    /// A split rescaled the position and the pending orders.
    Split {
        /// Effective day.
        date: NaiveDate,
        /// Split ratio.
        ratio: f64,
    },

    /// The sell ladder emptied and the simulator went flat.
    Exit {
        /// Day of the last sell.
        date: NaiveDate,
        /// Cash after the round trip.
        cash: f64,
    },

    /// End-of-day account snapshot.
    Valuation(DailyValuation),
}

/// A collection of performance metrics calculated from a series of events.
///
/// `Metrics` is typically constructed from a `TransactionSimulator` after a run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metrics {
    events: Vec<Event>,
    initial_cash: f64,
}

impl<S: EntrySignal> From<&TransactionSimulator<S>> for Metrics {
    fn from(value: &TransactionSimulator<S>) -> Self {
        Self {
            initial_cash: value.initial_cash(),
            events: value.events().cloned().collect(),
        }
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance from a list of events and the initial cash.
    pub fn new(events: Vec<Event>, initial_cash: f64) -> Self {
        Self { events, initial_cash }
    }

    /// Returns the initial cash.
    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    /// Returns the events.
    pub fn events(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    fn valuations(&self) -> impl Iterator<Item = &DailyValuation> {
        self.events.iter().filter_map(|event| match event {
            Event::Valuation(valuation) => Some(valuation),
            _ => None,
        })
    }

    /// Cash difference of every completed round trip (entry to exit).
    pub fn round_trips(&self) -> Vec<f64> {
        let mut entry_cash = None;
        let mut round_trips = Vec::new();
        for event in &self.events {
            match event {
                Event::Entry { cash, .. } => entry_cash = Some(*cash),
                Event::Exit { cash, .. } => {
                    if let Some(entry_cash) = entry_cash.take() {
                        round_trips.push(cash - entry_cash);
                    }
                }
                _ => {}
            }
        }
        round_trips
    }

    /// Returns the number of fills on `side`.
    pub fn fills(&self, side: OrderSide) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Fill { side: s, .. } if *s == side))
            .count()
    }

    /// Returns the last recorded account value, or the initial cash before any day was simulated.
    pub fn final_value(&self) -> f64 {
        self.valuations().last().map_or(self.initial_cash, |valuation| valuation.total)
    }

    /// Computes the total return as a percentage of the initial cash.
    pub fn total_return(&self) -> f64 {
        (self.final_value() - self.initial_cash) / self.initial_cash * 100.0
    }

    /// Computes the maximum drawdown as a percentage.
    pub fn max_drawdown(&self) -> f64 {
        let mut max_peak = self.initial_cash;
        let mut max_drawdown = 0.0;

        for valuation in self.valuations() {
            if valuation.total > max_peak {
                max_peak = valuation.total;
            }
            let drawdown = (max_peak - valuation.total) / max_peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        max_drawdown * 100.0
    }

    /// Computes the profit factor over completed round trips.
    pub fn profit_factor(&self) -> f64 {
        let (gains, losses) = self.round_trips().iter().fold((0.0, 0.0), |(gains, losses), &pnl| {
            if pnl > 0.0 { (gains + pnl, losses) } else { (gains, losses + pnl.abs()) }
        });

        if losses == 0.0 {
            return f64::INFINITY;
        }

        gains / losses
    }

    /// Computes the Sharpe ratio over daily valuation returns.
    ///
    /// `risk_free_rate` is the per-day risk-free return (e.g., 0.0 for simplicity).
    /// Returns `NaN` without valuations.
    pub fn sharpe_ratio(&self, risk_free_rate: f64) -> f64 {
        let mut returns = Vec::new();
        let mut previous_total = self.initial_cash;

        for valuation in self.valuations() {
            returns.push(previous_total.change(valuation.total));
            previous_total = valuation.total;
        }

        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let std_dev = (returns.iter().map(|r| (r - mean_return).powi(2)).sum::<f64>() / returns.len() as f64).sqrt();

        (mean_return - risk_free_rate) / std_dev
    }

    /// Computes the win rate as a percentage of profitable round trips.
    pub fn win_rate(&self) -> f64 {
        let round_trips = self.round_trips();
        if round_trips.is_empty() {
            return 0.0;
        }

        let winning = round_trips.iter().filter(|&&pnl| pnl > 0.0).count();
        (winning as f64 / round_trips.len() as f64) * 100.0
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Simulation Metrics ===")?;
        writeln!(f, "Initial Cash: {:.2}", self.initial_cash)?;
        writeln!(f, "Final Value: {:.2}", self.final_value())?;
        writeln!(f, "Total Return: {:.2}%", self.total_return())?;
        writeln!(f, "Buy fills: {}", self.fills(OrderSide::Buy))?;
        writeln!(f, "Sell fills: {}", self.fills(OrderSide::Sell))?;
        #[allow(clippy::writeln_empty_string)]
        writeln!(f, "")?;
        writeln!(f, "Max Drawdown: {:.2}%", self.max_drawdown())?;
        writeln!(f, "Profit Factor: {:.2}", self.profit_factor())?;
        writeln!(f, "Sharpe Ratio (risk-free rate = 0.0): {:.2}", self.sharpe_ratio(0.0))?;
        writeln!(f, "Round Trips: {}", self.round_trips().len())?;
        writeln!(f, "Win Rate: {:.2}%", self.win_rate())
    }
}

#[cfg(test)]
fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 6, d).unwrap()
}

#[cfg(test)]
fn valuation(d: u32, total: f64) -> Event {
    Event::Valuation(DailyValuation {
        date: day(d),
        close: 0.0,
        cash: total,
        position: 0.0,
        total,
    })
}

#[cfg(test)]
fn round_trip(d: u32, entry_cash: f64, exit_cash: f64) -> [Event; 2] {
    [
        Event::Entry {
            date: day(d),
            price: 100.0,
            amount: 1.0,
            cash: entry_cash,
        },
        Event::Exit {
            date: day(d + 1),
            cash: exit_cash,
        },
    ]
}

#[cfg(test)]
#[test]
fn max_drawdown() {
    let events = vec![
        valuation(1, 10000.0),
        valuation(2, 12000.0),
        valuation(3, 9000.0),
        valuation(4, 11000.0),
    ];
    let metrics = Metrics::new(events, 10000.0);
    assert_eq!(metrics.max_drawdown(), 25.0); // (12000 - 9000) / 12000 = 25%
}

#[cfg(test)]
#[test]
fn max_drawdown_no_events() {
    let metrics = Metrics::new(vec![], 10000.0);
    assert_eq!(metrics.max_drawdown(), 0.0);
}

#[cfg(test)]
#[test]
fn total_return() {
    let metrics = Metrics::new(vec![valuation(1, 10500.0), valuation(2, 11000.0)], 10000.0);
    assert_eq!(metrics.final_value(), 11000.0);
    assert_eq!(metrics.total_return(), 10.0);

    let metrics = Metrics::new(vec![], 10000.0);
    assert_eq!(metrics.final_value(), 10000.0);
    assert_eq!(metrics.total_return(), 0.0);
}

#[cfg(test)]
#[test]
fn profit_factor() {
    let events = [round_trip(1, 1000.0, 1020.0), round_trip(3, 1020.0, 1010.0)].concat();
    let metrics = Metrics::new(events, 1000.0);
    assert_eq!(metrics.round_trips(), vec![20.0, -10.0]);
    assert_eq!(metrics.profit_factor(), 2.0); // 20 / 10 = 2.0
}

#[cfg(test)]
#[test]
fn profit_factor_no_losses() {
    let metrics = Metrics::new(round_trip(1, 1000.0, 1020.0).to_vec(), 1000.0);
    assert_eq!(metrics.profit_factor(), f64::INFINITY);
}

#[cfg(test)]
#[test]
fn open_round_trip_is_not_counted() {
    let mut events = round_trip(1, 1000.0, 1020.0).to_vec();
    events.push(Event::Entry {
        date: day(5),
        price: 100.0,
        amount: 1.0,
        cash: 1020.0,
    });
    let metrics = Metrics::new(events, 1000.0);
    assert_eq!(metrics.round_trips().len(), 1);
}

#[cfg(test)]
#[test]
fn sharpe_ratio() {
    let events = vec![
        valuation(1, 10000.0),
        valuation(2, 10500.0),
        valuation(3, 10300.0),
        valuation(4, 10700.0),
    ];
    let metrics = Metrics::new(events, 10000.0);
    let sharpe = metrics.sharpe_ratio(0.0);
    assert!(sharpe > 0.0 && sharpe < 1.0);
}

#[cfg(test)]
#[test]
fn sharpe_ratio_no_events() {
    let metrics = Metrics::new(vec![], 10000.0);
    assert!(metrics.sharpe_ratio(0.0).is_nan());
}

#[cfg(test)]
#[test]
fn win_rate() {
    let events = [
        round_trip(1, 1000.0, 1020.0),
        round_trip(3, 1020.0, 1010.0),
        round_trip(5, 1010.0, 1030.0),
        round_trip(7, 1030.0, 1040.0),
    ]
    .concat();
    let metrics = Metrics::new(events, 1000.0);
    assert_eq!(metrics.win_rate(), 75.0);
}

#[cfg(test)]
#[test]
fn win_rate_no_trades() {
    let metrics = Metrics::new(vec![], 10000.0);
    assert_eq!(metrics.win_rate(), 0.0);
}

#[cfg(test)]
#[test]
fn from_simulator() {
    use crate::loader::PriceHistoryBuilder;

    // swings 100 -> 107 -> 100 -> 107 -> 100, closing at the bottom of the range
    let history = PriceHistoryBuilder::builder()
        .bar(day(1), (100.0, 101.0, 99.0, 100.0))
        .bar(day(2), (100.0, 108.0, 99.0, 107.0))
        .bar(day(3), (107.0, 108.0, 99.0, 100.0))
        .bar(day(4), (100.0, 108.0, 99.0, 107.0))
        .bar(day(5), (107.0, 108.0, 99.0, 100.0))
        .bar(day(8), (100.0, 107.0, 99.0, 100.5))
        .build()
        .unwrap();
    let mut simulator = TransactionSimulator::new(history, STARTING_CASH).unwrap();
    simulator.run(day(1)).unwrap();

    let metrics = Metrics::from(&simulator);
    assert_eq!(metrics.initial_cash(), STARTING_CASH);
    assert_eq!(metrics.final_value(), 1_007_503.5);
    assert_eq!(metrics.round_trips(), vec![7000.0]);
    assert_eq!(metrics.fills(OrderSide::Buy), 2);
    assert_eq!(metrics.fills(OrderSide::Sell), 1);
    // an order never fills on the day it was posted
    assert!(simulator.events().all(|event| match event {
        Event::Fill { date, placed_on, .. } => placed_on < date,
        _ => true,
    }));
    assert_eq!(metrics.win_rate(), 100.0);
    assert_eq!(metrics.max_drawdown(), 0.0);
    assert!(metrics.to_string().contains("Round Trips: 1"));
}
