//! Independent simulations over several instruments.
//!
//! The `Optimizer` runs one `TransactionSimulator` per named price history on the rayon pool. Simulations share
//! no mutable state; each one owns a copy of its history and its entry signal.

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::info;

use crate::engine::{BuyPointRule, DailyValuation, EntrySignal, PriceHistory, TransactionSimulator};
use crate::errors::Result;

/// Batch runner for one simulation per instrument.
#[derive(Debug, Clone)]
pub struct Optimizer<S = BuyPointRule> {
    histories: Vec<(String, PriceHistory)>,
    initial_cash: f64,
    signal: S,
}

impl Optimizer<BuyPointRule> {
    /// Creates a new `Optimizer` using the default [`BuyPointRule`].
    ///
    /// # Arguments
    /// * `histories` - Named price histories, one per instrument.
    /// * `initial_cash` - Starting cash of every simulation.
    pub fn new(histories: Vec<(String, PriceHistory)>, initial_cash: f64) -> Self {
        Self {
            histories,
            initial_cash,
            signal: BuyPointRule::default(),
        }
    }
}

impl<S> Optimizer<S>
where
    S: EntrySignal + Clone + Send + Sync,
{
    /// Replaces the entry signal used by every simulation.
    pub fn with_signal<T: EntrySignal + Clone + Send + Sync>(self, signal: T) -> Optimizer<T> {
        Optimizer {
            signal,
            histories: self.histories,
            initial_cash: self.initial_cash,
        }
    }

    /// Runs every simulation.
    ///
    /// # Arguments
    /// * `start` - First simulated day. Each instrument starts at the later of `start` and its first bar;
    ///   `None` starts every instrument at its first bar.
    ///
    /// # Returns
    /// The `(name, trace)` pairs in input order.
    ///
    /// # Errors
    /// Returns the first simulation error.
    pub fn run(&self, start: Option<NaiveDate>) -> Result<Vec<(String, Vec<DailyValuation>)>> {
        let num_cpus = num_cpus::get();
        let chunk_size = self.histories.len().div_ceil(num_cpus).max(1);

        self.histories
            .par_chunks(chunk_size)
            .map::<_, Result<_>>(|par_histories| {
                let mut local_results = Vec::with_capacity(par_histories.len());

                for (name, history) in par_histories {
                    let first_day = start.map_or(history.start_date(), |start| start.max(history.start_date()));
                    let mut simulator = TransactionSimulator::new(history.clone(), self.initial_cash)?
                        .with_signal(self.signal.clone());
                    simulator.run(first_day)?;
                    if let Some(last) = simulator.trace().last() {
                        info!(instrument = %name, total = last.total, "instrument finished");
                    }
                    local_results.push((name.clone(), simulator.trace().to_vec()));
                }

                Ok(local_results)
            })
            .collect::<Result<Vec<_>>>()
            .map(|chunks| chunks.into_iter().flatten().collect())
    }
}

#[cfg(test)]
fn get_data(scale: f64) -> PriceHistory {
    use crate::loader::PriceHistoryBuilder;

    let day = |d| NaiveDate::from_ymd_opt(2015, 6, d).unwrap();
    PriceHistoryBuilder::builder()
        .bar(day(1), (100.0 * scale, 101.0 * scale, 99.0 * scale, 100.0 * scale))
        .bar(day(2), (100.0 * scale, 108.0 * scale, 99.0 * scale, 107.0 * scale))
        .bar(day(3), (107.0 * scale, 108.0 * scale, 99.0 * scale, 100.0 * scale))
        .bar(day(4), (100.0 * scale, 108.0 * scale, 99.0 * scale, 107.0 * scale))
        .bar(day(5), (107.0 * scale, 108.0 * scale, 99.0 * scale, 100.0 * scale))
        .build()
        .unwrap()
}

#[cfg(test)]
#[test]
fn optimizer_keeps_input_order() {
    let histories = (1..=5)
        .map(|i| (format!("instrument-{i}"), get_data(i as f64)))
        .collect::<Vec<_>>();
    let optimizer = Optimizer::new(histories, 1_000_000.0);

    let results = optimizer.run(None).unwrap();
    let names = results.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["instrument-1", "instrument-2", "instrument-3", "instrument-4", "instrument-5"]
    );
    assert!(results.iter().all(|(_, trace)| trace.len() == 5));
}

#[cfg(test)]
#[test]
fn optimizer_matches_single_simulation() {
    let history = get_data(1.0);
    let mut simulator = TransactionSimulator::new(history.clone(), 1_000_000.0).unwrap();
    simulator.run(history.start_date()).unwrap();

    let optimizer = Optimizer::new(vec![("single".to_string(), history)], 1_000_000.0);
    let results = optimizer.run(None).unwrap();
    assert_eq!(results[0].1, simulator.trace());
}

#[cfg(test)]
#[test]
fn optimizer_clamps_start_and_uses_signal() {
    let day = |d| NaiveDate::from_ymd_opt(2015, 6, d).unwrap();
    let never = |_: &PriceHistory, _: NaiveDate| -> Result<bool> { Ok(false) };
    let optimizer = Optimizer::new(vec![("flat".to_string(), get_data(1.0))], 1_000.0).with_signal(never);

    let results = optimizer.run(Some(NaiveDate::from_ymd_opt(2015, 5, 1).unwrap())).unwrap();
    let trace = &results[0].1;
    assert_eq!(trace.first().map(|v| v.date), Some(day(1)));
    assert!(trace.iter().all(|v| v.total == 1_000.0));
}
