//! Core simulation components.
//!
//! This module provides the fundamental types for the swing ladder:
//! - `PriceBar`: raw OHLC prices of one day, and `AdjustedBar` for split-normalized reads.
//! - `ZigZag`: the reversal counter behind the fluctuation percentile.
//! - `PriceHistory`: bars, splits and the windowed percentiles.
//! - `BuyPointRule`: the entry signal.
//! - `Order` / `Wallet`: pending limit orders and account bookkeeping.
//! - `TransactionSimulator`: the day-stepped state machine.

mod bar;
mod fluctuation;
mod history;
mod order;
mod signal;
mod wallet;

use std::slice::Iter;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::{
    RatioCalculus,
    errors::Result,
    utils::calendar_days,
};

#[cfg(feature = "metrics")]
use crate::metrics::Event;

pub use bar::*;
pub use fluctuation::*;
pub use history::*;
pub use order::*;
pub use signal::*;
pub use wallet::*;

#[cfg(test)]
mod bts;

/// Cash available to a fresh simulation.
pub const STARTING_CASH: f64 = 1_000_000.0;

/// The entry buy is sized at `cash / ENTRY_ALLOCATION`.
pub const ENTRY_ALLOCATION: f64 = 10.0;

/// Account snapshot at the end of one simulated day.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyValuation {
    /// Simulated calendar day.
    pub date: NaiveDate,
    /// Close at or before `date` used to mark the position, divided by any split since that bar.
    pub close: f64,
    /// Cash after the day's fills.
    pub cash: f64,
    /// Shares held after the day's fills.
    pub position: f64,
    /// `cash + position × close`.
    pub total: f64,
}

/// Laddered limit-order simulator over one price history.
///
/// The simulator is **Flat** until the entry signal fires, then **Engaged** with a buy ladder and a sell ladder:
/// every filled buy posts a sell one step above its fill, every filled sell posts a buy one step below. When a sell
/// empties the sell ladder the round trip is over, the buy ladder is cleared and the entry signal is armed again.
#[derive(Debug)]
pub struct TransactionSimulator<S = BuyPointRule> {
    wallet: Wallet,
    history: PriceHistory,
    signal: S,
    #[cfg(feature = "metrics")]
    events: Vec<Event>,
    buy_orders: Vec<Order>,
    sell_orders: Vec<Order>,
    start_amount: Option<f64>,
    trace: Vec<DailyValuation>,
}

impl<S> std::ops::Deref for TransactionSimulator<S> {
    type Target = Wallet;

    fn deref(&self) -> &Self::Target {
        &self.wallet
    }
}

impl TransactionSimulator<BuyPointRule> {
    /// Creates a new simulator using the default [`BuyPointRule`].
    ///
    /// ### Arguments
    /// * `history` - The price history to replay.
    /// * `initial_cash` - Starting cash (e.g. [`STARTING_CASH`]).
    ///
    /// ### Returns
    /// The new simulator, or an error when the cash is not positive.
    pub fn new(history: PriceHistory, initial_cash: f64) -> Result<Self> {
        Ok(Self {
            history,
            signal: BuyPointRule::default(),
            #[cfg(feature = "metrics")]
            events: Vec::new(),
            buy_orders: Vec::new(),
            sell_orders: Vec::new(),
            start_amount: None,
            trace: Vec::new(),
            wallet: Wallet::new(initial_cash)?,
        })
    }
}

/// Splits `ladder` into the orders that fill against `bar` and the ones left pending.
fn take_fills(ladder: &mut Vec<Order>, side: OrderSide, bar: &PriceBar) -> Vec<(Order, f64)> {
    let mut fills = Vec::new();
    let mut pending = Vec::with_capacity(ladder.len());
    for order in std::mem::take(ladder) {
        match order.fill_price(side, bar) {
            Some(deal_price) => fills.push((order, deal_price)),
            None => pending.push(order),
        }
    }
    *ladder = pending;
    fills
}

impl<S: EntrySignal> TransactionSimulator<S> {
    /// Replaces the entry signal, keeping the rest of the state.
    pub fn with_signal<T: EntrySignal>(self, signal: T) -> TransactionSimulator<T> {
        TransactionSimulator {
            signal,
            wallet: self.wallet,
            history: self.history,
            #[cfg(feature = "metrics")]
            events: self.events,
            buy_orders: self.buy_orders,
            sell_orders: self.sell_orders,
            start_amount: self.start_amount,
            trace: self.trace,
        }
    }

    /// Returns the replayed history.
    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    /// Returns the entry signal.
    pub fn signal(&self) -> &S {
        &self.signal
    }

    /// Returns the wallet.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Returns an iterator over the pending buy orders.
    pub fn buy_orders(&self) -> Iter<'_, Order> {
        self.buy_orders.iter()
    }

    /// Returns an iterator over the pending sell orders.
    pub fn sell_orders(&self) -> Iter<'_, Order> {
        self.sell_orders.iter()
    }

    /// Size of the entry lot, rescaled by splits. `None` while flat.
    pub fn start_amount(&self) -> Option<f64> {
        self.start_amount
    }

    /// Returns `true` between an entry and the matching exit.
    pub fn is_engaged(&self) -> bool {
        self.start_amount.is_some()
    }

    /// Returns the daily valuations recorded so far.
    pub fn trace(&self) -> &[DailyValuation] {
        &self.trace
    }

    /// Returns an iterator over the recorded events.
    #[cfg(feature = "metrics")]
    pub fn events(&self) -> Iter<'_, Event> {
        self.events.iter()
    }

    /// Rescales the wallet, the entry lot and every pending order by a split `ratio`.
    fn apply_split(&mut self, day: NaiveDate, ratio: f64) {
        self.wallet.apply_split(ratio);
        self.start_amount = self.start_amount.map(|amount| amount * ratio);
        self.buy_orders
            .iter_mut()
            .chain(self.sell_orders.iter_mut())
            .for_each(|order| order.apply_split(ratio));
        info!(%day, ratio, position = self.wallet.position(), "split");
        #[cfg(feature = "metrics")]
        self.events.push(Event::Split { date: day, ratio });
    }

    /// Posts the entry buy when the signal fires. Returns `true` when an order was posted.
    fn try_enter(&mut self, day: NaiveDate) -> Result<bool> {
        if !self.signal.is_entry(&self.history, day)? {
            return Ok(false);
        }

        let price = self.history.restated_close(day)?;
        let amount = (self.wallet.cash() / ENTRY_ALLOCATION / price).round();
        if amount < 1.0 {
            warn!(%day, price, cash = self.wallet.cash(), "entry lot rounds to zero shares, skipped");
            return Ok(false);
        }

        self.buy_orders.push(Order::from((amount, price, day)));
        self.start_amount = Some(amount);
        info!(%day, price, amount, "entry");
        #[cfg(feature = "metrics")]
        self.events.push(Event::Entry {
            date: day,
            price,
            amount,
            cash: self.wallet.cash(),
        });
        Ok(true)
    }

    /// Matches both ladders against the day's bar and re-ladders the fills.
    fn match_orders(&mut self, day: NaiveDate, bar: &PriceBar) {
        let buy_fills = take_fills(&mut self.buy_orders, OrderSide::Buy, bar);
        for (order, deal_price) in &buy_fills {
            self.wallet.buy(order.amount(), *deal_price);
            let sell = Order::from((order.amount(), deal_price.add_ratio(FLUCTUATION_THRESHOLD), day));
            info!(
                %day,
                placed_on = %order.placed_on(),
                amount = order.amount(),
                order_price = order.price(),
                deal_price,
                next = sell.price(),
                "buy filled"
            );
            self.sell_orders.push(sell);
            #[cfg(feature = "metrics")]
            self.events.push(Event::Fill {
                date: day,
                side: OrderSide::Buy,
                placed_on: order.placed_on(),
                amount: order.amount(),
                order_price: order.price(),
                deal_price: *deal_price,
            });
        }

        let sell_fills = take_fills(&mut self.sell_orders, OrderSide::Sell, bar);
        for (order, deal_price) in &sell_fills {
            self.wallet.sell(order.amount(), *deal_price);
            info!(
                %day,
                placed_on = %order.placed_on(),
                amount = order.amount(),
                order_price = order.price(),
                deal_price,
                "sell filled"
            );
            if buy_fills.is_empty() {
                let step = down_threshold(FLUCTUATION_THRESHOLD);
                self.buy_orders.push(Order::from((order.amount(), deal_price.sub_ratio(step), day)));
            }
            #[cfg(feature = "metrics")]
            self.events.push(Event::Fill {
                date: day,
                side: OrderSide::Sell,
                placed_on: order.placed_on(),
                amount: order.amount(),
                order_price: order.price(),
                deal_price: *deal_price,
            });
        }

        if !sell_fills.is_empty() && self.sell_orders.is_empty() {
            self.buy_orders.clear();
            self.start_amount = None;
            info!(%day, cash = self.wallet.cash(), position = self.wallet.position(), "exit");
            #[cfg(feature = "metrics")]
            self.events.push(Event::Exit {
                date: day,
                cash: self.wallet.cash(),
            });
        }
    }

    /// Marks the account at the last known close, in the share scale in force on `day`.
    fn valuate(&self, day: NaiveDate) -> Result<DailyValuation> {
        let close = self.history.restated_close(day)?;
        Ok(DailyValuation {
            date: day,
            close,
            cash: self.wallet.cash(),
            position: self.wallet.position(),
            total: self.wallet.total(close),
        })
    }

    /// Simulates one calendar day.
    ///
    /// Applies the day's split, activates the orders posted on earlier days, then either posts the entry buy (flat)
    /// or matches the ladders (market open). Orders posted during the day stay inactive until the next day, so they
    /// can never fill against the bar that produced them.
    ///
    /// ### Returns
    /// The day's valuation, or [`LookupFailure`](crate::errors::Error::LookupFailure) when the day precedes the
    /// history.
    pub fn step(&mut self, day: NaiveDate) -> Result<DailyValuation> {
        if let Some(ratio) = self.history.split_ratio(day) {
            self.apply_split(day, ratio);
        }

        self.buy_orders
            .iter_mut()
            .chain(self.sell_orders.iter_mut())
            .for_each(|order| order.activate(day));

        let entered = !self.is_engaged() && self.try_enter(day)?;
        if !entered {
            if let Some(bar) = self.history.bar_on(day) {
                self.match_orders(day, bar.raw());
            }
        }

        let valuation = self.valuate(day)?;
        debug!(
            %day,
            total = valuation.total,
            cash = valuation.cash,
            position = valuation.position,
            buys = ?self.buy_orders.iter().map(Order::price).collect::<Vec<_>>(),
            sells = ?self.sell_orders.iter().map(Order::price).collect::<Vec<_>>(),
            "valuation"
        );
        self.trace.push(valuation);
        #[cfg(feature = "metrics")]
        self.events.push(Event::Valuation(valuation));
        Ok(valuation)
    }

    /// Runs the simulation over every calendar day from `start` through the end of the history.
    ///
    /// Valuations are appended to [`trace`](Self::trace); call [`reset`](Self::reset) to replay from scratch.
    ///
    /// ### Returns
    /// Ok if successful, or the first lookup error (e.g. a `start` before the first bar).
    pub fn run(&mut self, start: NaiveDate) -> Result<()> {
        for day in calendar_days(start, self.history.end_date()) {
            self.step(day)?;
        }

        if let Some(last) = self.trace.last() {
            info!(days = self.trace.len(), total = last.total, "simulation finished");
        }
        Ok(())
    }

    /// Resets the simulator to its initial state.
    pub fn reset(&mut self) {
        self.wallet.reset();
        #[cfg(feature = "metrics")]
        {
            self.events = Vec::new();
        }
        self.buy_orders = Vec::new();
        self.sell_orders = Vec::new();
        self.start_amount = None;
        self.trace = Vec::new();
    }
}
