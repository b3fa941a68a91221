use chrono::NaiveDate;

use crate::engine::PriceBar;
use crate::utils::random_id;

/// Represents the side of an order (buy or sell).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    /// Buy ladder.
    Buy,
    /// Sell ladder.
    Sell,
}

/// A resting limit order of a ladder.
///
/// An order is inactive on the day it is placed and can only fill from the next day on.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct Order {
    id: u32,
    amount: f64,
    price: f64,
    placed_on: NaiveDate,
    is_active: bool,
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

type O1 = (f64, f64, NaiveDate);
impl From<O1> for Order {
    fn from((amount, price, placed_on): O1) -> Self {
        Self {
            id: random_id(),
            amount,
            price,
            placed_on,
            is_active: false,
        }
    }
}

impl Order {
    /// Returns the order identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the number of shares.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Returns the limit price.
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Returns the day the order was placed.
    pub fn placed_on(&self) -> NaiveDate {
        self.placed_on
    }

    /// Returns `true` once the order may fill.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the notional value of the order (price * amount).
    pub fn cost(&self) -> f64 {
        self.price * self.amount
    }

    /// Lets the order fill from `day` on, provided it was placed on an earlier day.
    pub(crate) fn activate(&mut self, day: NaiveDate) {
        if self.placed_on < day {
            self.is_active = true;
        }
    }

    /// Rescales the order for a split: more shares at a lower price, same notional.
    pub(crate) fn apply_split(&mut self, ratio: f64) {
        self.amount *= ratio;
        self.price /= ratio;
    }

    /// Returns the deal price if the order fills against `bar`.
    ///
    /// A buy fills when the low reaches its price, at the better of its price and the open.
    /// A sell fills when the high reaches its price, at the better of its price and the open.
    pub fn fill_price(&self, side: OrderSide, bar: &PriceBar) -> Option<f64> {
        if !self.is_active {
            return None;
        }
        match side {
            OrderSide::Buy if self.price >= bar.low() => Some(self.price.min(bar.open())),
            OrderSide::Sell if self.price <= bar.high() => Some(self.price.max(bar.open())),
            _ => None,
        }
    }
}

#[cfg(test)]
fn placed(amount: f64, price: f64) -> Order {
    let day = NaiveDate::from_ymd_opt(2015, 6, 1).unwrap();
    Order::from((amount, price, day))
}

#[cfg(test)]
fn next_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 6, 2).unwrap()
}

#[cfg(test)]
#[test]
fn create_order() {
    let order = placed(10.0, 100.0);
    assert_eq!(order.amount(), 10.0);
    assert_eq!(order.price(), 100.0);
    assert_eq!(order.cost(), 1000.0);
    assert!(!order.is_active());
}

#[cfg(test)]
#[test]
fn order_equality() {
    let order1 = placed(1.0, 100.0);
    let order2 = placed(1.0, 100.0);
    assert_ne!(order1, order2);
    assert_eq!(order1, order1);
}

#[cfg(test)]
#[test]
fn activate_order() {
    let mut order = placed(1.0, 100.0);
    assert!(!order.is_active());

    // same day: still pending
    order.activate(order.placed_on());
    assert!(!order.is_active());

    order.activate(next_day());
    assert!(order.is_active());
}

#[cfg(test)]
#[test]
fn inactive_order_never_fills() {
    let order = placed(1.0, 100.0);
    let bar = PriceBar::from((95.0, 105.0, 90.0, 100.0));
    assert_eq!(order.fill_price(OrderSide::Buy, &bar), None);
    assert_eq!(order.fill_price(OrderSide::Sell, &bar), None);
}

#[cfg(test)]
#[test]
fn buy_fills_at_better_of_price_and_open() {
    let mut order = placed(1.0, 100.0);
    order.activate(next_day());

    // gap down: open below the limit
    let bar = PriceBar::from((95.0, 98.0, 94.0, 96.0));
    assert_eq!(order.fill_price(OrderSide::Buy, &bar), Some(95.0));

    // trades through the limit intraday
    let bar = PriceBar::from((102.0, 104.0, 99.0, 103.0));
    assert_eq!(order.fill_price(OrderSide::Buy, &bar), Some(100.0));

    // low stays above the limit
    let bar = PriceBar::from((102.0, 104.0, 100.5, 103.0));
    assert_eq!(order.fill_price(OrderSide::Buy, &bar), None);
}

#[cfg(test)]
#[test]
fn sell_fills_at_better_of_price_and_open() {
    let mut order = placed(1.0, 100.0);
    order.activate(next_day());

    // gap up: open above the limit
    let bar = PriceBar::from((104.0, 106.0, 103.0, 105.0));
    assert_eq!(order.fill_price(OrderSide::Sell, &bar), Some(104.0));

    // trades through the limit intraday
    let bar = PriceBar::from((97.0, 101.0, 96.0, 99.0));
    assert_eq!(order.fill_price(OrderSide::Sell, &bar), Some(100.0));

    // high stays below the limit
    let bar = PriceBar::from((97.0, 99.5, 96.0, 99.0));
    assert_eq!(order.fill_price(OrderSide::Sell, &bar), None);
}

#[cfg(test)]
#[test]
fn split_keeps_notional() {
    let mut order = placed(100.0, 50.0);
    order.apply_split(5.0);
    assert_eq!(order.amount(), 500.0);
    assert_eq!(order.price(), 10.0);
    assert_eq!(order.cost(), 5000.0);
}
