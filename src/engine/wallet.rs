#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Cash, share position and cost basis of a simulation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Wallet {
    // Initial cash used for reset
    initial_cash: f64,
    // Available cash
    cash: f64,
    // Shares held
    position: f64,
    // Cost basis of the shares held, never negative
    cost: f64,
}

impl Wallet {
    /// Creates a new wallet with the given initial cash.
    /// Non-positive balances are rejected.
    pub fn new(cash: f64) -> Result<Self> {
        if cash <= 0.0 || !cash.is_finite() {
            return Err(Error::NegZeroBalance(cash));
        }

        Ok(Self {
            cash,
            position: 0.0,
            cost: 0.0,
            initial_cash: cash,
        })
    }

    /// Returns the initial cash.
    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    /// Returns the available cash.
    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Returns the number of shares held.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Returns the cost basis of the shares held.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Returns the account value with the position marked at `price`.
    pub fn total(&self, price: f64) -> f64 {
        self.cash + self.position * price
    }

    /// Books a buy of `amount` shares at `price`.
    pub(crate) fn buy(&mut self, amount: f64, price: f64) {
        self.position += amount;
        self.cost += amount * price;
        self.cash -= amount * price;
    }

    /// Books a sell of `amount` shares at `price`.
    pub(crate) fn sell(&mut self, amount: f64, price: f64) {
        self.position -= amount;
        self.cost = (self.cost - amount * price).max(0.0);
        self.cash += amount * price;
    }

    /// Rescales the position for a split; cash and cost are unchanged.
    pub(crate) fn apply_split(&mut self, ratio: f64) {
        self.position *= ratio;
    }

    /// Resets the wallet to its initial cash.
    pub(crate) fn reset(&mut self) {
        self.position = 0.0;
        self.cost = 0.0;
        self.cash = self.initial_cash;
    }
}

#[cfg(test)]
#[test]
fn new_wallet_valid_balance() {
    let wallet = Wallet::new(100.0).unwrap();
    assert_eq!(wallet.cash(), 100.0);
    assert_eq!(wallet.position(), 0.0);
    assert_eq!(wallet.cost(), 0.0);
    assert_eq!(wallet.total(50.0), 100.0);
}

#[cfg(test)]
#[test]
fn new_wallet_invalid_balance() {
    let result = Wallet::new(0.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));

    let result = Wallet::new(-10.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));

    let result = Wallet::new(f64::NAN);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));
}

#[cfg(test)]
#[test]
fn buy_and_sell() {
    let mut wallet = Wallet::new(1000.0).unwrap();

    wallet.buy(5.0, 100.0);
    assert_eq!(wallet.cash(), 500.0);
    assert_eq!(wallet.position(), 5.0);
    assert_eq!(wallet.cost(), 500.0);
    assert_eq!(wallet.total(110.0), 1050.0);

    wallet.sell(5.0, 110.0);
    assert_eq!(wallet.cash(), 1050.0);
    assert_eq!(wallet.position(), 0.0);
    // selling above cost clamps the basis at zero
    assert_eq!(wallet.cost(), 0.0);
}

#[cfg(test)]
#[test]
fn partial_sell_reduces_cost() {
    let mut wallet = Wallet::new(1000.0).unwrap();
    wallet.buy(4.0, 100.0);
    wallet.sell(2.0, 105.0);
    assert_eq!(wallet.position(), 2.0);
    assert_eq!(wallet.cost(), 190.0);
    assert_eq!(wallet.cash(), 810.0);
}

#[cfg(test)]
#[test]
fn split_scales_position_only() {
    let mut wallet = Wallet::new(1000.0).unwrap();
    wallet.buy(2.0, 100.0);
    wallet.apply_split(5.0);
    assert_eq!(wallet.position(), 10.0);
    assert_eq!(wallet.cost(), 200.0);
    assert_eq!(wallet.cash(), 800.0);
    // marked at the post-split price, the value is unchanged
    assert_eq!(wallet.total(20.0), 1000.0);
}

#[cfg(test)]
#[test]
fn reset_wallet() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.buy(1.0, 20.0);
    wallet.sell(1.0, 30.0);

    wallet.reset();
    assert_eq!(wallet.cash(), 100.0);
    assert_eq!(wallet.position(), 0.0);
    assert_eq!(wallet.cost(), 0.0);
}
