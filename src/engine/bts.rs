use super::*;
use crate::errors::Error;
use crate::loader::PriceHistoryBuilder;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 6, d).unwrap()
}

/// Monday June 1st to Friday June 5th, then Monday June 8th.
fn get_data() -> PriceHistoryBuilder {
    PriceHistoryBuilder::builder()
        .bar(day(1), (100.0, 101.0, 99.0, 100.0))
        .bar(day(2), (100.0, 101.0, 98.0, 99.0))
        .bar(day(3), (97.0, 100.0, 94.0, 95.0))
        .bar(day(4), (100.0, 103.0, 99.0, 102.0))
        .bar(day(5), (102.0, 104.0, 101.0, 103.0))
        .bar(day(8), (103.0, 104.0, 100.0, 101.0))
}

/// A simulator whose entry signal fires on `entry_days` only.
fn simulator_entering_on(
    history: PriceHistory,
    entry_days: Vec<NaiveDate>,
) -> TransactionSimulator<impl EntrySignal> {
    let signal = move |_: &PriceHistory, date: NaiveDate| -> Result<bool> { Ok(entry_days.contains(&date)) };
    TransactionSimulator::new(history, STARTING_CASH).unwrap().with_signal(signal)
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-6, "{actual} != {expected}");
}

#[test]
fn scenario_rejects_non_positive_cash() {
    let history = get_data().build().unwrap();
    assert!(matches!(
        TransactionSimulator::new(history, 0.0),
        Err(Error::NegZeroBalance(_))
    ));
}

#[test]
fn scenario_flat_without_signal() {
    let history = get_data().build().unwrap();
    let mut sim = simulator_entering_on(history, vec![]);
    sim.run(day(1)).unwrap();

    assert!(!sim.is_engaged());
    assert_eq!(sim.buy_orders().count(), 0);
    // one valuation per calendar day, weekend included
    assert_eq!(sim.trace().len(), 8);
    assert!(sim.trace().iter().all(|v| v.total == STARTING_CASH));
}

#[test]
fn scenario_entry_sizing() {
    let history = get_data().build().unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2)]);

    sim.step(day(1)).unwrap();
    assert_eq!(sim.start_amount(), None);

    let valuation = sim.step(day(2)).unwrap();
    // 1/10 of the cash at the previous close (99)
    assert_eq!(sim.start_amount(), Some((100_000.0_f64 / 99.0).round()));
    assert_eq!(sim.start_amount(), Some(1010.0));
    assert_eq!(sim.buy_orders().count(), 1);
    let order = sim.buy_orders().next().unwrap();
    assert_eq!(order.price(), 99.0);
    assert_eq!(order.amount(), 1010.0);
    assert!(!order.is_active());
    assert_eq!(sim.sell_orders().count(), 0);
    // nothing filled yet
    assert_eq!(valuation.total, STARTING_CASH);
    assert_eq!(sim.cash(), STARTING_CASH);
}

#[test]
fn scenario_entry_on_non_trading_day() {
    let history = get_data().build().unwrap();
    let mut sim = simulator_entering_on(history, vec![day(6)]);
    for d in 1..=6 {
        sim.step(day(d)).unwrap();
    }
    // the previous close is Friday's
    assert_eq!(sim.buy_orders().next().unwrap().price(), 103.0);
    assert_eq!(sim.start_amount(), Some((100_000.0_f64 / 103.0).round()));
}

#[test]
fn scenario_first_fill_posts_one_sell() {
    let history = get_data().build().unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2)]);
    sim.step(day(1)).unwrap();
    sim.step(day(2)).unwrap();

    // open 97 below the 99 limit: filled at the open
    let valuation = sim.step(day(3)).unwrap();
    assert_eq!(sim.buy_orders().count(), 0);
    assert_eq!(sim.sell_orders().count(), 1);
    let sell = sim.sell_orders().next().unwrap();
    assert_eq!(sell.price(), 97.0_f64.add_ratio(FLUCTUATION_THRESHOLD));
    assert_close(sell.price(), 101.85);
    assert_eq!(sell.amount(), 1010.0);
    assert!(!sell.is_active());

    assert_eq!(sim.position(), 1010.0);
    assert_eq!(sim.cash(), STARTING_CASH - 1010.0 * 97.0);
    assert_eq!(sim.cost(), 1010.0 * 97.0);
    assert_eq!(valuation.close, 95.0);
    assert_eq!(valuation.total, STARTING_CASH - 1010.0 * 97.0 + 1010.0 * 95.0);
}

#[test]
fn scenario_no_same_day_fill() {
    // the entry day trades through the limit, but the order was posted that day
    let history = PriceHistoryBuilder::builder()
        .bar(day(1), (100.0, 101.0, 99.0, 100.0))
        .bar(day(2), (100.0, 101.0, 90.0, 95.0))
        .bar(day(3), (96.0, 97.0, 95.5, 96.0))
        .build()
        .unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2)]);
    sim.step(day(1)).unwrap();
    sim.step(day(2)).unwrap();
    assert_eq!(sim.position(), 0.0);

    // the 95 limit stays below the day 3 low
    sim.step(day(3)).unwrap();
    assert_eq!(sim.position(), 0.0);
    assert_eq!(sim.buy_orders().count(), 1);
    assert!(sim.buy_orders().next().unwrap().is_active());
}

#[test]
fn scenario_round_trip_exit() {
    let history = get_data().build().unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2)]);
    for d in 1..=3 {
        sim.step(day(d)).unwrap();
    }

    // high 103 reaches the 101.85 sell, open 100 is below it
    sim.step(day(4)).unwrap();
    let sell_price = 97.0_f64.add_ratio(FLUCTUATION_THRESHOLD);
    assert!(!sim.is_engaged());
    assert_eq!(sim.start_amount(), None);
    assert_eq!(sim.sell_orders().count(), 0);
    // the replacement buy is dropped with the ladder
    assert_eq!(sim.buy_orders().count(), 0);
    assert_eq!(sim.position(), 0.0);
    assert_eq!(sim.cost(), 0.0);
    assert_close(sim.cash(), STARTING_CASH + 1010.0 * (sell_price - 97.0));
    assert!(sim.cash() > STARTING_CASH);
}

#[test]
fn scenario_re_entry_after_exit() {
    let history = get_data().build().unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2), day(5)]);
    sim.run(day(1)).unwrap();

    // exit on day 4, second entry on day 5 at its close
    assert!(sim.is_engaged());
    let cash_after_exit = STARTING_CASH + 1010.0 * (97.0_f64.add_ratio(FLUCTUATION_THRESHOLD) - 97.0);
    let amount = (cash_after_exit / ENTRY_ALLOCATION / 103.0).round();
    assert_eq!(sim.start_amount(), Some(amount));

    // day 8 opens at the 103 limit
    assert_eq!(sim.buy_orders().count(), 0);
    assert_eq!(sim.position(), amount);
    assert_eq!(sim.sell_orders().count(), 1);
    assert_eq!(sim.sell_orders().next().unwrap().price(), 103.0_f64.add_ratio(FLUCTUATION_THRESHOLD));
}

#[test]
fn scenario_gap_up_sell_fills_at_open() {
    let history = PriceHistoryBuilder::builder()
        .bar(day(1), (100.0, 101.0, 99.0, 100.0))
        .bar(day(2), (100.0, 101.0, 98.0, 100.0))
        .bar(day(3), (110.0, 112.0, 109.0, 111.0))
        .build()
        .unwrap();
    let mut sim = simulator_entering_on(history, vec![day(1)]);
    sim.run(day(1)).unwrap();

    // bought 1000 at 100 on day 2, sold at the 110 open on day 3 instead of the 105 limit
    assert!(!sim.is_engaged());
    assert_eq!(sim.cash(), STARTING_CASH + 1000.0 * 10.0);
}

#[test]
fn scenario_split_rescales_position_and_orders() {
    let history = PriceHistoryBuilder::builder()
        .bar(day(1), (100.0, 101.0, 99.0, 100.0))
        .bar(day(2), (100.0, 101.0, 98.0, 99.0))
        .bar(day(3), (97.0, 100.0, 94.0, 95.0))
        .bar(day(4), (48.0, 50.8, 47.5, 50.0))
        .split(day(4), 2.0)
        .build()
        .unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2)]);
    for d in 1..=3 {
        sim.step(day(d)).unwrap();
    }
    assert_eq!(sim.position(), 1010.0);
    let cash = sim.cash();
    let sell_before = *sim.sell_orders().next().unwrap();

    let valuation = sim.step(day(4)).unwrap();
    assert_eq!(sim.position(), 2020.0);
    assert_eq!(sim.start_amount(), Some(2020.0));
    let sell = sim.sell_orders().next().unwrap();
    assert_eq!(sell.amount(), 2020.0);
    assert_eq!(sell.price(), sell_before.price() / 2.0);
    assert_eq!(sell.cost(), sell_before.cost());
    // 50.925 is above the 50.8 high
    assert!(sim.is_engaged());
    assert_eq!(sim.cash(), cash);
    assert_eq!(valuation.total, cash + 2020.0 * 50.0);
}

#[test]
fn scenario_weekend_valuation_uses_last_close() {
    let history = get_data().build().unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2)]);
    sim.run(day(1)).unwrap();

    let saturday = sim.trace().iter().find(|v| v.date == day(6)).unwrap();
    let friday = sim.trace().iter().find(|v| v.date == day(5)).unwrap();
    assert_eq!(saturday.close, 103.0);
    assert_eq!(saturday.total, friday.total);
}

#[test]
fn scenario_weekend_split_keeps_account_value() {
    // 2:1 split effective on Saturday, first post-split bar on Monday
    let history = PriceHistoryBuilder::builder()
        .bar(day(1), (100.0, 101.0, 99.0, 100.0))
        .bar(day(2), (100.0, 101.0, 98.0, 99.0))
        .bar(day(3), (97.0, 100.0, 94.0, 95.0))
        .bar(day(4), (95.0, 97.0, 94.0, 96.0))
        .bar(day(5), (96.0, 97.0, 94.0, 95.0))
        .bar(day(8), (47.5, 48.0, 47.0, 47.5))
        .split(day(6), 2.0)
        .build()
        .unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2)]);
    sim.run(day(1)).unwrap();

    let at = |d| *sim.trace().iter().find(|v| v.date == day(d)).unwrap();
    let (friday, saturday, sunday, monday) = (at(5), at(6), at(7), at(8));

    // 1010 shares bought at 97, the 101.85 sell never reached
    assert_eq!(friday.position, 1010.0);
    assert_close(friday.total, 1_000_000.0 - 1010.0 * 97.0 + 1010.0 * 95.0);

    assert_eq!(saturday.position, 2020.0);
    assert_eq!(saturday.close, 47.5);
    assert_close(saturday.total, friday.total);
    assert_close(sunday.total, friday.total);
    assert_close(monday.total, friday.total);
    assert!(sim.is_engaged());
}

#[test]
fn scenario_entry_after_weekend_split_uses_new_scale() {
    let history = get_data().split(day(6), 2.0).build().unwrap();
    let mut sim = simulator_entering_on(history, vec![day(7)]);
    for d in 1..=7 {
        sim.step(day(d)).unwrap();
    }
    // Friday's 103 close restated for the split
    assert_eq!(sim.buy_orders().next().unwrap().price(), 51.5);
    assert_eq!(sim.start_amount(), Some((100_000.0_f64 / 51.5).round()));
}

#[test]
fn scenario_zero_share_entry_stays_flat() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let history = PriceHistoryBuilder::builder()
        .bar(day(1), (1000.0, 1010.0, 990.0, 1000.0))
        .bar(day(2), (1000.0, 1010.0, 990.0, 1000.0))
        .bar(day(3), (1000.0, 1010.0, 990.0, 1000.0))
        .build()
        .unwrap();
    let evaluated = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&evaluated);
    let always = move |_: &PriceHistory, date: NaiveDate| -> Result<bool> {
        seen.borrow_mut().push(date);
        Ok(true)
    };
    let mut sim = TransactionSimulator::new(history, 100.0).unwrap().with_signal(always);

    // 100 / 10 / 1000 rounds to zero shares
    sim.step(day(1)).unwrap();
    assert_eq!(sim.start_amount(), None);
    assert!(!sim.is_engaged());
    assert_eq!(sim.buy_orders().count(), 0);

    // still flat, so the signal is asked again
    let valuation = sim.step(day(2)).unwrap();
    assert_eq!(sim.start_amount(), None);
    assert_eq!(sim.buy_orders().count(), 0);
    assert_eq!(*evaluated.borrow(), vec![day(1), day(2)]);
    assert_eq!(valuation.total, 100.0);
    assert_eq!(sim.cash(), 100.0);
}

#[test]
fn scenario_run_before_history_fails() {
    let history = get_data().build().unwrap();
    let before = NaiveDate::from_ymd_opt(2015, 5, 31).unwrap();

    let mut sim = simulator_entering_on(history.clone(), vec![]);
    assert!(matches!(sim.run(before), Err(Error::LookupFailure(date)) if date == before));

    let mut sim = TransactionSimulator::new(history, STARTING_CASH).unwrap();
    assert!(matches!(sim.run(before), Err(Error::LookupFailure(_))));
}

#[test]
fn scenario_default_rule_round_trips() {
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
    let mut sim = TransactionSimulator::new(history, STARTING_CASH).unwrap();
    sim.run(day(1)).unwrap();

    let totals = sim.trace().iter().map(|v| v.total).collect::<Vec<_>>();
    assert_eq!(
        totals,
        vec![
            1_000_000.0, // no signal
            1_000_000.0, // no signal
            1_000_000.0, // entry: 1000 shares at 100
            1_007_000.0, // bought at 100, marked at 107
            1_007_000.0, // sold at the 107 open, flat again
            1_007_000.0, // entry: 1007 shares at 100
            1_007_000.0, // weekend
            1_007_503.5, // bought at 100, marked at 100.5
        ]
    );
    assert!(sim.is_engaged());
    assert_eq!(sim.position(), 1007.0);
}

#[test]
fn scenario_reset() {
    let history = get_data().build().unwrap();
    let mut sim = simulator_entering_on(history, vec![day(2)]);
    sim.run(day(1)).unwrap();
    assert!(!sim.trace().is_empty());

    sim.reset();
    assert!(sim.trace().is_empty());
    assert!(!sim.is_engaged());
    assert_eq!(sim.buy_orders().count(), 0);
    assert_eq!(sim.sell_orders().count(), 0);
    assert_eq!(sim.cash(), STARTING_CASH);
    assert_eq!(sim.position(), 0.0);

    // replays identically
    sim.run(day(1)).unwrap();
    assert_eq!(sim.trace().len(), 8);
}
