use chrono::NaiveDate;

/// Generates a random ID.
pub fn random_id() -> u32 {
    rand::random()
}

/// Iterates every calendar day from `start` to `end`, both inclusive.
pub fn calendar_days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

#[cfg(test)]
#[test]
fn calendar_days_inclusive() {
    let start = NaiveDate::from_ymd_opt(2015, 2, 27).unwrap();
    let end = NaiveDate::from_ymd_opt(2015, 3, 2).unwrap();
    let days = calendar_days(start, end).collect::<Vec<_>>();
    assert_eq!(days.len(), 4);
    assert_eq!(days.first(), Some(&start));
    assert_eq!(days.last(), Some(&end));
}

#[cfg(test)]
#[test]
fn calendar_days_inverted_is_empty() {
    let start = NaiveDate::from_ymd_opt(2015, 3, 2).unwrap();
    let end = NaiveDate::from_ymd_opt(2015, 2, 27).unwrap();
    assert_eq!(calendar_days(start, end).count(), 0);
}
