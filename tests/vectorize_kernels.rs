//! Vectorized kernel tests through the public API

use chrono::{FixedOffset, NaiveDate};
use shardtxn::vectorize::timestamp::{date_to_timestamp, is_valid_timestamp};
use shardtxn::vectorize::trig::{atan, cos, sin, tan};
use shardtxn::vectorize::Column;

#[test]
fn test_null_positions_preserved_by_every_trig_kernel() {
    let input = Column::from_options(vec![Some(1.0f64), None, Some(3.0)]);
    let kernels: [(fn(&Column<f64>) -> Column<f64>, fn(f64) -> f64); 4] = [
        (sin, f64::sin),
        (cos, f64::cos),
        (tan, f64::tan),
        (atan, f64::atan),
    ];

    for (kernel, reference) in kernels {
        let out = kernel(&input);
        assert_eq!(out.get(0), Some(&reference(1.0)));
        assert!(out.is_null(1));
        assert_eq!(out.get(2), Some(&reference(3.0)));
        assert_eq!(out.nulls().count(), 1);
    }
}

#[test]
fn test_dates_before_epoch_become_null() {
    let utc = FixedOffset::east_opt(0).unwrap();
    let dates = Column::from_values(vec![
        NaiveDate::from_ymd_opt(1960, 5, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
    ]);

    let out = date_to_timestamp(&utc, &dates);
    assert!(out.is_null(0));
    assert!(is_valid_timestamp(*out.get(1).unwrap()));
}
