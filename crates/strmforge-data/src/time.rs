//! Epoch-second conversions at the store boundary.
//!
//! The `Any` driver only moves scalar column types, so timestamps persist as
//! `BIGINT` seconds and become `chrono` values here.

use chrono::{DateTime, TimeZone, Utc};

pub(crate) fn to_epoch(value: DateTime<Utc>) -> i64 {
    value.timestamp()
}

#[cfg_attr(not(test), allow(dead_code))]
pub(crate) fn to_epoch_opt(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(to_epoch)
}

pub(crate) fn from_epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn from_epoch_opt(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.map(from_epoch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_round_trips_to_second_precision() {
        let now = Utc::now();
        let round_tripped = from_epoch(to_epoch(now));
        assert_eq!(round_tripped.timestamp(), now.timestamp());
    }

    #[test]
    fn optional_conversions_preserve_absence() {
        assert_eq!(to_epoch_opt(None), None);
        assert_eq!(from_epoch_opt(None), None);
        let stamp = from_epoch(86_400);
        assert_eq!(to_epoch_opt(Some(stamp)), Some(86_400));
    }
}
