use chrono::{DateTime, Datelike, Utc};

use crate::db_types::OrderId;

/// The counter period for an order created at `at`: two-digit year followed by two-digit month, e.g. `2501`.
///
/// Sequence numbers restart at 1 for every period.
pub fn order_id_period(at: DateTime<Utc>) -> String {
    format!("{:02}{:02}", at.year().rem_euclid(100), at.month())
}

/// Formats an order id as `T` + period + 4-digit zero padded sequence number.
pub fn format_order_id(period: &str, sequence: i64) -> OrderId {
    OrderId(format!("T{period}{sequence:04}"))
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn periods() {
        let jan = Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap();
        assert_eq!(order_id_period(jan), "2501");
        let dec = Utc.with_ymd_and_hms(2030, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(order_id_period(dec), "3012");
    }

    #[test]
    fn formatting() {
        assert_eq!(format_order_id("2501", 1).as_str(), "T25010001");
        assert_eq!(format_order_id("2511", 42).as_str(), "T25110042");
        assert_eq!(format_order_id("2511", 12345).as_str(), "T251112345");
    }
}
