use chrono::Duration;

/// (minimum hours before showtime, percent refunded), highest tier first.
const REFUND_TIERS: [(i64, i64); 3] = [(24, 100), (12, 75), (2, 50)];

/// Percentage of the paid amount returned when cancelling `until_start` before the show.
pub fn refund_percentage(until_start: Duration) -> i64 {
    let minutes = until_start.num_minutes();
    REFUND_TIERS
        .iter()
        .find(|(hours, _)| minutes >= hours * 60)
        .map(|(_, pct)| *pct)
        .unwrap_or(0)
}

/// Refund in minor units, rounded down. Never exceeds `total_amount`.
pub fn refund_amount(total_amount: i64, until_start: Duration) -> i64 {
    let refund = i128::from(total_amount) * i128::from(refund_percentage(until_start)) / 100;
    i64::try_from(refund).unwrap_or(total_amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_tiers() {
        assert_eq!(refund_percentage(Duration::hours(30)), 100);
        assert_eq!(refund_percentage(Duration::hours(24)), 100);
        assert_eq!(refund_percentage(Duration::hours(23) + Duration::minutes(59)), 75);
        assert_eq!(refund_percentage(Duration::hours(12)), 75);
        assert_eq!(refund_percentage(Duration::hours(5)), 50);
        assert_eq!(refund_percentage(Duration::hours(2)), 50);
        assert_eq!(refund_percentage(Duration::minutes(119)), 0);
        assert_eq!(refund_percentage(Duration::hours(-3)), 0);
    }

    #[test]
    fn test_refund_amount_rounds_down() {
        assert_eq!(refund_amount(2_000, Duration::hours(30)), 2_000);
        assert_eq!(refund_amount(2_000, Duration::hours(5)), 1_000);
        assert_eq!(refund_amount(999, Duration::hours(13)), 749);
        assert_eq!(refund_amount(2_000, Duration::hours(1)), 0);
    }

    #[test]
    fn test_refund_amount_near_i64_max() {
        assert_eq!(refund_amount(i64::MAX, Duration::hours(30)), i64::MAX);
        assert_eq!(refund_amount(i64::MAX / 50, Duration::hours(30)), i64::MAX / 50);
        assert_eq!(refund_amount(i64::MAX, Duration::hours(5)), i64::MAX / 2);
    }
}
