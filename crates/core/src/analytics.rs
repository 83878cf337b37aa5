//! Time bucketing for revenue series.
//!
//! The database groups paid orders by `date_trunc(period, created_at)`; it
//! only returns buckets that contain orders. [`fill_gaps`] turns that sparse
//! result into a dense series so charts get one point per period.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::round_money;

/// Bucket width for revenue series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
}

impl Period {
    /// Name accepted by Postgres `date_trunc`.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Start of the bucket containing `ts`.
    ///
    /// Weeks start on Monday, matching Postgres `date_trunc('week', ..)`.
    #[must_use]
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        let start = match self {
            Self::Day => date,
            Self::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Self::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date),
        };
        Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN))
    }

    /// Start of the bucket after the one starting at `bucket`.
    #[must_use]
    pub fn next(self, bucket: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => bucket + Duration::days(1),
            Self::Week => bucket + Duration::weeks(1),
            Self::Month => {
                let date = bucket.date_naive();
                let (year, month) = if date.month() == 12 {
                    (date.year() + 1, 1)
                } else {
                    (date.year(), date.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1).map_or(bucket + Duration::days(31), |d| {
                    Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::MIN))
                })
            }
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            _ => Err(format!("invalid period: {s}")),
        }
    }
}

/// Revenue and order count for one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub bucket: DateTime<Utc>,
    pub revenue: Decimal,
    pub orders: i64,
}

impl RevenuePoint {
    #[must_use]
    pub const fn empty(bucket: DateTime<Utc>) -> Self {
        Self {
            bucket,
            revenue: Decimal::ZERO,
            orders: 0,
        }
    }
}

/// Produce one point per bucket overlapping the half-open range
/// `[start, end)`, matching `created_at >= start AND created_at < end`.
///
/// Points are re-bucketed before merging, so it is safe to pass points whose
/// timestamps are not aligned. Points outside the range are dropped.
#[must_use]
pub fn fill_gaps(
    points: &[RevenuePoint],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    period: Period,
) -> Vec<RevenuePoint> {
    let mut series = Vec::new();
    let mut bucket = period.bucket_start(start);
    while bucket < end {
        series.push(RevenuePoint::empty(bucket));
        bucket = period.next(bucket);
    }

    for point in points {
        let key = period.bucket_start(point.bucket);
        if let Ok(idx) = series.binary_search_by_key(&key, |p| p.bucket)
            && let Some(slot) = series.get_mut(idx)
        {
            slot.revenue += point.revenue;
            slot.orders += point.orders;
        }
    }

    series
}

/// Revenue divided by order count, zero when there are no orders.
#[must_use]
pub fn average_order_value(revenue: Decimal, orders: i64) -> Decimal {
    if orders <= 0 {
        return Decimal::ZERO;
    }
    round_money(revenue / Decimal::from(orders))
}

/// `part` as a percentage of `total`, rounded to one decimal place.
#[must_use]
pub fn share_of_total(part: Decimal, total: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (part / total * Decimal::ONE_HUNDRED).round_dp(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_bucket_start_day_week_month() {
        // 2026-10-15 is a Thursday
        let ts = at(2026, 10, 15, 17);
        assert_eq!(Period::Day.bucket_start(ts), at(2026, 10, 15, 0));
        assert_eq!(Period::Week.bucket_start(ts), at(2026, 10, 12, 0));
        assert_eq!(Period::Month.bucket_start(ts), at(2026, 10, 1, 0));
    }

    #[test]
    fn test_next_month_rolls_year() {
        assert_eq!(Period::Month.next(at(2026, 12, 1, 0)), at(2027, 1, 1, 0));
        assert_eq!(Period::Month.next(at(2026, 1, 1, 0)), at(2026, 2, 1, 0));
    }

    #[test]
    fn test_fill_gaps_daily() {
        let points = vec![
            RevenuePoint {
                bucket: at(2026, 10, 2, 0),
                revenue: Decimal::new(1500, 2),
                orders: 1,
            },
            RevenuePoint {
                bucket: at(2026, 10, 4, 9),
                revenue: Decimal::new(500, 2),
                orders: 2,
            },
        ];

        let series = fill_gaps(&points, at(2026, 10, 1, 8), at(2026, 10, 4, 23), Period::Day);

        assert_eq!(series.len(), 4);
        let revenues: Vec<Decimal> = series.iter().map(|p| p.revenue).collect();
        assert_eq!(
            revenues,
            vec![
                Decimal::ZERO,
                Decimal::new(1500, 2),
                Decimal::ZERO,
                Decimal::new(500, 2)
            ]
        );
        assert_eq!(series.last().unwrap().orders, 2);
    }

    #[test]
    fn test_fill_gaps_drops_out_of_range_points() {
        let points = vec![RevenuePoint {
            bucket: at(2025, 1, 1, 0),
            revenue: Decimal::ONE,
            orders: 1,
        }];
        let series = fill_gaps(&points, at(2026, 1, 1, 0), at(2026, 3, 1, 0), Period::Month);
        assert_eq!(series.len(), 2);
        assert!(series.iter().all(|p| p.orders == 0));
    }

    #[test]
    fn test_fill_gaps_empty_range() {
        assert!(fill_gaps(&[], at(2026, 2, 1, 0), at(2026, 1, 1, 0), Period::Day).is_empty());
        assert!(fill_gaps(&[], at(2026, 2, 1, 0), at(2026, 2, 1, 0), Period::Day).is_empty());
    }

    #[test]
    fn test_fill_gaps_aligned_end_is_exclusive() {
        let days = fill_gaps(&[], at(2026, 10, 1, 0), at(2026, 10, 3, 0), Period::Day);
        let buckets: Vec<_> = days.iter().map(|p| p.bucket).collect();
        assert_eq!(buckets, vec![at(2026, 10, 1, 0), at(2026, 10, 2, 0)]);

        let months = fill_gaps(&[], at(2026, 9, 1, 0), at(2026, 11, 1, 0), Period::Month);
        let buckets: Vec<_> = months.iter().map(|p| p.bucket).collect();
        assert_eq!(buckets, vec![at(2026, 9, 1, 0), at(2026, 10, 1, 0)]);

        // a point stamped exactly at `end` belongs to the next range
        let points = vec![RevenuePoint {
            bucket: at(2026, 10, 3, 0),
            revenue: Decimal::ONE,
            orders: 1,
        }];
        let days = fill_gaps(&points, at(2026, 10, 1, 0), at(2026, 10, 3, 0), Period::Day);
        assert!(days.iter().all(|p| p.orders == 0));
    }

    #[test]
    fn test_fill_gaps_unaligned_end_keeps_partial_bucket() {
        let series = fill_gaps(&[], at(2026, 10, 1, 0), at(2026, 10, 3, 6), Period::Day);
        assert_eq!(series.len(), 3);
        assert_eq!(series.last().unwrap().bucket, at(2026, 10, 3, 0));
    }

    #[test]
    fn test_average_order_value() {
        assert_eq!(average_order_value(Decimal::new(100, 0), 3), Decimal::new(3333, 2));
        assert_eq!(average_order_value(Decimal::new(100, 0), 0), Decimal::ZERO);
    }

    #[test]
    fn test_share_of_total() {
        assert_eq!(share_of_total(Decimal::ONE, Decimal::new(3, 0)), Decimal::new(333, 1));
        assert_eq!(share_of_total(Decimal::ONE, Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("weekly".parse::<Period>(), Ok(Period::Week));
        assert!("yearly".parse::<Period>().is_err());
    }
}
