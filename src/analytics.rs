//! Report windows, growth math and the response shapes of the dashboards.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::errors::ApiError;

pub const DEFAULT_PERIOD_DAYS: i64 = 30;
const MAX_PERIOD_DAYS: i64 = 366;

/// Inclusive date range used by every aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ApiError> {
        if start > end {
            return Err(ApiError::validation("start_date must not be after end_date"));
        }
        let window = Self { start, end };
        if window.days() > MAX_PERIOD_DAYS {
            return Err(ApiError::validation(format!(
                "A window spans at most {MAX_PERIOD_DAYS} days"
            )));
        }
        Ok(window)
    }

    /// The last `days` days ending on `today`.
    pub fn trailing(today: NaiveDate, days: i64) -> Result<Self, ApiError> {
        if !(1..=MAX_PERIOD_DAYS).contains(&days) {
            return Err(ApiError::validation(format!(
                "days must be between 1 and {MAX_PERIOD_DAYS}"
            )));
        }
        let start = today
            .checked_sub_signed(Duration::days(days - 1))
            .ok_or_else(out_of_range)?;
        Self::new(start, today)
    }

    /// Explicit `start_date`/`end_date` win over `days`.
    pub fn from_query(
        today: NaiveDate,
        days: Option<i64>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Self, ApiError> {
        match (start_date, end_date) {
            (Some(start), Some(end)) => Self::new(parse_date(start)?, parse_date(end)?),
            (Some(start), None) => Self::new(parse_date(start)?, today),
            (None, Some(_)) => Err(ApiError::validation(
                "end_date requires start_date",
            )),
            (None, None) => Self::trailing(today, days.unwrap_or(DEFAULT_PERIOD_DAYS)),
        }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Window of equal length ending the day before `start`.
    pub fn previous(&self) -> Result<Self, ApiError> {
        let end = self.start.pred_opt().ok_or_else(out_of_range)?;
        let start = end
            .checked_sub_signed(Duration::days(self.days() - 1))
            .ok_or_else(out_of_range)?;
        Ok(Self { start, end })
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Exclusive upper bound for timestamp comparisons. Saturates at the
    /// last representable day.
    pub fn ends_before(&self) -> DateTime<Utc> {
        self.end
            .succ_opt()
            .unwrap_or(NaiveDate::MAX)
            .and_time(NaiveTime::MIN)
            .and_utc()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.days()).map(move |offset| start + Duration::days(offset))
    }
}

fn out_of_range() -> ApiError {
    ApiError::validation("Date range is out of bounds")
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ApiError> {
    Ok(NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")?)
}

/// Percentage change, 0 when there is nothing to compare against.
pub fn growth_percentage(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    round2((current - previous) / previous * 100.0)
}

/// `part / whole * 100`, 0 when `whole` is 0.
pub fn rate(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metric {
    pub current: f64,
    pub previous: f64,
    pub growth: f64,
}

impl Metric {
    pub fn new(current: f64, previous: f64) -> Self {
        Self {
            current,
            previous,
            growth: growth_percentage(current, previous),
        }
    }

    pub fn counts(current: i64, previous: i64) -> Self {
        Self::new(current as f64, previous as f64)
    }
}

/// Scalar aggregates for one window of a business.
#[derive(Debug, Clone, Copy, Default, sqlx::FromRow)]
pub struct BusinessTotals {
    pub revenue: f64,
    pub transactions: i64,
    pub check_ins: i64,
    pub new_members: i64,
}

#[derive(Debug, Clone, Copy, Default, sqlx::FromRow)]
pub struct PlatformTotals {
    pub revenue: f64,
    pub payments: i64,
    pub check_ins: i64,
    pub new_users: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HourlyCount {
    pub hour: i32,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PeakHour {
    pub hour: String,
    pub check_ins: i64,
}

impl From<HourlyCount> for PeakHour {
    fn from(row: HourlyCount) -> Self {
        Self {
            hour: format!("{:02}:00", row.hour),
            check_ins: row.count,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyAmount {
    pub day: NaiveDate,
    pub amount: f64,
    pub count: i64,
}

/// Pads a sparse per-day series with zero rows so every date in the window
/// is present.
pub fn fill_daily_series(window: &DateWindow, rows: Vec<DailyAmount>) -> Vec<DailyAmount> {
    let mut rows = rows.into_iter().peekable();
    let mut series = Vec::with_capacity(window.days() as usize);
    for day in window.dates() {
        while rows.peek().is_some_and(|row| row.day < day) {
            rows.next();
        }
        match rows.peek() {
            Some(row) if row.day == day => {
                if let Some(row) = rows.next() {
                    series.push(row);
                }
            }
            _ => series.push(DailyAmount {
                day,
                amount: 0.0,
                count: 0,
            }),
        }
    }
    series
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessDashboard {
    pub window: DateWindow,
    pub revenue: Metric,
    pub transactions: Metric,
    pub check_ins: Metric,
    pub total_members: i64,
    pub active_members: i64,
    pub new_members: Metric,
    pub peak_hours: Vec<PeakHour>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub window: DateWindow,
    pub total_users: i64,
    pub total_businesses: i64,
    pub total_members: i64,
    pub revenue: Metric,
    pub payments: Metric,
    pub check_ins: Metric,
    pub new_users: Metric,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesReport {
    pub window: DateWindow,
    pub total_amount: f64,
    pub total_count: i64,
    pub series: Vec<DailyAmount>,
}

impl SeriesReport {
    pub fn new(window: DateWindow, rows: Vec<DailyAmount>) -> Self {
        let series = fill_daily_series(&window, rows);
        Self {
            window,
            total_amount: round2(series.iter().map(|row| row.amount).sum()),
            total_count: series.iter().map(|row| row.count).sum(),
            series,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberStatsOverview {
    pub total_members: i64,
    pub active_members: i64,
    pub inactive_members: i64,
    pub new_members_last_30_days: i64,
    pub payment_status: StatusBreakdown,
    pub membership_status: StatusBreakdown,
    pub financial: FinancialOverview,
}

pub type StatusBreakdown = std::collections::BTreeMap<&'static str, i64>;

#[derive(Debug, Clone, Serialize)]
pub struct FinancialOverview {
    pub total_invoices: i64,
    pub paid_invoices: i64,
    pub pending_invoices: i64,
    pub total_revenue: f64,
    pub payment_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingReport {
    pub this_month: BookingPeriod,
    pub last_month: BookingPeriod,
    pub total_change: f64,
    pub approval_rate_change: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingPeriod {
    pub total: i64,
    pub approved: i64,
    pub rejected: i64,
    pub pending: i64,
    pub approval_rate: f64,
}

impl BookingPeriod {
    pub fn new(total: i64, approved: i64, rejected: i64, pending: i64) -> Self {
        Self {
            total,
            approved,
            rejected,
            pending,
            approval_rate: rate(approved, total),
        }
    }
}

impl BookingReport {
    pub fn new(this_month: BookingPeriod, last_month: BookingPeriod) -> Self {
        Self {
            total_change: growth_percentage(this_month.total as f64, last_month.total as f64),
            approval_rate_change: round2(this_month.approval_rate - last_month.approval_rate),
            this_month,
            last_month,
        }
    }
}

/// Calendar month containing `today` and the one before it.
pub fn month_windows(today: NaiveDate) -> (DateWindow, DateWindow) {
    use chrono::Datelike;
    let first = today.with_day(1).unwrap_or(today);
    let last_month_end = first - Duration::days(1);
    let last_month_start = last_month_end.with_day(1).unwrap_or(last_month_end);
    (
        DateWindow {
            start: first,
            end: today,
        },
        DateWindow {
            start: last_month_start,
            end: last_month_end,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_growth_with_zero_previous_is_zero() {
        assert_eq!(growth_percentage(100.0, 0.0), 0.0);
        assert_eq!(growth_percentage(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_growth_percentage() {
        assert_eq!(growth_percentage(150.0, 100.0), 50.0);
        assert_eq!(growth_percentage(50.0, 100.0), -50.0);
        assert_eq!(growth_percentage(1.0, 3.0), -66.67);
    }

    #[test]
    fn test_previous_window_has_equal_length() {
        let window = DateWindow::trailing(date(2024, 3, 31), 30).unwrap();
        assert_eq!(window.start, date(2024, 3, 2));
        assert_eq!(window.days(), 30);

        let previous = window.previous().unwrap();
        assert_eq!(previous.end, date(2024, 3, 1));
        assert_eq!(previous.days(), 30);
        assert_eq!(previous.start, date(2024, 2, 1));
    }

    #[test]
    fn test_window_bounds() {
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 1)).unwrap();
        assert_eq!(window.days(), 1);
        assert_eq!(
            window.ends_before() - window.starts_at(),
            Duration::days(1)
        );
        assert!(DateWindow::new(date(2024, 1, 2), date(2024, 1, 1)).is_err());
        assert!(DateWindow::trailing(date(2024, 1, 1), 0).is_err());
    }

    #[test]
    fn test_from_query() {
        let today = date(2024, 5, 20);
        let explicit =
            DateWindow::from_query(today, Some(7), Some("2024-05-01"), Some("2024-05-10")).unwrap();
        assert_eq!(explicit.days(), 10);

        let trailing = DateWindow::from_query(today, Some(7), None, None).unwrap();
        assert_eq!(trailing.start, date(2024, 5, 14));

        let err = DateWindow::from_query(today, None, Some("05/01/2024"), None).unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD"));
        assert!(DateWindow::from_query(today, None, None, Some("2024-05-10")).is_err());
    }

    #[test]
    fn test_explicit_window_is_capped() {
        let today = date(2025, 1, 1);
        let err = DateWindow::from_query(today, None, Some("0001-01-01"), Some("9999-12-31"))
            .unwrap_err();
        assert!(err.to_string().contains("366"));
        assert!(
            DateWindow::from_query(today, None, Some("-200000-01-01"), Some("+200000-01-01"))
                .is_err()
        );
        assert!(DateWindow::from_query(today, None, Some("2024-01-01"), Some("2024-12-31")).is_ok());
        assert!(DateWindow::new(date(2023, 1, 1), date(2024, 12, 31)).is_err());
    }

    #[test]
    fn test_previous_window_at_calendar_floor() {
        let window = DateWindow::new(NaiveDate::MIN, NaiveDate::MIN).unwrap();
        let err = window.previous().unwrap_err();
        assert_eq!(err.to_string(), "Date range is out of bounds");

        let last = DateWindow::new(NaiveDate::MAX, NaiveDate::MAX).unwrap();
        assert_eq!(last.ends_before().date_naive(), NaiveDate::MAX);
    }

    #[test]
    fn test_empty_series_sums_to_zero() {
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 3)).unwrap();
        let report = SeriesReport::new(window, Vec::new());
        assert_eq!(report.total_amount, 0.0);
        assert_eq!(report.total_count, 0);
        assert_eq!(report.series.len(), 3);
        assert!(report.series.iter().all(|row| row.amount == 0.0));
    }

    #[test]
    fn test_series_is_padded() {
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 4)).unwrap();
        let rows = vec![
            DailyAmount {
                day: date(2024, 1, 2),
                amount: 20.0,
                count: 2,
            },
            DailyAmount {
                day: date(2024, 1, 4),
                amount: 5.5,
                count: 1,
            },
        ];
        let report = SeriesReport::new(window, rows);
        let amounts: Vec<f64> = report.series.iter().map(|row| row.amount).collect();
        assert_eq!(amounts, vec![0.0, 20.0, 0.0, 5.5]);
        assert_eq!(report.total_amount, 25.5);
        assert_eq!(report.total_count, 3);
    }

    #[test]
    fn test_peak_hour_label() {
        let peak = PeakHour::from(HourlyCount { hour: 7, count: 12 });
        assert_eq!(peak.hour, "07:00");
        assert_eq!(peak.check_ins, 12);
    }

    #[test]
    fn test_booking_report() {
        let report = BookingReport::new(
            BookingPeriod::new(10, 8, 1, 1),
            BookingPeriod::new(5, 2, 2, 1),
        );
        assert_eq!(report.this_month.approval_rate, 80.0);
        assert_eq!(report.last_month.approval_rate, 40.0);
        assert_eq!(report.total_change, 100.0);
        assert_eq!(report.approval_rate_change, 40.0);

        let empty = BookingPeriod::new(0, 0, 0, 0);
        assert_eq!(empty.approval_rate, 0.0);
    }

    #[test]
    fn test_month_windows() {
        let (this_month, last_month) = month_windows(date(2024, 3, 15));
        assert_eq!(this_month.start, date(2024, 3, 1));
        assert_eq!(last_month.start, date(2024, 2, 1));
        assert_eq!(last_month.end, date(2024, 2, 29));
    }
}
