//! Occupancy derived from the access ledger.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AccessAction, AccessEvent};

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The UTC calendar day containing `now`.
    pub fn day_of(now: DateTime<Utc>) -> Self {
        let start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        Self {
            from: start,
            to: start + Duration::days(1) - Duration::nanoseconds(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyReport {
    pub check_ins: u64,
    pub check_outs: u64,
    pub overrides: u64,
    pub denied: u64,
    /// Allowed entries minus allowed exits, floored at zero.
    pub current: u64,
    /// Events retained by the ledger, whatever their timestamp.
    pub total_events: u64,
}

/// Fold ledger events into occupancy figures for `window`.
///
/// Only allowed entries and exits move the headcount; overrides and denials
/// are counted separately.
pub fn occupancy_for<'a>(
    events: impl IntoIterator<Item = &'a AccessEvent>,
    window: TimeWindow,
) -> OccupancyReport {
    let mut report = OccupancyReport::default();

    for event in events {
        report.total_events += 1;
        if !window.contains(event.timestamp) {
            continue;
        }
        if !event.is_allowed() {
            report.denied += 1;
            continue;
        }
        match event.action {
            AccessAction::Entry => report.check_ins += 1,
            AccessAction::Exit => report.check_outs += 1,
            AccessAction::Override => report.overrides += 1,
        }
    }

    report.current = report.check_ins.saturating_sub(report.check_outs);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DenyReason, Outcome};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 12, 8, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn event(minute: i64, action: AccessAction, outcome: Outcome) -> AccessEvent {
        AccessEvent {
            event_id: Uuid::new_v4(),
            timestamp: at(minute),
            credential_code: "WKR-1".to_string(),
            credential_kind: None,
            holder_id: None,
            holder_name: None,
            action,
            zone: None,
            outcome,
            deny_reason: (outcome == Outcome::Denied).then_some(DenyReason::Expired),
            overridden_reason: None,
            staff_id: "STAFF001".to_string(),
            staff_name: "Security Officer Alpha".to_string(),
            override_reason: None,
            notes: None,
        }
    }

    fn day() -> TimeWindow {
        TimeWindow::day_of(at(0))
    }

    #[test]
    fn test_entries_minus_exits() {
        let events = vec![
            event(0, AccessAction::Entry, Outcome::Allowed),
            event(1, AccessAction::Entry, Outcome::Allowed),
            event(2, AccessAction::Exit, Outcome::Allowed),
        ];
        let report = occupancy_for(&events, day());
        assert_eq!(report.check_ins, 2);
        assert_eq!(report.check_outs, 1);
        assert_eq!(report.current, 1);
    }

    #[test]
    fn test_exit_only_floors_at_zero() {
        let events = vec![event(0, AccessAction::Exit, Outcome::Allowed)];
        assert_eq!(occupancy_for(&events, day()).current, 0);
    }

    #[test]
    fn test_denied_and_overrides_counted_apart() {
        let events = vec![
            event(0, AccessAction::Entry, Outcome::Denied),
            event(1, AccessAction::Override, Outcome::Allowed),
            event(2, AccessAction::Entry, Outcome::Allowed),
        ];
        let report = occupancy_for(&events, day());
        assert_eq!(report.denied, 1);
        assert_eq!(report.overrides, 1);
        assert_eq!(report.current, 1);
    }

    #[test]
    fn test_events_outside_window_ignored() {
        let events = vec![
            event(0, AccessAction::Entry, Outcome::Allowed),
            event(60 * 24, AccessAction::Entry, Outcome::Allowed),
        ];
        let report = occupancy_for(&events, day());
        assert_eq!(report.check_ins, 1);
        assert_eq!(report.total_events, 2);
    }

    #[test]
    fn test_day_window_bounds() {
        let window = TimeWindow::day_of(at(300));
        assert_eq!(window.from, Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2024, 1, 12, 23, 59, 59).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2024, 1, 13, 0, 0, 0).unwrap()));
    }
}
