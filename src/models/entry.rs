use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One authoritative timer record: one per (user, project, calendar day).
///
/// Invariants the store and service maintain together:
/// - `is_running == true` implies `last_paused == None`
/// - `paused_secs` never decreases
/// - once `is_checked_out` the entry is immutable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub company_id: String,
    pub sub_task_id: Option<String>,
    pub date: NaiveDate,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub is_running: bool,
    pub last_paused: Option<DateTime<Utc>>,
    /// Cumulative seconds spent paused.
    pub paused_secs: i64,
    /// Work seconds snapshotted at each pause.
    pub effective_secs: i64,
    /// Final duration, written once at check-out.
    pub total_secs: Option<i64>,
    pub is_checked_out: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    /// Work seconds as of `now`. Server clock is authoritative; clock skew
    /// can never produce a negative duration.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> i64 {
        if let Some(total) = self.total_secs {
            return total.max(0);
        }
        if self.is_running {
            let wall = (now - self.check_in).num_seconds();
            (wall - self.paused_secs).max(0)
        } else {
            self.effective_secs.max(0)
        }
    }
}

/// Point-in-time elapsed view returned by the elapsed-time query and
/// reconciled into the client clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElapsedSnapshot {
    pub is_running: bool,
    pub is_checked_out: bool,
    pub elapsed_time: i64,
    pub paused_duration: i64,
    pub check_in_time: Option<DateTime<Utc>>,
    pub last_paused: Option<DateTime<Utc>>,
    pub total_duration: Option<i64>,
}

impl ElapsedSnapshot {
    /// The "no active timer" shape: querying a day with no open entry is not
    /// an error.
    pub fn idle() -> Self {
        Self {
            is_running: false,
            is_checked_out: false,
            elapsed_time: 0,
            paused_duration: 0,
            check_in_time: None,
            last_paused: None,
            total_duration: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseResumeOutcome {
    pub is_running: bool,
    pub elapsed_time: i64,
    pub paused_duration: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutSummary {
    pub total_duration: i64,
    pub formatted_time: String,
    pub check_out_time: DateTime<Utc>,
}

/// "3h 25m 10s" style rendering used in checkout summaries and reports.
pub fn format_hms(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours}h {minutes}m {secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(now: DateTime<Utc>) -> TimeEntry {
        TimeEntry {
            id: "e1".into(),
            user_id: "u1".into(),
            project_id: "p1".into(),
            company_id: "c1".into(),
            sub_task_id: None,
            date: now.date_naive(),
            check_in: now,
            check_out: None,
            is_running: true,
            last_paused: None,
            paused_secs: 0,
            effective_secs: 0,
            total_secs: None,
            is_checked_out: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn running_elapsed_subtracts_paused_time() {
        let start = Utc::now();
        let mut e = entry(start);
        e.paused_secs = 60;
        assert_eq!(e.elapsed_at(start + Duration::seconds(150)), 90);
    }

    #[test]
    fn paused_entry_reports_frozen_effective_time() {
        let start = Utc::now();
        let mut e = entry(start);
        e.is_running = false;
        e.last_paused = Some(start + Duration::seconds(30));
        e.effective_secs = 30;
        assert_eq!(e.elapsed_at(start + Duration::seconds(500)), 30);
    }

    #[test]
    fn skewed_clock_clamps_to_zero() {
        let start = Utc::now();
        let mut e = entry(start);
        e.paused_secs = 10_000;
        assert_eq!(e.elapsed_at(start + Duration::seconds(5)), 0);
    }

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_hms(0), "0h 0m 0s");
        assert_eq!(format_hms(3661), "1h 1m 1s");
        assert_eq!(format_hms(-5), "0h 0m 0s");
    }
}
