use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entry::TimeEntry;

/// One user's day on one project: raw entries plus the summed work time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTimeReport {
    pub project_id: String,
    pub date: NaiveDate,
    pub total_time: i64,
    pub formatted_total_time: String,
    pub entries: Vec<TimeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTimeAggregate {
    pub user_id: String,
    pub total_duration: i64,
    pub total_sessions: i64,
    pub avg_session_time: i64,
    pub last_activity: Option<DateTime<Utc>>,
    pub formatted_total_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStat {
    pub project_id: String,
    pub total_time: i64,
    pub total_sessions: i64,
    pub unique_users_count: i64,
    pub avg_session_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDashboard {
    pub active_timers: usize,
    pub active_timer_details: Vec<TimeEntry>,
    pub project_stats: Vec<ProjectStat>,
    pub today_activity: Vec<TimeEntry>,
    pub date_range: DateRange,
}
