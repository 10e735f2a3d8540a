use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_date, parse_datetime, parse_optional_datetime},
    Database,
};
use crate::models::TimeEntry;

const ENTRY_COLUMNS: &str = "id, user_id, project_id, company_id, sub_task_id, date, check_in, \
     check_out, is_running, last_paused, paused_secs, effective_secs, total_secs, \
     is_checked_out, created_at, updated_at";

fn row_to_entry(row: &Row) -> Result<TimeEntry> {
    let date: String = row.get("date")?;
    let check_in: String = row.get("check_in")?;
    let check_out: Option<String> = row.get("check_out")?;
    let last_paused: Option<String> = row.get("last_paused")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(TimeEntry {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        project_id: row.get("project_id")?,
        company_id: row.get("company_id")?,
        sub_task_id: row.get("sub_task_id")?,
        date: parse_date(&date, "date")?,
        check_in: parse_datetime(&check_in, "check_in")?,
        check_out: parse_optional_datetime(check_out, "check_out")?,
        is_running: row.get("is_running")?,
        last_paused: parse_optional_datetime(last_paused, "last_paused")?,
        paused_secs: row.get("paused_secs")?,
        effective_secs: row.get("effective_secs")?,
        total_secs: row.get("total_secs")?,
        is_checked_out: row.get("is_checked_out")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

/// Per-user aggregate over checked-out entries of one project.
#[derive(Debug, Clone)]
pub struct UserAggregateRow {
    pub user_id: String,
    pub total_secs: i64,
    pub total_sessions: i64,
    pub avg_session_secs: i64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Per-project aggregate over checked-out entries of one company.
#[derive(Debug, Clone)]
pub struct ProjectStatRow {
    pub project_id: String,
    pub total_secs: i64,
    pub total_sessions: i64,
    pub unique_users: i64,
    pub avg_session_secs: i64,
}

impl Database {
    pub async fn insert_entry(&self, entry: &TimeEntry) -> Result<()> {
        let record = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO time_entries (id, user_id, project_id, company_id, sub_task_id, \
                 date, check_in, check_out, is_running, last_paused, paused_secs, \
                 effective_secs, total_secs, is_checked_out, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    record.id,
                    record.user_id,
                    record.project_id,
                    record.company_id,
                    record.sub_task_id,
                    record.date.to_string(),
                    record.check_in.to_rfc3339(),
                    record.check_out.as_ref().map(|dt| dt.to_rfc3339()),
                    record.is_running,
                    record.last_paused.as_ref().map(|dt| dt.to_rfc3339()),
                    record.paused_secs,
                    record.effective_secs,
                    record.total_secs,
                    record.is_checked_out,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// The day's non-checked-out entry for (user, project), if any. At most
    /// one exists; check-in enforces that before inserting.
    pub async fn find_open_entry(
        &self,
        user_id: &str,
        project_id: &str,
        company_id: &str,
        date: NaiveDate,
    ) -> Result<Option<TimeEntry>> {
        let (user_id, project_id, company_id) = (
            user_id.to_string(),
            project_id.to_string(),
            company_id.to_string(),
        );
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM time_entries
                 WHERE user_id = ?1 AND project_id = ?2 AND company_id = ?3
                   AND date = ?4 AND is_checked_out = 0
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query(params![
                user_id,
                project_id,
                company_id,
                date.to_string()
            ])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_entry(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// The day's newest entry for (user, project), any state. The open entry
    /// always has the newest check-in, so it wins when present.
    pub async fn find_latest_entry(
        &self,
        user_id: &str,
        project_id: &str,
        company_id: &str,
        date: NaiveDate,
    ) -> Result<Option<TimeEntry>> {
        let (user_id, project_id, company_id) = (
            user_id.to_string(),
            project_id.to_string(),
            company_id.to_string(),
        );
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM time_entries
                 WHERE user_id = ?1 AND project_id = ?2 AND company_id = ?3 AND date = ?4
                 ORDER BY is_checked_out ASC, check_in DESC
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query(params![
                user_id,
                project_id,
                company_id,
                date.to_string()
            ])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_entry(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// A running entry the user holds on any *other* project that day.
    /// Feeds the one-active-timer-per-user rule.
    pub async fn find_running_conflict(
        &self,
        user_id: &str,
        company_id: &str,
        date: NaiveDate,
        exclude_project_id: &str,
    ) -> Result<Option<TimeEntry>> {
        let (user_id, company_id, exclude_project_id) = (
            user_id.to_string(),
            company_id.to_string(),
            exclude_project_id.to_string(),
        );
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM time_entries
                 WHERE user_id = ?1 AND company_id = ?2 AND date = ?3
                   AND project_id != ?4 AND is_running = 1 AND is_checked_out = 0
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query(params![
                user_id,
                company_id,
                date.to_string(),
                exclude_project_id
            ])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_entry(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Conditional pause: succeeds only if the entry is still running.
    /// Returns false when a concurrent writer got there first.
    pub async fn pause_entry(
        &self,
        entry_id: &str,
        effective_secs: i64,
        paused_at: DateTime<Utc>,
    ) -> Result<bool> {
        let entry_id = entry_id.to_string();
        self.execute(move |conn| {
            let affected = conn.execute(
                "UPDATE time_entries
                 SET is_running = 0,
                     last_paused = ?1,
                     effective_secs = ?2,
                     updated_at = ?3
                 WHERE id = ?4 AND is_running = 1 AND is_checked_out = 0",
                params![
                    paused_at.to_rfc3339(),
                    effective_secs,
                    paused_at.to_rfc3339(),
                    entry_id,
                ],
            )?;
            Ok(affected == 1)
        })
        .await
    }

    /// Conditional resume: succeeds only if the entry is still paused.
    pub async fn resume_entry(
        &self,
        entry_id: &str,
        paused_secs: i64,
        resumed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let entry_id = entry_id.to_string();
        self.execute(move |conn| {
            let affected = conn.execute(
                "UPDATE time_entries
                 SET is_running = 1,
                     last_paused = NULL,
                     paused_secs = ?1,
                     updated_at = ?2
                 WHERE id = ?3 AND is_running = 0 AND is_checked_out = 0",
                params![paused_secs, resumed_at.to_rfc3339(), entry_id],
            )?;
            Ok(affected == 1)
        })
        .await
    }

    /// Terminal transition. The `is_running = 1` guard also closes the race
    /// with a concurrent pause landing after the service's own state check.
    pub async fn seal_entry(
        &self,
        entry_id: &str,
        total_secs: i64,
        checked_out_at: DateTime<Utc>,
    ) -> Result<bool> {
        let entry_id = entry_id.to_string();
        self.execute(move |conn| {
            let affected = conn.execute(
                "UPDATE time_entries
                 SET is_checked_out = 1,
                     is_running = 0,
                     total_secs = ?1,
                     effective_secs = ?1,
                     check_out = ?2,
                     updated_at = ?2
                 WHERE id = ?3 AND is_checked_out = 0 AND is_running = 1",
                params![total_secs, checked_out_at.to_rfc3339(), entry_id],
            )?;
            Ok(affected == 1)
        })
        .await
    }

    /// All of one user's entries for (project, day), newest check-in first.
    pub async fn entries_for_user_day(
        &self,
        user_id: &str,
        project_id: &str,
        company_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<TimeEntry>> {
        let (user_id, project_id, company_id) = (
            user_id.to_string(),
            project_id.to_string(),
            company_id.to_string(),
        );
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM time_entries
                 WHERE user_id = ?1 AND project_id = ?2 AND company_id = ?3 AND date = ?4
                 ORDER BY check_in DESC"
            ))?;

            let mut rows = stmt.query(params![
                user_id,
                project_id,
                company_id,
                date.to_string()
            ])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn user_aggregates(
        &self,
        project_id: &str,
        company_id: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<UserAggregateRow>> {
        let (project_id, company_id) = (project_id.to_string(), company_id.to_string());
        self.execute(move |conn| {
            let base = "SELECT user_id, SUM(total_secs) AS total_secs, COUNT(*) AS sessions, \
                 CAST(ROUND(AVG(total_secs)) AS INTEGER) AS avg_secs, MAX(check_out) AS last_activity
                 FROM time_entries
                 WHERE project_id = ?1 AND company_id = ?2 AND is_checked_out = 1";
            let grouped = " GROUP BY user_id ORDER BY total_secs DESC";

            let mut aggregates = Vec::new();
            let mut push_row = |row: &Row| -> Result<()> {
                let last_activity: Option<String> = row.get("last_activity")?;
                aggregates.push(UserAggregateRow {
                    user_id: row.get("user_id")?,
                    total_secs: row.get::<_, Option<i64>>("total_secs")?.unwrap_or(0),
                    total_sessions: row.get("sessions")?,
                    avg_session_secs: row.get::<_, Option<i64>>("avg_secs")?.unwrap_or(0),
                    last_activity: parse_optional_datetime(last_activity, "last_activity")?,
                });
                Ok(())
            };

            match range {
                Some((start, end)) => {
                    let sql = format!("{base} AND date >= ?3 AND date <= ?4{grouped}");
                    let mut stmt = conn.prepare(&sql)?;
                    let mut rows = stmt.query(params![
                        project_id,
                        company_id,
                        start.to_string(),
                        end.to_string()
                    ])?;
                    while let Some(row) = rows.next()? {
                        push_row(row)?;
                    }
                }
                None => {
                    let sql = format!("{base}{grouped}");
                    let mut stmt = conn.prepare(&sql)?;
                    let mut rows = stmt.query(params![project_id, company_id])?;
                    while let Some(row) = rows.next()? {
                        push_row(row)?;
                    }
                }
            }

            Ok(aggregates)
        })
        .await
    }

    /// Entries currently counting up for a company, across all users.
    pub async fn running_entries(&self, company_id: &str) -> Result<Vec<TimeEntry>> {
        let company_id = company_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM time_entries
                 WHERE company_id = ?1 AND is_running = 1 AND is_checked_out = 0
                 ORDER BY check_in DESC"
            ))?;

            let mut rows = stmt.query(params![company_id])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn project_stats(
        &self,
        company_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProjectStatRow>> {
        let company_id = company_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT project_id, SUM(total_secs) AS total_secs, COUNT(*) AS sessions, \
                 COUNT(DISTINCT user_id) AS unique_users, \
                 CAST(ROUND(AVG(total_secs)) AS INTEGER) AS avg_secs
                 FROM time_entries
                 WHERE company_id = ?1 AND is_checked_out = 1 AND date >= ?2 AND date <= ?3
                 GROUP BY project_id
                 ORDER BY total_secs DESC",
            )?;

            let mut rows = stmt.query(params![
                company_id,
                start.to_string(),
                end.to_string()
            ])?;
            let mut stats = Vec::new();
            while let Some(row) = rows.next()? {
                stats.push(ProjectStatRow {
                    project_id: row.get("project_id")?,
                    total_secs: row.get::<_, Option<i64>>("total_secs")?.unwrap_or(0),
                    total_sessions: row.get("sessions")?,
                    unique_users: row.get("unique_users")?,
                    avg_session_secs: row.get::<_, Option<i64>>("avg_secs")?.unwrap_or(0),
                });
            }
            Ok(stats)
        })
        .await
    }

    /// Every entry a company logged on one calendar day, any state.
    pub async fn entries_for_company_day(
        &self,
        company_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<TimeEntry>> {
        let company_id = company_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM time_entries
                 WHERE company_id = ?1 AND date = ?2
                 ORDER BY check_in DESC"
            ))?;

            let mut rows = stmt.query(params![company_id, date.to_string()])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }
}
