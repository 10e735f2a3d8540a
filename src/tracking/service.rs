use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use log::info;
use uuid::Uuid;

use crate::{
    db::Database,
    error::{TrackerError, TrackerResult},
    models::{
        format_hms, CheckOutSummary, CompanyDashboard, DateRange, ElapsedSnapshot,
        PauseResumeOutcome, ProjectStat, TimeEntry, UserTimeAggregate, UserTimeReport,
    },
};

use super::project_cache::ProjectCompanyCache;

/// Authenticated caller, resolved by the external identity provider before a
/// request reaches the service.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub company_id: String,
}

const MAX_ID_LEN: usize = 64;

fn validate_project_id(project_id: &str) -> TrackerResult<()> {
    let well_formed = !project_id.is_empty()
        && project_id.len() <= MAX_ID_LEN
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(TrackerError::Validation("Invalid Project ID".to_string()))
    }
}

fn validate_principal(principal: &Principal) -> TrackerResult<()> {
    if principal.user_id.is_empty() {
        return Err(TrackerError::Validation(
            "User ID is required for time tracking.".to_string(),
        ));
    }
    if principal.company_id.is_empty() {
        return Err(TrackerError::Validation(
            "Company ID is required for time tracking.".to_string(),
        ));
    }
    Ok(())
}

fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(failure, _))
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Authoritative timer state machine. All duration math uses the server
/// clock; client-submitted timestamps are never trusted.
#[derive(Clone)]
pub struct TimeTrackingService {
    db: Database,
    cache: Arc<ProjectCompanyCache>,
}

impl TimeTrackingService {
    pub fn new(db: Database, cache: Arc<ProjectCompanyCache>) -> Self {
        Self { db, cache }
    }

    pub async fn check_in(
        &self,
        principal: &Principal,
        project_id: &str,
        sub_task_id: Option<String>,
    ) -> TrackerResult<TimeEntry> {
        validate_principal(principal)?;
        validate_project_id(project_id)?;
        self.cache.validate(project_id, &principal.company_id)?;

        let now = Utc::now();
        let today = now.date_naive();

        if self
            .db
            .find_open_entry(&principal.user_id, project_id, &principal.company_id, today)
            .await?
            .is_some()
        {
            return Err(TrackerError::Conflict(
                "You have already checked in for this project today.".to_string(),
            ));
        }

        if self
            .db
            .find_running_conflict(&principal.user_id, &principal.company_id, today, project_id)
            .await?
            .is_some()
        {
            return Err(TrackerError::Conflict(
                "You have an active timer running for another project. Please check out first."
                    .to_string(),
            ));
        }

        let entry = TimeEntry {
            id: Uuid::new_v4().to_string(),
            user_id: principal.user_id.clone(),
            project_id: project_id.to_string(),
            company_id: principal.company_id.clone(),
            sub_task_id,
            date: today,
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
        };

        // Two devices can both pass the reads above; the store's unique
        // partial indexes break the tie and the loser surfaces a conflict.
        if let Err(err) = self.db.insert_entry(&entry).await {
            if is_constraint_violation(&err) {
                return Err(TrackerError::Conflict(
                    "You have already checked in for this project today.".to_string(),
                ));
            }
            return Err(TrackerError::Internal(err));
        }

        info!(
            "user {} checked in to project {} ({})",
            entry.user_id, entry.project_id, entry.id
        );

        Ok(entry)
    }

    pub async fn get_elapsed_time(
        &self,
        principal: &Principal,
        project_id: &str,
    ) -> TrackerResult<ElapsedSnapshot> {
        validate_principal(principal)?;
        validate_project_id(project_id)?;

        let now = Utc::now();
        let entry = self
            .db
            .find_latest_entry(&principal.user_id, project_id, &principal.company_id, now.date_naive())
            .await?;

        let Some(entry) = entry else {
            return Ok(ElapsedSnapshot::idle());
        };

        Ok(ElapsedSnapshot {
            is_running: entry.is_running,
            is_checked_out: entry.is_checked_out,
            elapsed_time: entry.elapsed_at(now),
            paused_duration: entry.paused_secs,
            check_in_time: Some(entry.check_in),
            last_paused: entry.last_paused,
            total_duration: entry.total_secs,
        })
    }

    pub async fn pause_or_resume(
        &self,
        principal: &Principal,
        project_id: &str,
    ) -> TrackerResult<PauseResumeOutcome> {
        validate_principal(principal)?;
        validate_project_id(project_id)?;

        let now = Utc::now();
        let entry = self.open_entry_or_conflict(principal, project_id).await?;

        if entry.is_running {
            let wall = (now - entry.check_in).num_seconds();
            let effective = (wall - entry.paused_secs).max(0);

            if !self.db.pause_entry(&entry.id, effective, now).await? {
                return Err(cas_conflict());
            }

            info!("paused timer {} at {}s", entry.id, effective);
            Ok(PauseResumeOutcome {
                is_running: false,
                elapsed_time: effective,
                paused_duration: entry.paused_secs,
            })
        } else {
            let last_paused = entry.last_paused.ok_or_else(|| {
                TrackerError::Conflict("Cannot resume without a paused state.".to_string())
            })?;

            let pause_window = (now - last_paused).num_seconds().max(0);
            let paused_secs = entry.paused_secs + pause_window;

            match self.db.resume_entry(&entry.id, paused_secs, now).await {
                Ok(true) => {}
                Ok(false) => return Err(cas_conflict()),
                Err(err) if is_constraint_violation(&err) => {
                    // Resuming here would give the user a second running
                    // timer; the one-running-per-user index rejects it.
                    return Err(TrackerError::Conflict(
                        "You have an active timer running for another project. Please check out first."
                            .to_string(),
                    ));
                }
                Err(err) => return Err(TrackerError::Internal(err)),
            }

            let wall = (now - entry.check_in).num_seconds();
            let elapsed = (wall - paused_secs).max(0);

            info!("resumed timer {} ({}s paused total)", entry.id, paused_secs);
            Ok(PauseResumeOutcome {
                is_running: true,
                elapsed_time: elapsed,
                paused_duration: paused_secs,
            })
        }
    }

    pub async fn check_out(
        &self,
        principal: &Principal,
        project_id: &str,
    ) -> TrackerResult<CheckOutSummary> {
        validate_principal(principal)?;
        validate_project_id(project_id)?;

        let now = Utc::now();
        let entry = self.open_entry_or_conflict(principal, project_id).await?;

        if !entry.is_running && entry.last_paused.is_some() {
            return Err(TrackerError::Conflict(
                "Cannot check out while paused. Resume the timer before checking out.".to_string(),
            ));
        }

        let wall = (now - entry.check_in).num_seconds();
        let total = (wall - entry.paused_secs).max(0);

        if !self.db.seal_entry(&entry.id, total, now).await? {
            return Err(cas_conflict());
        }

        info!(
            "user {} checked out of project {} with {}s",
            entry.user_id, entry.project_id, total
        );

        Ok(CheckOutSummary {
            total_duration: total,
            formatted_time: format_hms(total),
            check_out_time: now,
        })
    }

    pub async fn user_time_project(
        &self,
        principal: &Principal,
        project_id: &str,
        date: Option<NaiveDate>,
    ) -> TrackerResult<UserTimeReport> {
        validate_principal(principal)?;
        validate_project_id(project_id)?;

        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let entries = self
            .db
            .entries_for_user_day(&principal.user_id, project_id, &principal.company_id, date)
            .await?;

        let total_time = entries
            .iter()
            .map(|e| e.total_secs.unwrap_or(e.effective_secs).max(0))
            .sum();

        Ok(UserTimeReport {
            project_id: project_id.to_string(),
            date,
            total_time,
            formatted_total_time: format_hms(total_time),
            entries,
        })
    }

    pub async fn users_time_project(
        &self,
        principal: &Principal,
        project_id: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> TrackerResult<Vec<UserTimeAggregate>> {
        validate_principal(principal)?;
        validate_project_id(project_id)?;
        self.cache.validate(project_id, &principal.company_id)?;

        let rows = self
            .db
            .user_aggregates(project_id, &principal.company_id, range)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| UserTimeAggregate {
                formatted_total_time: format_hms(row.total_secs),
                user_id: row.user_id,
                total_duration: row.total_secs,
                total_sessions: row.total_sessions,
                avg_session_time: row.avg_session_secs,
                last_activity: row.last_activity,
            })
            .collect())
    }

    pub async fn company_dashboard(
        &self,
        principal: &Principal,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> TrackerResult<CompanyDashboard> {
        validate_principal(principal)?;

        let today = Utc::now().date_naive();
        let (start, end) = range.unwrap_or((today - Duration::days(7), today));

        let active = self.db.running_entries(&principal.company_id).await?;
        let stats = self
            .db
            .project_stats(&principal.company_id, start, end)
            .await?;
        let today_activity = self
            .db
            .entries_for_company_day(&principal.company_id, today)
            .await?;

        Ok(CompanyDashboard {
            active_timers: active.len(),
            active_timer_details: active,
            project_stats: stats
                .into_iter()
                .map(|row| ProjectStat {
                    project_id: row.project_id,
                    total_time: row.total_secs,
                    total_sessions: row.total_sessions,
                    unique_users_count: row.unique_users,
                    avg_session_time: row.avg_session_secs,
                })
                .collect(),
            today_activity,
            date_range: DateRange { start, end },
        })
    }

    /// The open entry for (user, project, today), distinguishing "never
    /// checked in" from "already checked out".
    async fn open_entry_or_conflict(
        &self,
        principal: &Principal,
        project_id: &str,
    ) -> TrackerResult<TimeEntry> {
        let today = Utc::now().date_naive();
        let entry = self
            .db
            .find_latest_entry(&principal.user_id, project_id, &principal.company_id, today)
            .await?;

        match entry {
            None => Err(TrackerError::NotFound(
                "No active session found for this project today.".to_string(),
            )),
            Some(entry) if entry.is_checked_out => Err(TrackerError::Conflict(
                "You have already checked out for this project.".to_string(),
            )),
            Some(entry) => Ok(entry),
        }
    }
}

fn cas_conflict() -> TrackerError {
    TrackerError::Conflict(
        "Timer state changed by another session. Refresh and try again.".to_string(),
    )
}
