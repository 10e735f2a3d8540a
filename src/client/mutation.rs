//! Optimistic mutations: the local clock transitions before the server
//! confirms, and the exact pre-mutation state is restored if it doesn't.

use log::info;

use crate::{
    error::TrackerResult,
    models::{CheckOutSummary, ElapsedSnapshot, PauseResumeOutcome, TimeEntry},
};

use super::{
    api::TrackerApi,
    engine::{now_ms, TimerEngine},
};

impl<A: TrackerApi> TimerEngine<A> {
    /// Start a session: the clock begins counting immediately, and the
    /// server's entry is reconciled in when the call lands.
    pub async fn check_in(&self, sub_task_id: Option<String>) -> TrackerResult<TimeEntry> {
        let previous = {
            let mut guard = self.state.lock().await;
            let previous = guard.clone();
            guard.optimistic_check_in(now_ms());
            previous
        };

        match self.api.check_in(&self.project_id, sub_task_id).await {
            Ok(entry) => {
                let snapshot = ElapsedSnapshot {
                    is_running: entry.is_running,
                    is_checked_out: entry.is_checked_out,
                    elapsed_time: 0,
                    paused_duration: entry.paused_secs,
                    check_in_time: Some(entry.check_in),
                    last_paused: entry.last_paused,
                    total_duration: entry.total_secs,
                };
                self.state.lock().await.reconcile(&snapshot, now_ms());
                info!("checked in to project {}", self.project_id);
                Ok(entry)
            }
            Err(err) => {
                *self.state.lock().await = previous;
                Err(err)
            }
        }
    }

    /// Toggle pause/resume. The visible clock freezes or resumes at once;
    /// the server response then replaces the predicted values.
    pub async fn pause_or_resume(&self) -> TrackerResult<PauseResumeOutcome> {
        let previous = {
            let mut guard = self.state.lock().await;
            let previous = guard.clone();
            guard.optimistic_toggle(now_ms());
            previous
        };

        match self.api.pause_or_resume(&self.project_id).await {
            Ok(outcome) => {
                self.state
                    .lock()
                    .await
                    .apply_pause_resume(&outcome, now_ms());
                Ok(outcome)
            }
            Err(err) => {
                *self.state.lock().await = previous;
                Err(err)
            }
        }
    }

    /// Seal the session. The clock freezes at the locally predicted total
    /// and adopts the server's authoritative one on success.
    pub async fn check_out(&self) -> TrackerResult<CheckOutSummary> {
        let previous = {
            let mut guard = self.state.lock().await;
            let previous = guard.clone();
            guard.optimistic_check_out(now_ms());
            previous
        };

        match self.api.check_out(&self.project_id).await {
            Ok(summary) => {
                self.state.lock().await.apply_check_out(&summary, now_ms());
                info!(
                    "checked out of project {} at {}s",
                    self.project_id, summary.total_duration
                );
                Ok(summary)
            }
            Err(err) => {
                *self.state.lock().await = previous;
                Err(err)
            }
        }
    }
}
