use std::future::Future;

use crate::{
    error::TrackerResult,
    models::{CheckOutSummary, ElapsedSnapshot, PauseResumeOutcome, TimeEntry},
};

/// Transport to the tracking server. The embedding application supplies the
/// actual wire (HTTP, IPC, in-process); the engine only sees the typed
/// operations and the error taxonomy.
pub trait TrackerApi: Send + Sync + 'static {
    fn check_in(
        &self,
        project_id: &str,
        sub_task_id: Option<String>,
    ) -> impl Future<Output = TrackerResult<TimeEntry>> + Send;

    fn get_elapsed_time(
        &self,
        project_id: &str,
    ) -> impl Future<Output = TrackerResult<ElapsedSnapshot>> + Send;

    fn pause_or_resume(
        &self,
        project_id: &str,
    ) -> impl Future<Output = TrackerResult<PauseResumeOutcome>> + Send;

    fn check_out(
        &self,
        project_id: &str,
    ) -> impl Future<Output = TrackerResult<CheckOutSummary>> + Send;
}
