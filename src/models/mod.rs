pub mod entry;
pub mod report;

pub use entry::{
    format_hms, CheckOutSummary, ElapsedSnapshot, PauseResumeOutcome, TimeEntry,
};
pub use report::{CompanyDashboard, DateRange, ProjectStat, UserTimeAggregate, UserTimeReport};
