pub mod project_cache;
pub mod service;

pub use project_cache::{
    ProjectCompanyCache, ProjectRef, ProjectRegistry, StaticProjectRegistry, DEFAULT_CACHE_TTL,
};
pub use service::{Principal, TimeTrackingService};
