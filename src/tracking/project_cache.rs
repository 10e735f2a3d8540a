use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{TrackerError, TrackerResult};

/// What the project registry knows about a project a company owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub project_id: String,
    pub title: String,
}

/// External project store. The engine only ever asks one question: does this
/// project exist under this company?
pub trait ProjectRegistry: Send + Sync + 'static {
    fn find_project(&self, project_id: &str, company_id: &str)
        -> anyhow::Result<Option<ProjectRef>>;
}

/// In-memory registry, used by the binary's bootstrap and by tests.
#[derive(Default)]
pub struct StaticProjectRegistry {
    projects: Mutex<HashMap<(String, String), ProjectRef>>,
}

impl StaticProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, project_id: &str, company_id: &str, title: &str) {
        let mut guard = self.projects.lock().expect("project registry poisoned");
        guard.insert(
            (project_id.to_string(), company_id.to_string()),
            ProjectRef {
                project_id: project_id.to_string(),
                title: title.to_string(),
            },
        );
    }
}

impl ProjectRegistry for StaticProjectRegistry {
    fn find_project(
        &self,
        project_id: &str,
        company_id: &str,
    ) -> anyhow::Result<Option<ProjectRef>> {
        let guard = self.projects.lock().expect("project registry poisoned");
        Ok(guard
            .get(&(project_id.to_string(), company_id.to_string()))
            .cloned())
    }
}

struct CachedProject {
    project: ProjectRef,
    cached_at: Instant,
}

/// TTL memoization of positive (project, company) validations. Stale reads
/// are acceptable; negative lookups are never cached so a newly-added
/// project is visible on the next request.
pub struct ProjectCompanyCache {
    registry: Arc<dyn ProjectRegistry>,
    entries: Mutex<HashMap<(String, String), CachedProject>>,
    ttl: Duration,
}

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

impl ProjectCompanyCache {
    pub fn new(registry: Arc<dyn ProjectRegistry>, ttl: Duration) -> Self {
        Self {
            registry,
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn validate(&self, project_id: &str, company_id: &str) -> TrackerResult<ProjectRef> {
        let key = (project_id.to_string(), company_id.to_string());

        {
            let guard = self.entries.lock().expect("project cache poisoned");
            if let Some(cached) = guard.get(&key) {
                if cached.cached_at.elapsed() < self.ttl {
                    return Ok(cached.project.clone());
                }
            }
        }

        let project = self
            .registry
            .find_project(project_id, company_id)
            .map_err(TrackerError::Internal)?
            .ok_or_else(|| {
                TrackerError::Authorization("Project not found or access denied".to_string())
            })?;

        let mut guard = self.entries.lock().expect("project cache poisoned");
        guard.insert(
            key,
            CachedProject {
                project: project.clone(),
                cached_at: Instant::now(),
            },
        );

        Ok(project)
    }

    pub fn sweep(&self) -> usize {
        let mut guard = self.entries.lock().expect("project cache poisoned");
        let before = guard.len();
        guard.retain(|_, cached| cached.cached_at.elapsed() < self.ttl);
        before - guard.len()
    }

    /// Background eviction, one pass per TTL window. Runs until the token is
    /// cancelled.
    pub fn spawn_sweeper(self: Arc<Self>, cancel_token: CancellationToken) -> JoinHandle<()> {
        let cache = self;
        let sweep_every = cache.ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = cache.sweep();
                        if evicted > 0 {
                            debug!("project cache sweep evicted {evicted} entries");
                        }
                    }
                    _ = cancel_token.cancelled() => {
                        info!("project cache sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().expect("project cache poisoned").len()
    }
}
