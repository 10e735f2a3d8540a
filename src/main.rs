use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use workclock::{
    db::Database,
    http::{router, AppState},
    tracking::{
        ProjectCompanyCache, ProjectRegistry, StaticProjectRegistry, TimeTrackingService,
        DEFAULT_CACHE_TTL,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let bind = env::var("WORKCLOCK_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse().context("invalid WORKCLOCK_BIND address")?;
    let db_path = env::var("WORKCLOCK_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("workclock.sqlite"));

    let db = Database::new(db_path)?;

    let registry: Arc<dyn ProjectRegistry> = Arc::new(registry_from_env());
    let cache = Arc::new(ProjectCompanyCache::new(registry, DEFAULT_CACHE_TTL));
    let sweeper_token = CancellationToken::new();
    let sweeper = cache.clone().spawn_sweeper(sweeper_token.clone());

    let service = TimeTrackingService::new(db, cache);
    let app = router(AppState { service });

    info!("workclock listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    sweeper_token.cancel();
    let _ = sweeper.await;
    Ok(())
}

/// Until a real project registry is wired in, known projects come from
/// `WORKCLOCK_PROJECTS`, comma-separated `projectId:companyId[:title]`.
fn registry_from_env() -> StaticProjectRegistry {
    let registry = StaticProjectRegistry::new();

    let Ok(raw) = env::var("WORKCLOCK_PROJECTS") else {
        return registry;
    };

    for item in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let mut parts = item.trim().splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(project_id), Some(company_id), title) => {
                registry.register(project_id, company_id, title.unwrap_or(project_id));
            }
            _ => warn!("ignoring malformed WORKCLOCK_PROJECTS entry '{item}'"),
        }
    }

    registry
}
