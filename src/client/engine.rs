use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use log::{info, warn};
use tokio::{sync::Mutex, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::error::{TrackerError, TrackerResult};

use super::{
    api::TrackerApi,
    state::{ClientTimerState, TimerPhase},
    sync::{connection_status, ConnectionStatus, RetryPolicy, SyncConfig},
};

pub(super) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Predictive clock controller for one tracked project: a 1 s tick loop plus
/// the sync loops, all sharing one `ClientTimerState` behind one mutex and
/// all torn down through one cancellation token.
pub struct TimerEngine<A: TrackerApi> {
    pub(super) project_id: String,
    pub(super) api: Arc<A>,
    pub(super) config: SyncConfig,
    pub(super) state: Arc<Mutex<ClientTimerState>>,
    cancel_token: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: TrackerApi> TimerEngine<A> {
    pub fn new(project_id: String, api: Arc<A>, config: SyncConfig) -> Self {
        Self {
            project_id,
            api,
            config,
            state: Arc::new(Mutex::new(ClientTimerState::new())),
            cancel_token: CancellationToken::new(),
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the tick loop and the sync loops, plus one immediate sync so a
    /// fresh engine attaches to whatever session the server already holds.
    pub async fn start(&self) {
        let mut loops = self.loops.lock().await;
        if !loops.is_empty() {
            return;
        }

        loops.push(self.spawn_tick_loop());
        loops.push(self.spawn_sync_loop(self.config.fast_poll_interval, "fast poll"));
        loops.push(self.spawn_sync_loop(self.config.hard_resync_interval, "hard resync"));

        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        let project_id = self.project_id.clone();
        let retry = self.config.retry.clone();
        let cancel = self.cancel_token.clone();
        loops.push(tokio::spawn(async move {
            if let Err(err) =
                sync_with_retry(api.as_ref(), &project_id, &state, &retry, &cancel).await
            {
                warn!("initial sync for project {project_id} failed: {err}");
            }
        }));
    }

    fn spawn_tick_loop(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let cancel = self.cancel_token.clone();
        let tick_interval = self.config.tick_interval;

        tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        state.lock().await.tick(now_ms());
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    /// A poll loop that only talks to the server while the clock is running.
    fn spawn_sync_loop(&self, every: std::time::Duration, label: &'static str) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        let project_id = self.project_id.clone();
        let retry = self.config.retry.clone();
        let cancel = self.cancel_token.clone();

        tokio::spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            // The first interval tick fires immediately; the dedicated
            // initial sync already covers attach, so skip it here.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let running = state.lock().await.phase == TimerPhase::Running;
                        if !running {
                            continue;
                        }
                        if let Err(err) =
                            sync_with_retry(api.as_ref(), &project_id, &state, &retry, &cancel).await
                        {
                            warn!("{label} for project {project_id} failed: {err}");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    /// Manual resync; cancels no loop, retries like any other sync.
    pub async fn resync(&self) -> TrackerResult<()> {
        sync_with_retry(
            self.api.as_ref(),
            &self.project_id,
            &self.state,
            &self.config.retry,
            &self.cancel_token,
        )
        .await
    }

    /// Current predictive state, refreshed to this instant.
    pub async fn snapshot(&self) -> ClientTimerState {
        let mut guard = self.state.lock().await;
        guard.tick(now_ms());
        guard.clone()
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        let guard = self.state.lock().await;
        connection_status(&guard, now_ms(), self.config.stale_after)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Deterministic teardown: cancel every loop and wait for each to exit.
    /// A dangling tick after this returns would be a defect.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let mut loops = self.loops.lock().await;
        for handle in loops.drain(..) {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!("timer loop for {} ended abnormally: {err}", self.project_id);
                }
            }
        }
    }
}

async fn sync_with_retry<A: TrackerApi>(
    api: &A,
    project_id: &str,
    state: &Mutex<ClientTimerState>,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> TrackerResult<()> {
    let mut attempt: u32 = 0;
    loop {
        match api.get_elapsed_time(project_id).await {
            Ok(snapshot) => {
                state.lock().await.reconcile(&snapshot, now_ms());
                return Ok(());
            }
            Err(TrackerError::Network(reason)) => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    state.lock().await.note_sync_failure();
                    warn!(
                        "sync for project {project_id} gave up after {attempt} attempts: {reason}"
                    );
                    return Err(TrackerError::Network(reason));
                }
                let delay = retry.jittered_backoff(attempt - 1);
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(TrackerError::Network(reason));
                    }
                }
            }
            Err(err) => {
                state.lock().await.note_sync_failure();
                return Err(err);
            }
        }
    }
}

/// Session-scoped home for per-project engines. Looking up an engine that
/// already exists hands back the same clock, so a UI remount never resets
/// it; engines die only on explicit release or registry shutdown.
pub struct TimerRegistry<A: TrackerApi> {
    api: Arc<A>,
    config: SyncConfig,
    engines: Mutex<HashMap<String, Arc<TimerEngine<A>>>>,
}

impl<A: TrackerApi> TimerRegistry<A> {
    pub fn new(api: Arc<A>, config: SyncConfig) -> Self {
        Self {
            api,
            config,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub async fn track(&self, project_id: &str) -> Arc<TimerEngine<A>> {
        let mut engines = self.engines.lock().await;
        if let Some(engine) = engines.get(project_id) {
            return Arc::clone(engine);
        }

        let engine = Arc::new(TimerEngine::new(
            project_id.to_string(),
            Arc::clone(&self.api),
            self.config.clone(),
        ));
        engine.start().await;
        info!("tracking project {project_id}");
        engines.insert(project_id.to_string(), Arc::clone(&engine));
        engine
    }

    /// Drop one project's clock, tearing its loops down before returning.
    pub async fn release(&self, project_id: &str) {
        let engine = self.engines.lock().await.remove(project_id);
        if let Some(engine) = engine {
            engine.shutdown().await;
            info!("released project {project_id}");
        }
    }

    pub async fn shutdown_all(&self) {
        let engines: Vec<_> = self.engines.lock().await.drain().collect();
        for (_, engine) in engines {
            engine.shutdown().await;
        }
    }
}
