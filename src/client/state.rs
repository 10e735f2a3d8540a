use serde::{Deserialize, Serialize};

use crate::models::{CheckOutSummary, ElapsedSnapshot, PauseResumeOutcome};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    CheckedOut,
}

impl Default for TimerPhase {
    fn default() -> Self {
        TimerPhase::Idle
    }
}

/// Predictive clock for one tracked project. Best-effort visual state, never
/// a source of truth: every transition either comes from an optimistic
/// mutation (rolled back on failure) or a server snapshot (reconciliation).
///
/// All transitions take an explicit `now_ms` so the math is deterministic
/// under test and so loop code decides exactly once what "now" is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTimerState {
    pub phase: TimerPhase,
    pub elapsed_secs: i64,
    pub paused_secs: i64,
    /// Wall-clock anchor the tick loop extrapolates from while running.
    pub local_start_ms: Option<i64>,
    pub last_pause_ms: Option<i64>,
    /// Signed correction applied on top of the local extrapolation; reset
    /// whenever the anchor is rebased from authoritative data.
    pub drift_secs: i64,
    pub last_synced_ms: Option<i64>,
    pub last_sync_failed: bool,
}

impl Default for ClientTimerState {
    fn default() -> Self {
        Self {
            phase: TimerPhase::Idle,
            elapsed_secs: 0,
            paused_secs: 0,
            local_start_ms: None,
            last_pause_ms: None,
            drift_secs: 0,
            last_synced_ms: None,
            last_sync_failed: false,
        }
    }
}

impl ClientTimerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// One second-cadence update of the visible elapsed value.
    pub fn tick(&mut self, now_ms: i64) {
        if self.phase != TimerPhase::Running {
            return;
        }
        if let Some(start_ms) = self.local_start_ms {
            let raw = (now_ms - start_ms).div_euclid(1000);
            self.elapsed_secs = (raw + self.drift_secs).max(0);
        }
    }

    /// Replace the derived timing fields with values from a server snapshot.
    /// Idempotent; never merges, so repeated application cannot compound
    /// drift.
    pub fn reconcile(&mut self, snapshot: &ElapsedSnapshot, now_ms: i64) {
        if snapshot.is_checked_out {
            self.phase = TimerPhase::CheckedOut;
            self.elapsed_secs = snapshot
                .total_duration
                .unwrap_or(snapshot.elapsed_time)
                .max(0);
            self.paused_secs = snapshot.paused_duration.max(0);
            self.local_start_ms = None;
            self.last_pause_ms = None;
            self.drift_secs = 0;
        } else if snapshot.check_in_time.is_none() {
            let synced = self.last_synced_ms;
            *self = Self::default();
            self.last_synced_ms = synced;
        } else if snapshot.is_running {
            let server_elapsed = snapshot.elapsed_time.max(0);
            match self.local_start_ms {
                Some(start_ms) => {
                    // Keep the anchor, absorb the deviation into the
                    // correction term; at this instant the clocks agree
                    // exactly.
                    let raw = (now_ms - start_ms).div_euclid(1000);
                    self.drift_secs = server_elapsed - raw;
                }
                None => {
                    self.local_start_ms = Some(now_ms - server_elapsed * 1000);
                    self.drift_secs = 0;
                }
            }
            self.phase = TimerPhase::Running;
            self.elapsed_secs = server_elapsed;
            self.paused_secs = snapshot.paused_duration.max(0);
            self.last_pause_ms = None;
        } else {
            self.phase = TimerPhase::Paused;
            self.elapsed_secs = snapshot.elapsed_time.max(0);
            self.paused_secs = snapshot.paused_duration.max(0);
            self.last_pause_ms = Some(
                snapshot
                    .last_paused
                    .map(|dt| dt.timestamp_millis())
                    .unwrap_or(now_ms),
            );
            self.local_start_ms = None;
            self.drift_secs = 0;
        }

        self.last_synced_ms = Some(now_ms);
        self.last_sync_failed = false;
    }

    /// Authoritative pause/resume response, applied without waiting for the
    /// next poll.
    pub fn apply_pause_resume(&mut self, outcome: &PauseResumeOutcome, now_ms: i64) {
        if outcome.is_running {
            self.phase = TimerPhase::Running;
            self.local_start_ms = Some(now_ms - outcome.elapsed_time.max(0) * 1000);
            self.last_pause_ms = None;
        } else {
            self.phase = TimerPhase::Paused;
            self.local_start_ms = None;
            self.last_pause_ms = Some(now_ms);
        }
        self.elapsed_secs = outcome.elapsed_time.max(0);
        self.paused_secs = outcome.paused_duration.max(0);
        self.drift_secs = 0;
        self.last_synced_ms = Some(now_ms);
        self.last_sync_failed = false;
    }

    pub fn apply_check_out(&mut self, summary: &CheckOutSummary, now_ms: i64) {
        self.phase = TimerPhase::CheckedOut;
        self.elapsed_secs = summary.total_duration.max(0);
        self.local_start_ms = None;
        self.last_pause_ms = None;
        self.drift_secs = 0;
        self.last_synced_ms = Some(now_ms);
        self.last_sync_failed = false;
    }

    pub fn note_sync_failure(&mut self) {
        self.last_sync_failed = true;
    }

    /// Local transition applied before the check-in round-trip completes.
    pub fn optimistic_check_in(&mut self, now_ms: i64) {
        self.phase = TimerPhase::Running;
        self.elapsed_secs = 0;
        self.paused_secs = 0;
        self.local_start_ms = Some(now_ms);
        self.last_pause_ms = None;
        self.drift_secs = 0;
    }

    /// Local pause/resume toggle, applied before the round-trip completes.
    /// Only meaningful while Running or Paused; other phases are left for
    /// the server to judge.
    pub fn optimistic_toggle(&mut self, now_ms: i64) {
        match self.phase {
            TimerPhase::Running => {
                if let Some(start_ms) = self.local_start_ms {
                    let raw = (now_ms - start_ms).div_euclid(1000);
                    self.elapsed_secs = (raw + self.drift_secs).max(0);
                }
                self.phase = TimerPhase::Paused;
                self.last_pause_ms = Some(now_ms);
                self.local_start_ms = None;
            }
            TimerPhase::Paused => {
                if let Some(pause_ms) = self.last_pause_ms {
                    self.paused_secs += (now_ms - pause_ms).div_euclid(1000).max(0);
                }
                self.phase = TimerPhase::Running;
                self.local_start_ms = Some(now_ms - self.elapsed_secs * 1000);
                self.last_pause_ms = None;
                self.drift_secs = 0;
            }
            TimerPhase::Idle | TimerPhase::CheckedOut => {}
        }
    }

    /// Local terminal transition, applied before the round-trip completes.
    pub fn optimistic_check_out(&mut self, now_ms: i64) {
        if self.phase == TimerPhase::Running {
            if let Some(start_ms) = self.local_start_ms {
                let raw = (now_ms - start_ms).div_euclid(1000);
                self.elapsed_secs = (raw + self.drift_secs).max(0);
            }
        }
        self.phase = TimerPhase::CheckedOut;
        self.local_start_ms = None;
        self.last_pause_ms = None;
        self.drift_secs = 0;
    }
}
