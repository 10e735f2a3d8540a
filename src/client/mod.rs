pub mod api;
pub mod engine;
mod mutation;
pub mod state;
pub mod sync;

pub use api::TrackerApi;
pub use engine::{TimerEngine, TimerRegistry};
pub use state::{ClientTimerState, TimerPhase};
pub use sync::{connection_status, ConnectionStatus, RetryPolicy, SyncConfig};
