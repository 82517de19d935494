// indygo-core: Polling coordinator between indygo-api and consumers.

pub mod config;
pub mod coordinator;
pub mod error;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{CoordinatorConfig, PoolCredentials};
pub use coordinator::{
    CoordinatorStatus, ListenerId, PoolCoordinator, RefreshOutcome, RefreshState,
};
pub use error::CoreError;

// Re-export the data model at the crate root for ergonomics.
pub use indygo_api::{
    FiltrationMode, ModuleData, ModuleKind, ParseWarning, PoolData, SensorCategory, SensorData,
    SensorValue, ValueKind, WarningScope,
};
