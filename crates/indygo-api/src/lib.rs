// indygo-api: Async Rust client for the MyIndygo pool controller portal.

pub mod client;
mod commands;
pub mod error;
pub mod model;
pub mod parser;
mod session;
pub mod transport;

pub use client::{IndygoClient, PORTAL_BASE_URL};
pub use error::Error;
pub use model::{
    FiltrationMode, ModuleData, ModuleKind, ParseWarning, PoolData, SensorCategory, SensorData,
    SensorValue, ValueKind, WarningScope,
};
pub use transport::TransportConfig;
