// Payload parsing: raw discovery HTML + status JSON into `PoolData`.
//
// Pure and stateless -- no network access, no caller-state mutation.
// This is the single validated conversion at the boundary; nothing
// downstream of it touches raw payload shapes again.
//
// Split by structural concern: `discovery` recovers the pool's structure
// from the embedded JavaScript objects on the devices page, `status`
// maps the live JSON values onto that structure.

mod discovery;
mod status;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Error;
use crate::model::{PoolData, SensorData};

/// Parse one discovery + status payload pair into a [`PoolData`].
///
/// `fetched_at` is injected by the caller so parsing stays deterministic:
/// the same payload pair always yields a structurally equal result.
pub fn parse_pool_data(
    pool_id: &str,
    discovery_html: &str,
    status_body: &str,
    fetched_at: DateTime<Utc>,
) -> Result<PoolData, Error> {
    if pool_id.is_empty() {
        return Err(Error::parse("pool", "pool id is empty"));
    }

    let discovery = discovery::parse_discovery(discovery_html)?;

    let status: Value = serde_json::from_str(status_body)
        .map_err(|e| Error::parse("status payload", e.to_string()))?;

    status::build_pool_data(pool_id, discovery, &status, fetched_at)
}

// ── Shared value coercion ────────────────────────────────────────────

/// Coerce a JSON value to a number, locale-aware.
///
/// The portal serves numbers both as JSON numbers and as strings, and
/// string values may use `,` as the decimal separator.
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

/// Coerce a JSON value to a bool from the portal's truthy tokens.
///
/// Accepts JSON booleans, 0/1 numbers, and the string tokens
/// `"0"`/`"1"`/`"true"`/`"false"`/`"on"`/`"off"`/`"yes"`/`"no"`
/// (case-insensitive). Anything else is unrecognised.
pub(crate) fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Insert a sensor into a scope map, failing deterministically on a key
/// collision instead of silently dropping either reading.
pub(crate) fn insert_sensor(
    map: &mut std::collections::HashMap<String, SensorData>,
    sensor: SensorData,
    scope: &str,
) -> Result<(), Error> {
    let key = sensor.key.clone();
    if map.insert(key.clone(), sensor).is_some() {
        return Err(Error::parse(
            scope,
            format!("duplicate sensor key `{key}`"),
        ));
    }
    Ok(())
}
