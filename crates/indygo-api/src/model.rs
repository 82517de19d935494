// Typed data model for one pool.
//
// Everything here is a plain value object: constructed fresh by the parser
// on every successful fetch cycle, immutable afterwards, and shared by the
// coordinator as `Arc<PoolData>`. No network or session state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Sensor values ────────────────────────────────────────────────────

/// A sensor reading, tagged by kind.
///
/// The parser's conversion tables fix the kind per sensor key, so a given
/// key never changes kind across refreshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

/// Kind discriminant for [`SensorValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Number,
    Bool,
    Text,
}

impl SensorValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Bool(_) => ValueKind::Bool,
            Self::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Whether a sensor is a primary measurement or an operational/status
/// (diagnostic) reading such as flow, shutter, or online state.
///
/// A plain enum by design -- downstream consumers map it to whatever
/// category surface their framework provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorCategory {
    Measurement,
    Diagnostic,
}

/// One sensor reading with its identity and presentation metadata.
///
/// `key` is the stable identifier (from portal element identifiers, never
/// from display text); `label` is the locale-dependent display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub key: String,
    pub label: String,
    pub value: SensorValue,
    pub unit: Option<String>,
    pub category: SensorCategory,
}

impl SensorData {
    /// Stable unique identifier for downstream entity naming.
    ///
    /// `{pool_id}_{module_id}_{key}` for module-scoped sensors,
    /// `{pool_id}_{key}` for root-scoped ones. Keyed by pool id, so the
    /// identifier survives credential and config-entry changes.
    pub fn unique_id(&self, pool_id: &str, module_id: Option<&str>) -> String {
        match module_id {
            Some(module) => format!("{pool_id}_{module}_{}", self.key),
            None => format!("{pool_id}_{}", self.key),
        }
    }
}

// ── Modules ──────────────────────────────────────────────────────────

/// Module category, derived from the portal's `type` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    /// Radio gateway (`lr-mb-10`).
    Gateway,
    /// Main pool controller (`lr-pc`).
    PoolController,
    /// IPX extension unit (`ipx`) -- electrolyser / pH regulation.
    Ipx,
    /// Anything the portal reports that we don't recognise.
    Other(String),
}

impl ModuleKind {
    pub fn from_type(type_str: &str) -> Self {
        match type_str {
            "lr-mb-10" => Self::Gateway,
            "lr-pc" => Self::PoolController,
            "ipx" => Self::Ipx,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// One module attached to the pool, with its scoped sensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleData {
    pub id: String,
    pub name: String,
    pub kind: ModuleKind,
    /// Connectivity as reported by the portal's required `connected` field.
    pub online: bool,
    /// False when this module's status fragment could not be parsed. The
    /// rest of the pool stays usable -- partial availability degrades
    /// individual modules, never the whole refresh.
    pub available: bool,
    pub sensors: HashMap<String, SensorData>,
    /// Raw program definitions, carried opaquely for the command path.
    pub programs: Vec<serde_json::Value>,
    /// The filtration program, when the module has one (`programType` 4).
    pub filtration_program: Option<serde_json::Value>,
}

impl ModuleData {
    /// An unavailable placeholder for a discovered module whose status
    /// fragment failed to parse.
    pub(crate) fn unavailable(id: String, name: String, kind: ModuleKind) -> Self {
        Self {
            id,
            name,
            kind,
            online: false,
            available: false,
            sensors: HashMap::new(),
            programs: Vec::new(),
            filtration_program: None,
        }
    }
}

// ── Filtration mode ──────────────────────────────────────────────────

/// Filtration program mode, as encoded by the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiltrationMode {
    Off,
    On,
    Auto,
}

impl FiltrationMode {
    /// The integer the portal uses in `programCharacteristics.mode`.
    pub fn as_int(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::Auto => 2,
        }
    }

    pub fn from_int(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::On),
            2 => Some(Self::Auto),
            _ => None,
        }
    }
}

// ── Parse warnings ───────────────────────────────────────────────────

/// Where a skipped fragment was encountered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningScope {
    Root,
    Module(String),
}

/// A non-fatal parse skip: unrecognised or uncoercible field.
///
/// Warnings ride inside [`PoolData`] so diagnostics survive past the
/// parse call without being fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub scope: WarningScope,
    pub field: String,
    pub reason: String,
}

// ── Pool ─────────────────────────────────────────────────────────────

/// The aggregated state of one pool after a successful fetch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolData {
    /// Portal pool identifier. Non-empty, stable across reconfiguration.
    pub pool_id: String,
    pub name: Option<String>,
    /// Serial number of the radio gateway, when one is installed.
    pub gateway_address: Option<String>,
    /// Relay identifier used by the remote-sync command path.
    pub relay_id: Option<String>,
    /// Root-scoped sensors, keyed by sensor key.
    pub sensors: HashMap<String, SensorData>,
    /// Modules, keyed by module id.
    pub modules: HashMap<String, ModuleData>,
    pub fetched_at: DateTime<Utc>,
    /// Non-fatal skips recorded while parsing this snapshot.
    pub warnings: Vec<ParseWarning>,
}

impl PoolData {
    pub fn sensor(&self, key: &str) -> Option<&SensorData> {
        self.sensors.get(key)
    }

    pub fn module(&self, id: &str) -> Option<&ModuleData> {
        self.modules.get(id)
    }
}
