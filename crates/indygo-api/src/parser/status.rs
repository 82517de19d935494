// Status-payload parsing.
//
// Maps the status endpoint's JSON onto the structure recovered from the
// discovery page. Conversion tables fix each sensor key's label, unit,
// and value kind, so a key can never change kind across refreshes.
// Unknown fields degrade to warnings; a module missing its required
// `connected` field fails that module only.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::discovery::{Discovery, DiscoveredModule, identifier_string};
use super::{coerce_bool, coerce_number, insert_sensor};
use crate::error::Error;
use crate::model::{
    ModuleData, ModuleKind, ParseWarning, PoolData, SensorCategory, SensorData, SensorValue,
    WarningScope,
};

/// Root measurement sensors: (key, label, unit).
const ROOT_SENSORS: &[(&str, &str, Option<&str>)] = &[
    ("temperature", "Water Temperature", Some("°C")),
    ("ph", "pH", None),
    ("redox", "Redox", Some("mV")),
    ("orp", "ORP", Some("mV")),
    ("salt", "Salt", Some("g/L")),
    ("chlorineRate", "Chlorine", Some("ppm")),
];

/// Boolean operational states a module may report. All diagnostic.
const MODULE_BOOL_SENSORS: &[(&str, &str)] = &[
    ("flow", "Flow"),
    ("shutter", "Shutter"),
    ("boost", "Boost"),
    ("filtration", "Filtration"),
    ("electrolyser", "Electrolyser"),
];

/// Root-level fields that are structural, not sensors.
const ROOT_STRUCTURAL_FIELDS: &[&str] = &["id", "name", "modules", "sensorState", "poolCommand"];

/// Module-level fields that are structural, not sensors.
const MODULE_STRUCTURAL_FIELDS: &[&str] =
    &["id", "name", "type", "serialNumber", "connected", "programs", "ipxData"];

/// The filtration program's `programCharacteristics.programType`.
const PROGRAM_TYPE_FILTRATION: u64 = 4;

pub(crate) fn build_pool_data(
    pool_id: &str,
    discovery: Discovery,
    status: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<PoolData, Error> {
    let Some(status_map) = status.as_object() else {
        return Err(Error::parse("status payload", "expected a JSON object"));
    };

    let mut warnings = discovery.warnings;
    let mut sensors = HashMap::new();

    parse_root_sensors(status_map, &mut sensors, &mut warnings)?;
    parse_sensor_state(status_map.get("sensorState"), &mut sensors, &mut warnings)?;

    if let Some(ipx_module) = discovery.ipx_module.as_ref() {
        parse_scraped_ipx(ipx_module, &mut sensors)?;
    }

    warn_unknown_fields(status_map, &mut warnings);

    let modules = parse_modules(&discovery.modules, status_map.get("modules"), &mut warnings);

    Ok(PoolData {
        pool_id: pool_id.to_owned(),
        name: discovery.name,
        gateway_address: discovery.gateway_address,
        relay_id: discovery.relay_id,
        sensors,
        modules,
        fetched_at,
        warnings,
    })
}

// ── Root sensors ─────────────────────────────────────────────────────

fn parse_root_sensors(
    status: &serde_json::Map<String, Value>,
    sensors: &mut HashMap<String, SensorData>,
    warnings: &mut Vec<ParseWarning>,
) -> Result<(), Error> {
    for &(key, label, unit) in ROOT_SENSORS {
        let Some(raw) = status.get(key) else { continue };
        if raw.is_null() {
            continue;
        }

        match coerce_number(raw) {
            Some(value) => insert_sensor(
                sensors,
                SensorData {
                    key: key.to_owned(),
                    label: label.to_owned(),
                    value: SensorValue::Number(value),
                    unit: unit.map(str::to_owned),
                    category: SensorCategory::Measurement,
                },
                "root sensors",
            )?,
            None => {
                warn!(key, ?raw, "root sensor value is not numeric -- skipping");
                warnings.push(ParseWarning {
                    scope: WarningScope::Root,
                    field: key.to_owned(),
                    reason: "value is not numeric".into(),
                });
            }
        }
    }
    Ok(())
}

/// The generic `sensorState` list. Index 0 is the water-temperature
/// probe, reported scaled by 100; other indexes are not mapped.
fn parse_sensor_state(
    sensor_state: Option<&Value>,
    sensors: &mut HashMap<String, SensorData>,
    warnings: &mut Vec<ParseWarning>,
) -> Result<(), Error> {
    let Some(raw) = sensor_state else {
        return Ok(());
    };

    let Some(entries) = raw.as_array() else {
        warnings.push(ParseWarning {
            scope: WarningScope::Root,
            field: "sensorState".into(),
            reason: "expected a list".into(),
        });
        return Ok(());
    };

    for entry in entries {
        let index = entry.get("index").and_then(Value::as_u64);
        let value = entry.get("value").and_then(coerce_number);

        match (index, value) {
            (Some(0), Some(scaled)) => insert_sensor(
                sensors,
                SensorData {
                    key: "sensorState_0".into(),
                    label: "Water Temperature".into(),
                    value: SensorValue::Number(scaled / 100.0),
                    unit: Some("°C".into()),
                    category: SensorCategory::Measurement,
                },
                "root sensors",
            )?,
            (Some(index), _) => {
                warnings.push(ParseWarning {
                    scope: WarningScope::Root,
                    field: format!("sensorState[{index}]"),
                    reason: "unmapped sensor index".into(),
                });
            }
            (None, _) => {
                warnings.push(ParseWarning {
                    scope: WarningScope::Root,
                    field: "sensorState".into(),
                    reason: "entry without index".into(),
                });
            }
        }
    }
    Ok(())
}

fn warn_unknown_fields(
    status: &serde_json::Map<String, Value>,
    warnings: &mut Vec<ParseWarning>,
) {
    for key in status.keys() {
        let known = ROOT_STRUCTURAL_FIELDS.contains(&key.as_str())
            || ROOT_SENSORS.iter().any(|&(k, _, _)| k == key);
        if !known {
            warn!(key, "unrecognised status field -- skipping");
            warnings.push(ParseWarning {
                scope: WarningScope::Root,
                field: key.clone(),
                reason: "unrecognised field".into(),
            });
        }
    }
}

// ── Scraped IPX block ────────────────────────────────────────────────

/// Supplementary sensors from the discovery page's `ipxModule` block:
/// (output index, field, key, label, unit, category).
const IPX_OUTPUT_SENSORS: &[(usize, &str, &str, &str, Option<&str>, SensorCategory)] = &[
    (1, "saltValue", "ipx_salt", "Salt Level (IPX)", Some("g/L"), SensorCategory::Measurement),
    (0, "pHSetpoint", "ph_setpoint", "pH Setpoint", None, SensorCategory::Diagnostic),
    (
        1,
        "percentageSetpoint",
        "production_setpoint",
        "Production Setpoint",
        Some("%"),
        SensorCategory::Diagnostic,
    ),
    (
        1,
        "electrolyzerMode",
        "electrolyzer_mode",
        "Electrolyzer Mode",
        None,
        SensorCategory::Diagnostic,
    ),
];

fn parse_scraped_ipx(
    ipx_module: &Value,
    sensors: &mut HashMap<String, SensorData>,
) -> Result<(), Error> {
    let outputs = ipx_module.get("outputs").and_then(Value::as_array);
    let Some(outputs) = outputs else {
        return Ok(());
    };

    for &(output, field, key, label, unit, category) in IPX_OUTPUT_SENSORS {
        let value = outputs
            .get(output)
            .and_then(|o| o.get("ipxData"))
            .and_then(|d| d.get(field))
            .and_then(coerce_number);

        if let Some(value) = value {
            insert_sensor(
                sensors,
                SensorData {
                    key: key.to_owned(),
                    label: label.to_owned(),
                    value: SensorValue::Number(value),
                    unit: unit.map(str::to_owned),
                    category,
                },
                "root sensors",
            )?;
        }
    }
    Ok(())
}

// ── Modules ──────────────────────────────────────────────────────────

fn parse_modules(
    discovered: &[DiscoveredModule],
    status_modules: Option<&Value>,
    warnings: &mut Vec<ParseWarning>,
) -> HashMap<String, ModuleData> {
    let fragments = index_status_fragments(status_modules, warnings);

    let mut modules = HashMap::new();

    for module in discovered {
        let data = match fragments.get(module.id.as_str()) {
            Some(fragment) => match parse_module(module, fragment, warnings) {
                Ok(data) => data,
                Err(reason) => {
                    warn!(module_id = %module.id, %reason, "module status parse failed -- marking unavailable");
                    warnings.push(ParseWarning {
                        scope: WarningScope::Module(module.id.clone()),
                        field: "connected".into(),
                        reason,
                    });
                    ModuleData::unavailable(module.id.clone(), module.name.clone(), module.kind.clone())
                }
            },
            None => {
                warn!(module_id = %module.id, "no status fragment for discovered module");
                warnings.push(ParseWarning {
                    scope: WarningScope::Module(module.id.clone()),
                    field: "status".into(),
                    reason: "no status fragment for this module".into(),
                });
                ModuleData::unavailable(module.id.clone(), module.name.clone(), module.kind.clone())
            }
        };

        // Discovery already failed on duplicate ids, so this can't clobber.
        modules.insert(module.id.clone(), data);
    }

    // Fragments for modules the discovery page never listed are skipped;
    // keys must originate from discovery, not from status payloads.
    for id in fragments.keys() {
        if !modules.contains_key(id.as_str()) {
            warnings.push(ParseWarning {
                scope: WarningScope::Module(id.clone()),
                field: "status".into(),
                reason: "status fragment for undiscovered module".into(),
            });
        }
    }

    modules
}

fn index_status_fragments<'a>(
    status_modules: Option<&'a Value>,
    warnings: &mut Vec<ParseWarning>,
) -> HashMap<String, &'a Value> {
    let mut fragments: HashMap<String, &Value> = HashMap::new();

    let Some(entries) = status_modules.and_then(Value::as_array) else {
        return fragments;
    };

    for entry in entries {
        match identifier_string(entry.get("id")) {
            Some(id) => {
                fragments.insert(id, entry);
            }
            None => warnings.push(ParseWarning {
                scope: WarningScope::Root,
                field: "modules".into(),
                reason: "status module entry without id".into(),
            }),
        }
    }

    fragments
}

/// Parse one module's status fragment. An `Err` here fails only this
/// module; the caller degrades it to unavailable.
fn parse_module(
    module: &DiscoveredModule,
    fragment: &Value,
    warnings: &mut Vec<ParseWarning>,
) -> Result<ModuleData, String> {
    // `connected` is the one required field: a module whose connectivity
    // we can't establish has no trustworthy readings at all.
    let online = fragment
        .get("connected")
        .and_then(coerce_bool)
        .ok_or_else(|| "missing or unreadable required field `connected`".to_owned())?;

    let mut sensors = HashMap::new();

    for &(key, label) in MODULE_BOOL_SENSORS {
        let Some(raw) = fragment.get(key) else { continue };
        if raw.is_null() {
            continue;
        }

        match coerce_bool(raw) {
            Some(value) => {
                let sensor = SensorData {
                    key: key.to_owned(),
                    label: label.to_owned(),
                    value: SensorValue::Bool(value),
                    unit: None,
                    category: SensorCategory::Diagnostic,
                };
                // Table-driven keys can't collide within one module.
                sensors.insert(sensor.key.clone(), sensor);
            }
            None => {
                warn!(module_id = %module.id, key, ?raw, "module state is not boolean -- skipping");
                warnings.push(ParseWarning {
                    scope: WarningScope::Module(module.id.clone()),
                    field: key.to_owned(),
                    reason: "value is not boolean".into(),
                });
            }
        }
    }

    if module.kind == ModuleKind::Ipx {
        if let Some(duration) = fragment
            .get("ipxData")
            .and_then(|d| d.get("totalElectrolyseDuration"))
            .and_then(coerce_number)
        {
            sensors.insert(
                "totalElectrolyseDuration".into(),
                SensorData {
                    key: "totalElectrolyseDuration".into(),
                    label: "Electrolyse Duration".into(),
                    value: SensorValue::Number(duration),
                    unit: Some("h".into()),
                    category: SensorCategory::Diagnostic,
                },
            );
        }
    }

    for key in fragment.as_object().map(|m| m.keys()).into_iter().flatten() {
        let known = MODULE_STRUCTURAL_FIELDS.contains(&key.as_str())
            || MODULE_BOOL_SENSORS.iter().any(|&(k, _)| k == key);
        if !known {
            warnings.push(ParseWarning {
                scope: WarningScope::Module(module.id.clone()),
                field: key.clone(),
                reason: "unrecognised field".into(),
            });
        }
    }

    let programs: Vec<Value> = fragment
        .get("programs")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let filtration_program = programs
        .iter()
        .find(|p| {
            p.get("programCharacteristics")
                .and_then(|c| c.get("programType"))
                .and_then(Value::as_u64)
                == Some(PROGRAM_TYPE_FILTRATION)
        })
        .cloned();

    Ok(ModuleData {
        id: module.id.clone(),
        name: module.name.clone(),
        kind: module.kind.clone(),
        online,
        available: true,
        sensors,
        programs,
        filtration_program,
    })
}
