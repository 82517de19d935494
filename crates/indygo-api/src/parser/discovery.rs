// Discovery-page parsing.
//
// The devices page embeds its data as JavaScript object literals
// (`var currentPool = {...}`, `var ipxModule = {...}`). We recover them
// with a string-aware balanced-brace scan -- no DOM, no regex -- and
// hand the extracted text to serde_json. Module keys come from `id` and
// `serialNumber` attributes; display names map to labels only.

use serde_json::Value;
use tracing::warn;

use crate::error::Error;
use crate::model::{ModuleKind, ParseWarning, WarningScope};

/// Structure recovered from the discovery page.
#[derive(Debug)]
pub(crate) struct Discovery {
    pub name: Option<String>,
    /// Serial number of the radio gateway (or the controller standing in
    /// for one).
    pub gateway_address: Option<String>,
    /// Relay identifier for the remote-sync command path.
    pub relay_id: Option<String>,
    pub modules: Vec<DiscoveredModule>,
    /// The raw `ipxModule` block, when the page carries one.
    pub ipx_module: Option<Value>,
    pub warnings: Vec<ParseWarning>,
}

/// One module as enumerated on the discovery page.
#[derive(Debug)]
pub(crate) struct DiscoveredModule {
    pub id: String,
    pub name: String,
    pub kind: ModuleKind,
    pub serial: Option<String>,
}

pub(crate) fn parse_discovery(html: &str) -> Result<Discovery, Error> {
    let Some(pool_json) = extract_embedded_object(html, "currentPool") else {
        return Err(Error::parse(
            "discovery page",
            "no currentPool block found",
        ));
    };

    let pool: Value = serde_json::from_str(pool_json)
        .map_err(|e| Error::parse("discovery page", format!("currentPool is not valid JSON: {e}")))?;

    let mut warnings = Vec::new();

    let name = pool.get("name").and_then(Value::as_str).map(str::to_owned);

    let modules = parse_modules(&pool, &mut warnings)?;
    let (gateway_address, relay_id) = resolve_addressing(&pool, &modules, &mut warnings);

    // The ipxModule block is optional; a malformed one degrades to a
    // warning because everything it feeds is supplementary.
    let ipx_module = match extract_embedded_object(html, "ipxModule") {
        Some(text) => match serde_json::from_str(text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "ipxModule block is not valid JSON -- skipping");
                warnings.push(ParseWarning {
                    scope: WarningScope::Root,
                    field: "ipxModule".into(),
                    reason: format!("not valid JSON: {e}"),
                });
                None
            }
        },
        None => None,
    };

    Ok(Discovery {
        name,
        gateway_address,
        relay_id,
        modules,
        ipx_module,
        warnings,
    })
}

/// Enumerate modules from `currentPool.modules`.
///
/// Entries without an id are skipped with a warning; duplicate ids are a
/// deterministic failure, never a silent drop.
fn parse_modules(pool: &Value, warnings: &mut Vec<ParseWarning>) -> Result<Vec<DiscoveredModule>, Error> {
    let mut modules = Vec::new();

    let Some(entries) = pool.get("modules").and_then(Value::as_array) else {
        return Ok(modules);
    };

    for entry in entries {
        let Some(id) = identifier_string(entry.get("id")) else {
            warn!("discovery module entry without id -- skipping");
            warnings.push(ParseWarning {
                scope: WarningScope::Root,
                field: "modules".into(),
                reason: "module entry without id".into(),
            });
            continue;
        };

        if modules.iter().any(|m: &DiscoveredModule| m.id == id) {
            return Err(Error::parse(
                "discovery page",
                format!("duplicate module id `{id}`"),
            ));
        }

        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .map_or(ModuleKind::Other("unknown".into()), ModuleKind::from_type);

        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .map_or_else(|| format!("Module {id}"), str::to_owned);

        let serial = entry
            .get("serialNumber")
            .and_then(Value::as_str)
            .map(str::to_owned);

        modules.push(DiscoveredModule {
            id,
            name,
            kind,
            serial,
        });
    }

    Ok(modules)
}

/// Resolve the gateway address and relay id from the module inventory.
///
/// Installations with an `lr-pc` controller address through the dedicated
/// `lr-mb-10` gateway when present, otherwise through the controller
/// itself; the relay id is the trailing segment of the controller's
/// dash-separated name, falling back to the last six characters of its
/// serial. IPX-only installations address through the IPX unit and its
/// `ipxRelay` field.
fn resolve_addressing(
    pool: &Value,
    modules: &[DiscoveredModule],
    warnings: &mut Vec<ParseWarning>,
) -> (Option<String>, Option<String>) {
    let gateway = modules.iter().find(|m| m.kind == ModuleKind::Gateway);
    let controller = modules.iter().find(|m| m.kind == ModuleKind::PoolController);

    if let Some(controller) = controller {
        let address = gateway
            .or(Some(controller))
            .and_then(|m| m.serial.clone());

        let relay = match controller.name.rsplit_once('-') {
            Some((_, suffix)) if !suffix.is_empty() => Some(suffix.to_owned()),
            _ => controller.serial.as_ref().map(|s| {
                let tail_start = s.len().saturating_sub(6);
                s[tail_start..].to_owned()
            }),
        };

        return (address, relay);
    }

    if let Some(ipx) = modules.iter().find(|m| m.kind == ModuleKind::Ipx) {
        let relay = pool
            .get("modules")
            .and_then(Value::as_array)
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|e| identifier_string(e.get("id")).as_deref() == Some(ipx.id.as_str()))
            })
            .and_then(|entry| identifier_string(entry.get("ipxRelay")));

        return (ipx.serial.clone(), relay);
    }

    if !modules.is_empty() {
        warn!("no compatible module (lr-pc or ipx) in discovery module list");
        warnings.push(ParseWarning {
            scope: WarningScope::Root,
            field: "modules".into(),
            reason: "no compatible module (lr-pc or ipx) found".into(),
        });
    }

    (None, None)
}

/// Stringify a portal identifier, which may arrive as a number or string.
pub(crate) fn identifier_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Embedded-object extraction ───────────────────────────────────────

/// Find `var_name = {...}` in the page and return the balanced object
/// text. Occurrences of the name not followed by `= {` are skipped.
fn extract_embedded_object<'a>(text: &'a str, var_name: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(pos) = text[search_from..].find(var_name) {
        let after_name = search_from + pos + var_name.len();
        let rest = text[after_name..].trim_start();
        if let Some(stripped) = rest.strip_prefix('=') {
            let stripped = stripped.trim_start();
            if stripped.starts_with('{') {
                let brace_start = text.len() - stripped.len();
                return extract_json_object(text, brace_start);
            }
        }
        search_from = after_name;
    }
    None
}

/// Extract a balanced JSON object starting at `start` (which must point
/// at a `{`). Handles braces inside string literals and escaped quotes.
fn extract_json_object(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0u32;
    let mut in_string = false;
    let mut escape = false;

    for (i, byte) in text.bytes().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if byte == b'\\' {
                escape = true;
            } else if byte == b'"' {
                in_string = false;
            }
        } else if byte == b'"' {
            in_string = true;
        } else if byte == b'{' {
            depth += 1;
        } else if byte == b'}' {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..=i]);
            }
        }
    }

    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ModuleKind;

    const DEVICES_PAGE: &str = r#"
        <html><body><script>
        var currentPool = {
            "id": 123,
            "name": "Backyard",
            "temperature": 25.5,
            "modules": [
                {"id": 1, "type": "lr-mb-10", "serialNumber": "GATEWAY123", "name": "Gateway-01"},
                {"id": 2, "type": "lr-pc", "serialNumber": "LRPC123", "name": "Pool-ABC"}
            ]
        };
        </script></body></html>
    "#;

    #[test]
    fn extracts_nested_object() {
        let text = r#"var someData = {"a": 1, "b": {"c": 2}};"#;
        let start = text.find('{').unwrap();
        assert_eq!(
            extract_json_object(text, start),
            Some(r#"{"a": 1, "b": {"c": 2}}"#)
        );
    }

    #[test]
    fn extraction_survives_escaped_quotes_and_braces_in_strings() {
        let text = r#"{"a": "val\"ue", "b": "{not a brace}"}"#;
        assert_eq!(extract_json_object(text, 0), Some(text));
    }

    #[test]
    fn skips_name_occurrences_without_assignment() {
        let text = r#"// currentPool is set below
            window.currentPool = {"id": 5};"#;
        assert_eq!(
            extract_embedded_object(text, "currentPool"),
            Some(r#"{"id": 5}"#)
        );
    }

    #[test]
    fn gateway_and_relay_resolved_from_controller_name() {
        let discovery = parse_discovery(DEVICES_PAGE).unwrap();
        assert_eq!(discovery.gateway_address.as_deref(), Some("GATEWAY123"));
        assert_eq!(discovery.relay_id.as_deref(), Some("ABC"));
        assert_eq!(discovery.name.as_deref(), Some("Backyard"));
        assert_eq!(discovery.modules.len(), 2);
        assert_eq!(discovery.modules[1].kind, ModuleKind::PoolController);
    }

    #[test]
    fn relay_falls_back_to_serial_tail_without_dashed_name() {
        let html = r#"<script>var currentPool = {"id": 9, "modules": [
            {"id": 2, "type": "lr-pc", "serialNumber": "LRPC987654", "name": "Controller"}
        ]};</script>"#;
        let discovery = parse_discovery(html).unwrap();
        // No dedicated gateway: the controller stands in.
        assert_eq!(discovery.gateway_address.as_deref(), Some("LRPC987654"));
        assert_eq!(discovery.relay_id.as_deref(), Some("987654"));
    }

    #[test]
    fn ipx_only_installation_uses_ipx_relay() {
        let html = r#"<script>var currentPool = {"id": 9, "modules": [
            {"id": 7, "type": "ipx", "serialNumber": "IPX555", "ipxRelay": 3, "name": "IPX"}
        ]};</script>"#;
        let discovery = parse_discovery(html).unwrap();
        assert_eq!(discovery.gateway_address.as_deref(), Some("IPX555"));
        assert_eq!(discovery.relay_id.as_deref(), Some("3"));
    }

    #[test]
    fn missing_current_pool_is_a_parse_error() {
        let err = parse_discovery("<html><body>nothing here</body></html>").unwrap_err();
        assert!(matches!(err, Error::Parse { ref fragment, .. } if fragment == "discovery page"));
    }

    #[test]
    fn duplicate_module_id_is_a_parse_error() {
        let html = r#"<script>var currentPool = {"id": 9, "modules": [
            {"id": 2, "type": "lr-pc", "name": "A"},
            {"id": 2, "type": "ipx", "name": "B"}
        ]};</script>"#;
        let err = parse_discovery(html).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn module_without_id_is_skipped_with_warning() {
        let html = r#"<script>var currentPool = {"id": 9, "modules": [
            {"type": "lr-pc", "name": "Nameless"},
            {"id": 4, "type": "lr-pc", "serialNumber": "LRPC1", "name": "Pool-X"}
        ]};</script>"#;
        let discovery = parse_discovery(html).unwrap();
        assert_eq!(discovery.modules.len(), 1);
        assert_eq!(discovery.warnings.len(), 1);
    }
}
