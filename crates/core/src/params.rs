//! Helpers for the generic `generation_params` JSON map.
//!
//! Adapters decode only the keys they recognise, falling back to their
//! configured defaults; the persisted representation stays a plain JSON
//! object so new providers can add keys without a schema change.

use serde_json::{Map, Value};

/// Provider-specific generation knobs as persisted on a task.
pub type GenerationParams = Map<String, Value>;

/// Top-level submission fields that are never treated as generation params.
pub const RESERVED_REQUEST_FIELDS: &[&str] = &[
    "provider",
    "inputType",
    "prompt",
    "imageUrl",
    "imageBase64",
    "name",
    "description",
    "tags",
    "category",
    "generationParams",
];

/// Read a string parameter, returning `default` when missing or not a string.
pub fn string_param(params: &GenerationParams, key: &str, default: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

/// Read an integer parameter.
///
/// Accepts JSON integers and floats (truncated), since JavaScript clients
/// routinely send `30000.0`.
pub fn int_param(params: &GenerationParams, key: &str, default: i64) -> i64 {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        _ => default,
    }
}

/// Read a boolean parameter, returning `default` when missing or not a bool.
pub fn bool_param(params: &GenerationParams, key: &str, default: bool) -> bool {
    params
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

/// Build the generation params for a submission request.
///
/// An explicit `generationParams` object is merged first; any other
/// top-level key that is not a reserved field is then layered on top, so
/// flat requests like `{"provider": "hunyuan", "faceCount": 200000}` work.
pub fn collect_generation_params(request: &Map<String, Value>) -> GenerationParams {
    let mut params = GenerationParams::new();

    if let Some(Value::Object(explicit)) = request.get("generationParams") {
        for (key, value) in explicit {
            params.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in request {
        if !RESERVED_REQUEST_FIELDS.contains(&key.as_str()) {
            params.insert(key.clone(), value.clone());
        }
    }

    params
}
