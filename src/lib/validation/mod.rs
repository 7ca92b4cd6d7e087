//! Structural checks on a raw job record before it is read into [`JobParameters`].
//!
//! These only look at which keys exist and whether numeric keys hold numbers.
//! Value ranges are the caller's business.
//!
//! [`JobParameters`]: crate::params::JobParameters

use serde_json::Value;

use crate::error::{GenError, GenResult};

const TOP_LEVEL: [&str; 16] = [
    "layers",
    "virtual_layers",
    "layer_thickness",
    "punching",
    "standoff",
    "feed_rates",
    "pattern",
    "head_steps",
    "rest_position",
    "needle_spacing",
    "random_order",
    "random_offsets",
    "random_offset_coefficient",
    "alternate_direction",
    "row_order",
    "selected_head",
];

const NESTED: [(&str, &[&str]); 6] = [
    ("pattern", &["punches_per_cell", "auto_shape", "nx", "ny"]),
    ("punching", &["progressive", "initial_depth", "max_depth"]),
    ("head_steps", &["x", "y"]),
    ("rest_position", &["x", "y", "z", "pause_seconds", "grow_z"]),
    ("needle_spacing", &["x", "y"]),
    ("feed_rates", &["xy", "z_insert", "z_extract"]),
];

/// Keys that must hold numbers whenever they are present.
const NUMERIC: [&str; 25] = [
    "layers",
    "virtual_layers",
    "layer_thickness",
    "standoff",
    "random_offset_coefficient",
    "acceleration",
    "pattern.punches_per_cell",
    "pattern.nx",
    "pattern.ny",
    "punching.initial_depth",
    "punching.max_depth",
    "head_steps.x",
    "head_steps.y",
    "needle_spacing.x",
    "needle_spacing.y",
    "feed_rates.xy",
    "feed_rates.z_insert",
    "feed_rates.z_extract",
    "rest_position.x",
    "rest_position.y",
    "rest_position.z",
    "rest_position.pause_seconds",
    "rest_position.buzzer_seconds",
    "frame.x",
    "frame.y",
];

fn lookup<'a>(record: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted.split('.').try_fold(record, |v, key| v.get(key))
}

fn is_frame_sized(record: &Value) -> bool {
    record.get("sizing_mode").and_then(Value::as_str) == Some("frame")
}

fn selected_head(record: &Value) -> Option<&str> {
    record.get("selected_head").and_then(Value::as_str)
}

/// Dotted path of the first required key missing from `record` or `catalog`,
/// or `None` when everything the generator reads is present.
pub fn missing_parameter(record: &Value, catalog: &Value) -> Option<String> {
    if let Some(key) = TOP_LEVEL.iter().find(|key| record.get(**key).is_none()) {
        return Some(key.to_string());
    }

    for (section, keys) in NESTED.iter() {
        if let Some(key) = keys.iter().find(|key| record[*section].get(**key).is_none()) {
            return Some(format!("{section}.{key}"));
        }
    }

    if is_frame_sized(record) {
        for key in ["frame", "frame.x", "frame.y"] {
            if lookup(record, key).is_none() {
                return Some(key.to_string());
            }
        }
    }

    let head = selected_head(record).unwrap_or_default();
    let head_path = format!("heads.{head}");
    if catalog.get("heads").and_then(|h| h.get(head)).is_none() {
        return Some(head_path);
    }
    ["x", "y"]
        .iter()
        .find(|key| catalog["heads"][head].get(**key).is_none())
        .map(|key| format!("{head_path}.{key}"))
}

/// First numeric key holding something other than a JSON number.
pub fn non_numeric_value(record: &Value, catalog: &Value) -> Option<(String, String)> {
    if let Some((key, value)) = NUMERIC
        .iter()
        .filter_map(|key| lookup(record, key).map(|v| (*key, v)))
        .find(|(_, v)| !v.is_number())
    {
        return Some((key.to_string(), value.to_string()));
    }

    let head = selected_head(record).unwrap_or_default();
    ["x", "y"].iter().find_map(|axis| {
        let v = catalog.get("heads")?.get(head)?.get(*axis)?;
        if v.is_number() {
            None
        } else {
            Some((format!("heads.{head}.{axis}"), v.to_string()))
        }
    })
}

/// Run both checks, turning the first problem into an error.
pub fn check(record: &Value, catalog: &Value) -> GenResult<()> {
    if let Some(key) = missing_parameter(record, catalog) {
        return Err(GenError::MissingParameter(key));
    }
    if let Some((key, value)) = non_numeric_value(record, catalog) {
        return Err(GenError::NonNumericInput { key, value });
    }
    Ok(())
}
