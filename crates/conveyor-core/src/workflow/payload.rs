//! Payload composition for workflow steps and trigger templates.

use serde_json::{Map, Value};

/// Recursive merge of `overlay` onto `base`. Objects merge key by key with
/// overlay winning on conflicts; any other value type is replaced outright.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let entry = match merged.get(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

/// Child job payload for a step: the run payload with the step's template
/// merged over it. Template keys win, so a workflow author can pin a field
/// regardless of what the run was started with.
pub fn effective_step_payload(run_payload: &Value, template: &Value) -> Value {
    deep_merge(run_payload, template)
}

/// Substitute `{{key}}` placeholders in every string of `template` with
/// values from `context`. Unknown placeholders are left as-is; non-string
/// values never carry placeholders.
pub fn render_template(template: &Value, context: &Map<String, Value>) -> Value {
    match template {
        Value::String(text) => Value::String(render_string(text, context)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_template(v, context)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| render_template(v, context)).collect())
        }
        other => other.clone(),
    }
}

fn render_string(text: &str, context: &Map<String, Value>) -> String {
    let mut rendered = text.to_string();
    for (key, value) in context {
        let placeholder = format!("{{{{{key}}}}}");
        if !rendered.contains(&placeholder) {
            continue;
        }
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &replacement);
    }
    rendered
}
