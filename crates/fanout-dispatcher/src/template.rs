// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-recipient `{{key}}` personalization, rendered at dispatch time.

use serde_json::Value;

/// Substitute `{{key}}` placeholders in `template` with the recipient's
/// personalization fields.
///
/// `fields_json` is the JSON object captured from the recipient file's
/// non-phone columns. Placeholders with no matching field are left intact
/// so a half-filled template is visible rather than silently blanked.
pub fn render(template: &str, fields_json: Option<&str>) -> String {
    let Some(json) = fields_json else {
        return template.to_string();
    };
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(json) else {
        return template.to_string();
    };

    let mut out = template.to_string();
    for (key, value) in &fields {
        let placeholder = format!("{{{{{key}}}}}");
        if !out.contains(&placeholder) {
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&placeholder, &rendered);
    }
    out
}
