// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

use crate::schema::{ConfigError, ResolvedConfig};

/// Deep-merge `src` into `dst`; src wins on conflicts.
///
/// Objects merge key-by-key.  Arrays are *replaced*, not concatenated: a
/// later layer's list fully overrides an earlier one so entry order stays
/// exactly what the winning layer wrote.
pub fn merge_value(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(d), Value::Object(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(Value::Object(Default::default()));
                merge_value(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Merge the three settings layers (local overrides project overrides user)
/// and deserialize the result into a [`ResolvedConfig`].
pub fn resolve_layers(user: Value, project: Value, local: Value) -> Result<ResolvedConfig, ConfigError> {
    let mut merged = Value::Object(Default::default());
    merge_value(&mut merged, user);
    merge_value(&mut merged, project);
    merge_value(&mut merged, local);
    serde_json::from_value(merged).map_err(|e| ConfigError::Invalid(e.to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = json!({ "model": "sonnet" });
        merge_value(&mut dst, json!({ "model": "opus" }));
        assert_eq!(dst["model"], "opus");
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = json!({ "model": "sonnet", "maxTurns": 4 });
        merge_value(&mut dst, json!({ "maxTurns": 9 }));
        assert_eq!(dst["model"], "sonnet");
        assert_eq!(dst["maxTurns"], 9);
    }

    #[test]
    fn merge_nested_objects() {
        let mut dst = json!({ "permissions": { "mode": "default", "allowedTools": ["Read"] } });
        merge_value(&mut dst, json!({ "permissions": { "mode": "plan" } }));
        assert_eq!(dst["permissions"]["mode"], "plan");
        assert_eq!(dst["permissions"]["allowedTools"], json!(["Read"]));
    }

    #[test]
    fn merge_replaces_arrays_without_concatenation() {
        let mut dst = json!({ "permissions": { "allowedTools": ["Read", "Grep"] } });
        merge_value(&mut dst, json!({ "permissions": { "allowedTools": ["Bash"] } }));
        assert_eq!(dst["permissions"]["allowedTools"], json!(["Bash"]));
    }

    #[test]
    fn resolve_layers_local_beats_project_beats_user() {
        let cfg = resolve_layers(
            json!({ "model": "haiku", "maxTurns": 2 }),
            json!({ "model": "sonnet" }),
            json!({ "maxTurns": 12 }),
        )
        .unwrap();
        assert_eq!(cfg.model.as_deref(), Some("sonnet"));
        assert_eq!(cfg.max_turns, Some(12));
    }

    #[test]
    fn resolve_layers_all_empty_yields_defaults() {
        let cfg = resolve_layers(json!({}), json!({}), json!({})).unwrap();
        assert!(cfg.model.is_none());
        assert!(cfg.mcp_servers.is_empty());
    }

    #[test]
    fn resolve_layers_rejects_malformed_config() {
        let err = resolve_layers(json!({ "maxTurns": "lots" }), json!({}), json!({}));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }
}
