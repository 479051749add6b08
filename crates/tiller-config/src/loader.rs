// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;
use tracing::debug;

use crate::merge::resolve_layers;
use crate::schema::ResolvedConfig;

/// The three settings-file locations, lowest to highest priority:
/// user (`<config_dir>/tiller/settings.json`), project
/// (`<cwd>/.tiller/settings.json`), local (`<cwd>/.tiller/settings.local.json`).
pub fn layer_paths(cwd: &Path) -> [PathBuf; 3] {
    let user = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tiller")
        .join("settings.json");
    let project = cwd.join(".tiller").join("settings.json");
    let local = cwd.join(".tiller").join("settings.local.json");
    [user, project, local]
}

/// Read one settings layer.  A missing file is an empty layer; a present but
/// malformed file is an error (silently ignoring it would make overrides
/// vanish without a trace).
pub fn read_layer(path: &Path) -> anyhow::Result<Value> {
    if !path.is_file() {
        return Ok(Value::Object(Default::default()));
    }
    debug!(path = %path.display(), "loading settings layer");
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Load and merge all three layers for `cwd`.
pub fn load_resolved(cwd: &Path) -> anyhow::Result<ResolvedConfig> {
    let [user, project, local] = layer_paths(cwd);
    let cfg = resolve_layers(read_layer(&user)?, read_layer(&project)?, read_layer(&local)?)?;
    Ok(cfg)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_layer_reads_as_empty_object() {
        let v = read_layer(Path::new("/tmp/tiller_nonexistent_settings_xyz.json")).unwrap();
        assert_eq!(v, serde_json::json!({}));
    }

    #[test]
    fn malformed_layer_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(read_layer(&path).is_err());
    }

    #[test]
    fn local_layer_overrides_project_layer() {
        let dir = tempfile::tempdir().unwrap();
        let tiller = dir.path().join(".tiller");
        std::fs::create_dir_all(&tiller).unwrap();
        std::fs::write(
            tiller.join("settings.json"),
            r#"{ "model": "sonnet", "maxTurns": 3 }"#,
        )
        .unwrap();
        std::fs::write(tiller.join("settings.local.json"), r#"{ "model": "opus" }"#).unwrap();

        let cfg = load_resolved(dir.path()).unwrap();
        assert_eq!(cfg.model.as_deref(), Some("opus"));
        assert_eq!(cfg.max_turns, Some(3));
    }
}
