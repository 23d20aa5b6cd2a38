use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::{Map, Value};

pub const DEFAULT_SETTINGS_PATH: &str = "app-settings.json";
pub const DEFAULT_WINDOW_SIZE: (u32, u32) = (1280, 720);

/// Persistent application settings. Each layer owns the section stored under
/// its name; the window size lives at the top level.
#[derive(Debug, Clone)]
pub struct AppSettings {
    path: PathBuf,
    document: Value,
}

impl AppSettings {
    /// Applies the file at `path` on top of `defaults`, creating the file from
    /// the defaults when it does not exist yet.
    pub fn load_or_create(path: impl Into<PathBuf>, defaults: Value) -> Result<Self> {
        let path = path.into();
        let mut document = defaults;
        if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings {}", path.display()))?;
            let stored: Value = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse settings {}", path.display()))?;
            merge_patch(&mut document, &stored);
            let settings = Self { path, document };
            info!("Loaded settings from {}", settings.path.display());
            Ok(settings)
        } else {
            let settings = Self { path, document };
            if let Err(err) = settings.save() {
                warn!("Could not write default settings: {err:#}");
            }
            Ok(settings)
        }
    }

    /// Settings that are never written back to disk.
    pub fn in_memory(defaults: Value) -> Self {
        Self {
            path: PathBuf::new(),
            document: defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Section for the layer called `name`, `Value::Null` when absent.
    pub fn section(&self, name: &str) -> Value {
        self.document.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn window_size(&self) -> (u32, u32) {
        let read = |key: &str, fallback: u32| {
            self.document
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(fallback)
        };
        (
            read("window_width", DEFAULT_WINDOW_SIZE.0),
            read("window_height", DEFAULT_WINDOW_SIZE.1),
        )
    }

    pub fn save(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let text = serde_json::to_string_pretty(&self.document)?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write settings {}", self.path.display()))
    }
}

/// Builds the default document from per-layer sections.
pub fn default_document<'a>(sections: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    let mut root = Map::new();
    root.insert("window_width".into(), DEFAULT_WINDOW_SIZE.0.into());
    root.insert("window_height".into(), DEFAULT_WINDOW_SIZE.1.into());
    for (name, section) in sections {
        if !section.is_null() {
            root.insert(name.to_string(), section);
        }
    }
    Value::Object(root)
}

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
