use std::{collections::HashMap, fs, path::Path};

use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "todo.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub store_url: String,
    pub collection: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_url: "http://127.0.0.1:8000".into(),
            collection: "todos".into(),
        }
    }
}

pub fn load_settings(path: &Path) -> Settings {
    load_settings_with(path, |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then the environment. `APP__*` variables
/// win over their `TODO_*` counterparts.
fn load_settings_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.get("store_url") {
                    settings.store_url = v.clone();
                }
                if let Some(v) = file_cfg.get("collection") {
                    settings.collection = v.clone();
                }
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring unreadable settings file");
            }
        }
    }

    if let Some(v) = env("TODO_STORE_URL") {
        settings.store_url = v;
    }
    if let Some(v) = env("APP__STORE_URL") {
        settings.store_url = v;
    }

    if let Some(v) = env("TODO_COLLECTION") {
        settings.collection = v;
    }
    if let Some(v) = env("APP__COLLECTION") {
        settings.collection = v;
    }

    settings
}
