use std::path::Path;

use serde::{Deserialize, Serialize};

/// Persisted between runs next to the binary's working directory.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Profile used when `--profile` is not given.
    pub profile: Option<String>,
    pub capture_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self { profile: None, capture_interval_ms: 100 }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = std::fs::write(path, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json"));
        assert_eq!(settings.profile, None);
        assert_eq!(settings.capture_interval_ms, 100);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings { profile: Some("elwynn-forest".into()), capture_interval_ms: 50 };
        settings.save(&path);
        let loaded = Settings::load(&path);
        assert_eq!(loaded.profile.as_deref(), Some("elwynn-forest"));
        assert_eq!(loaded.capture_interval_ms, 50);
    }
}
