use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::env_optional;

pub(crate) const DEFAULT_DATA_DIR: &str = "./mira";
/// Persisted transcript cap per chat session (messages, both roles).
pub(crate) const DEFAULT_SESSION_CAP: usize = 40;

pub(crate) fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env_optional("MIRA_HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub(crate) fn store_path(data_dir: &Path) -> PathBuf {
    data_dir.join("crm.sqlite")
}

pub(crate) fn config_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.json")
}

/// Optional per-installation overrides. Env vars win over the file; the
/// file wins over built-in defaults. Loaded leniently — a broken file
/// behaves like an absent one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub(crate) struct FileConfig {
    #[serde(default)]
    pub(crate) model: Option<String>,
    #[serde(default)]
    pub(crate) live_model: Option<String>,
    #[serde(default)]
    pub(crate) session_cap: Option<usize>,
}

pub(crate) fn load_file_config(data_dir: &Path) -> FileConfig {
    match std::fs::read_to_string(config_file_path(data_dir)) {
        Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
        Err(_) => FileConfig::default(),
    }
}

pub(crate) fn save_file_config(
    data_dir: &Path,
    config: &FileConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_file_path(data_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_roundtrip_and_lenient_load() {
        let dir = std::env::temp_dir().join(format!("mira_config_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        // absent file → defaults
        let absent = load_file_config(&dir);
        assert!(absent.model.is_none());

        let config = FileConfig {
            model: Some("custom-model".into()),
            live_model: None,
            session_cap: Some(12),
        };
        save_file_config(&dir, &config).unwrap();
        let loaded = load_file_config(&dir);
        assert_eq!(loaded.model.as_deref(), Some("custom-model"));
        assert_eq!(loaded.session_cap, Some(12));

        // corrupt file → defaults, no error
        std::fs::write(config_file_path(&dir), "{ not json").unwrap();
        let broken = load_file_config(&dir);
        assert!(broken.model.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
