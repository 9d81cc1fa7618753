use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::types::JudgeConfig;
use crate::error::{JudgeError, Result};

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "pyjudge", "pyjudge")
}

/// Get the default configuration file path
pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = project_dirs() {
        proj_dirs.config_dir().join("config.toml")
    } else {
        // Fallback to home directory
        dirs_fallback().join(".pyjudge").join("config.toml")
    }
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(config_path: Option<&Path>) -> Result<JudgeConfig> {
    let path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if !path.exists() {
        // An explicitly named file must exist
        if config_path.is_some() {
            return Err(JudgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(JudgeConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    debug!(path = %path.display(), "Configuration loaded");

    Ok(config)
}

/// Parse and validate a TOML configuration document.
pub fn parse_config(content: &str) -> Result<JudgeConfig> {
    let config: JudgeConfig =
        toml::from_str(content).map_err(|e| JudgeError::TomlParse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Get the data directory (holds the default problem catalog)
pub fn get_data_dir() -> PathBuf {
    if let Some(proj_dirs) = project_dirs() {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs_fallback().join(".local").join("share").join("pyjudge")
    }
}

/// Catalog directory: the configured one, else `<data dir>/problems`.
pub fn catalog_dir(config: &JudgeConfig) -> PathBuf {
    config
        .catalog
        .dir
        .clone()
        .unwrap_or_else(|| get_data_dir().join("problems"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(JudgeError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[sandbox]\nmax_concurrency = 2\n\n[catalog]\ndir = \"/srv/problems\"\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.sandbox.max_concurrency, 2);
        assert_eq!(catalog_dir(&config), PathBuf::from("/srv/problems"));
    }

    #[test]
    fn test_parse_errors_are_reported() {
        assert!(matches!(
            parse_config("[sandbox\n"),
            Err(JudgeError::TomlParse(_))
        ));
        assert!(matches!(
            parse_config("[sandbox]\ntimeout_seconds = 0\n"),
            Err(JudgeError::Config(_))
        ));
    }

    #[test]
    fn test_default_catalog_dir_is_under_data_dir() {
        let config = JudgeConfig::default();
        assert_eq!(catalog_dir(&config), get_data_dir().join("problems"));
    }
}
