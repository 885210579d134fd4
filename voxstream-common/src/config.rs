//! Configuration file resolution and TOML loading
//!
//! Bootstrap configuration follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`<config dir>/voxstream/config.toml`)
//! 4. System config file (`/etc/voxstream/config.toml`, Linux only)
//! 5. Built-in defaults (no file)
//!
//! A missing configuration file is not an error: callers fall back to
//! their compiled defaults and log a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory name used under the platform config directory
const APP_DIR: &str = "voxstream";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Resolve which configuration file to load, if any
///
/// An explicitly requested path (CLI or environment) is returned even if it
/// does not exist, so that the loader can report it. Implicit locations are
/// only returned when present on disk.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    if let Some(user_config) = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System config file
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML configuration file into `T`
///
/// `None` yields `T::default()`. A path that was requested but does not exist
/// is reported as a configuration error.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        port: u16,
    }

    #[test]
    #[serial]
    fn test_cli_arg_wins_over_env() {
        std::env::set_var("VOXSTREAM_TEST_CONFIG", "/tmp/from-env.toml");
        let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), "VOXSTREAM_TEST_CONFIG");
        assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));
        std::env::remove_var("VOXSTREAM_TEST_CONFIG");
    }

    #[test]
    #[serial]
    fn test_env_used_without_cli_arg() {
        std::env::set_var("VOXSTREAM_TEST_CONFIG", "/tmp/from-env.toml");
        let resolved = resolve_config_path(None, "VOXSTREAM_TEST_CONFIG");
        assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));
        std::env::remove_var("VOXSTREAM_TEST_CONFIG");
    }

    #[test]
    fn test_load_none_gives_default() {
        let loaded: Sample = load_toml(None).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result: Result<Sample> = load_toml(Some(Path::new("/nonexistent/voxstream.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_parses_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"radio\"\nport = 7000").unwrap();

        let loaded: Sample = load_toml(Some(file.path())).unwrap();
        assert_eq!(loaded.name, "radio");
        assert_eq!(loaded.port, 7000);
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = ").unwrap();

        let result: Result<Sample> = load_toml(Some(file.path()));
        assert!(matches!(result, Err(Error::Toml(_))));
    }
}
