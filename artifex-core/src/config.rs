//! Configuration system for Artifex.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment -> CLI overrides.
//! Configuration is loaded from `~/.config/artifex/config.toml` and/or
//! `.artifex/config.toml` in the workspace directory.

use crate::gateway::GatewayConfig;
use artifex_ml::MlConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ml: MlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset and no `-v`/`-q` is given.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write JSON logs to a daily rolling file.
    #[serde(default)]
    pub json_file: bool,
    /// Directory for the JSON log file. Defaults to the user data dir.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_file: false,
            log_dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Where the JSON log file goes, if file logging is enabled.
    pub fn resolved_log_dir(&self) -> Option<PathBuf> {
        self.log_dir.clone().or_else(|| {
            directories::ProjectDirs::from("dev", "artifex", "artifex")
                .map(|dirs| dirs.data_dir().join("logs"))
        })
    }
}

/// Values given on the command line. Only set fields override.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub artifact_dir: Option<PathBuf>,
    pub market_reference: Option<PathBuf>,
}

impl AppConfig {
    /// Range checks serde cannot express.
    pub fn validate(&self) -> Result<(), artifex_ml::MlError> {
        self.ml.prediction.validate()?;
        if self.gateway.request_timeout_secs == 0 {
            return Err(artifex_ml::MlError::config(
                "gateway.request_timeout_secs must be at least 1",
            ));
        }
        Ok(())
    }

    /// Anchor relative artifact and market paths at `workspace`.
    pub fn resolve_paths(&mut self, workspace: &Path) {
        if self.ml.artifacts.dir.is_relative() {
            self.ml.artifacts.dir = workspace.join(&self.ml.artifacts.dir);
        }
        if let Some(path) = &self.ml.market.reference_path {
            if path.is_relative() {
                self.ml.market.reference_path = Some(workspace.join(path));
            }
        }
    }
}

/// User-level config file location.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "artifex", "artifex")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Workspace-level config file location.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".artifex").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. CLI overrides
/// 2. Environment variables (prefixed with `ARTIFEX_`, `__` nests)
/// 3. Explicit config file (`--config`)
/// 4. Workspace-local config (`.artifex/config.toml`)
/// 5. User config (`~/.config/artifex/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = config_file {
        figment = figment.merge(Toml::file(file));
    }

    // ARTIFEX_GATEWAY__PORT, ARTIFEX_ML__PREDICTION__BAND_FRACTION, etc.
    figment = figment.merge(Env::prefixed("ARTIFEX_").split("__"));

    if let Some(host) = &overrides.host {
        figment = figment.merge(Serialized::default("gateway.host", host));
    }
    if let Some(port) = overrides.port {
        figment = figment.merge(Serialized::default("gateway.port", port));
    }
    if let Some(dir) = &overrides.artifact_dir {
        figment = figment.merge(Serialized::default("ml.artifacts.dir", dir));
    }
    if let Some(path) = &overrides.market_reference {
        figment = figment.merge(Serialized::default("ml.market.reference_path", path));
    }

    let mut config: AppConfig = figment.extract().map_err(Box::new)?;
    if let Some(ws) = workspace {
        config.resolve_paths(ws);
    }
    Ok(config)
}

/// Write a default `.artifex/config.toml` into `workspace`.
///
/// Returns the path written. An existing file is left untouched unless
/// `force` is set.
pub fn write_default_config(workspace: &Path, force: bool) -> anyhow::Result<PathBuf> {
    let path = workspace_config_path(workspace);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(&AppConfig::default())?;
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_file);
        assert_eq!(config.ml.prediction.band_fraction, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_workspace_file_and_overrides() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".artifex")).unwrap();
        std::fs::write(
            workspace_config_path(dir.path()),
            "[gateway]\nport = 9100\nhost = \"0.0.0.0\"\n\n[ml.prediction]\nband_fraction = 0.3\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            port: Some(9200),
            ..Default::default()
        };
        let config = load_config(Some(dir.path()), None, &overrides).unwrap();
        assert_eq!(config.gateway.port, 9200);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.ml.prediction.band_fraction, 0.3);
        assert_eq!(config.ml.artifacts.dir, dir.path().join("artifacts"));
    }

    #[test]
    fn test_explicit_file_beats_workspace() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("custom.toml");
        std::fs::write(&file, "[logging]\nlevel = \"debug\"\njson_file = true\n").unwrap();
        let config = load_config(None, Some(&file), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_file);
    }

    #[test]
    fn test_bad_value_is_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "[gateway]\nport = \"eighty\"\n").unwrap();
        assert!(load_config(None, Some(&file), &ConfigOverrides::default()).is_err());
    }

    #[test]
    fn test_invalid_band_rejected() {
        let mut config = AppConfig::default();
        config.ml.prediction.band_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_default_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = write_default_config(dir.path(), false).unwrap();
        let parsed: AppConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.gateway.port, AppConfig::default().gateway.port);
        assert!(write_default_config(dir.path(), false).is_err());
        assert!(write_default_config(dir.path(), true).is_ok());
    }
}
