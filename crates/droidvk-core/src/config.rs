use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LoaderError;

/// Environment variable pointing at an alternate configuration file.
pub const CONFIG_ENV: &str = "DROIDVK_CONFIG";

/// Top-level loader configuration, loaded from loader.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub layers: LayerConfig,
    #[serde(default)]
    pub hal: HalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Property values consulted before the environment and the system
    /// property store.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Vendor layer directory, always scanned
    #[serde(default = "default_layer_path")]
    pub layer_path: String,
    /// Debug layer directory, scanned only for dumpable processes
    #[serde(default = "default_debug_layer_path")]
    pub debug_layer_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HalConfig {
    /// Explicit HAL module path; bypasses the directory search when set
    pub module_path: Option<String>,
    /// Directories searched for `vulkan.<variant>.so`
    #[serde(default = "default_hal_search_paths")]
    pub search_paths: Vec<String>,
    /// Properties naming the HAL variant, in priority order
    #[serde(default = "default_variant_properties")]
    pub variant_properties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when DROIDVK_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            layer_path: default_layer_path(),
            debug_layer_path: default_debug_layer_path(),
        }
    }
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            module_path: None,
            search_paths: default_hal_search_paths(),
            variant_properties: default_variant_properties(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, LoaderError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| LoaderError::Config(format!("{}: {}", path, e)))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(LoaderError::Io(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring loader configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String, LoaderError> {
        toml::to_string_pretty(self).map_err(|e| LoaderError::Config(e.to_string()))
    }
}

/// Returns the config file path.
/// Search order:
/// 1. `$DROIDVK_CONFIG`
/// 2. `/vendor/etc/vulkan/loader.toml`
/// 3. Local fallback: `./droidvk.toml`
pub fn default_config_path() -> String {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return path;
    }
    let system_path = "/vendor/etc/vulkan/loader.toml";
    if std::path::Path::new(system_path).exists() {
        return system_path.to_string();
    }
    "droidvk.toml".to_string()
}

fn default_layer_path() -> String {
    droidvk_common::platform::default_layer_dir()
}

fn default_debug_layer_path() -> String {
    droidvk_common::platform::DEBUG_LAYER_DIR.to_string()
}

fn default_hal_search_paths() -> Vec<String> {
    droidvk_common::platform::default_hal_dirs()
}

fn default_variant_properties() -> Vec<String> {
    vec!["ro.hardware.vulkan".to_string(), "ro.board.platform".to_string()]
}

fn default_log_filter() -> String {
    "warn".to_string()
}
