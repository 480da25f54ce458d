//! Configuration file management
//!
//! Loads TOML configuration files and provides application settings.
//! Default config path: ~/.config/kmsmode/config.toml

use anyhow::{ensure, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_DEVICE_PATH, DEFAULT_FALLBACK_MODES};
use crate::kms::{CrtcPolicy, FallbackMode, FallbackPolicy, ModeResolver};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// DRM device node
    pub device: String,
    /// Mode setting settings
    pub modeset: ModesetConfig,
    /// Fallback mode table
    pub fallback: FallbackConfig,
}

/// Mode setting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModesetConfig {
    /// Requested modes must be advertised by the connector.
    /// When false, unknown modes are synthesized and tried anyway.
    pub strict: bool,
    /// CRTC selection: "first" (first listed) or "encoder"
    /// (follow the connector's encoder)
    pub crtc: CrtcPolicy,
    /// Ask the kernel to re-probe connectors (re-reads EDID)
    pub force_probe: bool,
}

impl Default for ModesetConfig {
    fn default() -> Self {
        Self {
            strict: true,
            crtc: CrtcPolicy::FirstListed,
            force_probe: true,
        }
    }
}

/// Fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Tried in order on connected outputs that advertise no modes
    pub modes: Vec<FallbackMode>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            modes: DEFAULT_FALLBACK_MODES.to_vec(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE_PATH.to_string(),
            modeset: ModesetConfig::default(),
            fallback: FallbackConfig::default(),
        }
    }
}

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/kmsmode/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. KMSMODE_CONFIG environment variable
        if let Ok(path) = std::env::var("KMSMODE_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/kmsmode/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("kmsmode").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/kmsmode/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. KMSMODE_CONFIG environment variable
    /// 2. ~/.config/kmsmode/config.toml (user config)
    /// 3. /etc/kmsmode/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse and validate a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.device.is_empty(), "device path is empty");
        ensure!(
            !self.fallback.modes.is_empty(),
            "fallback.modes must list at least one mode"
        );
        for mode in &self.fallback.modes {
            mode.validate().context("invalid fallback mode")?;
        }
        Ok(())
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::new(self.fallback.modes.clone(), self.modeset.crtc)
    }

    /// Resolver from these settings; `lenient` overrides `modeset.strict`
    pub fn resolver(&self, lenient: bool) -> ModeResolver {
        ModeResolver::new(self.modeset.strict && !lenient)
            .with_crtc_policy(self.modeset.crtc)
            .with_fallback(self.fallback_policy())
    }
}
