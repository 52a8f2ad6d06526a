//! Session configuration.
//!
//! Connection and launch parameters are loaded once from an optional YAML
//! file; anything the file does not set falls back to OS-dependent defaults
//! (Chrome profile directory, Chrome binary location, debug port).

use crate::error::{AiUiError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DEBUG_PORT: u16 = 9222;

/// OS family the session runs on. Keyboard shortcuts and default Chrome
/// paths vary per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl Platform {
    /// Detect the platform the process is running on.
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            _ => Platform::Other,
        }
    }
}

/// Raw shape of the YAML config file. All keys are optional; missing keys
/// keep their platform defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    connect_over_cdp: Option<bool>,
    headless: Option<bool>,
    user_data_dir: Option<PathBuf>,
    debug_port: Option<u16>,
    chrome_binary_path: Option<PathBuf>,
}

/// Immutable session configuration. Created at orchestrator construction and
/// never mutated afterwards; `load` replaces the whole value.
#[derive(Debug, Clone)]
pub struct Config {
    pub connect_over_cdp: bool,
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub debug_port: u16,
    pub chrome_binary_path: Option<PathBuf>,
    pub platform: Platform,
}

impl Default for Config {
    fn default() -> Self {
        let platform = Platform::detect();
        Self {
            connect_over_cdp: false,
            headless: false,
            user_data_dir: default_user_data_dir(platform),
            debug_port: DEFAULT_DEBUG_PORT,
            chrome_binary_path: default_chrome_binary_path(platform),
            platform,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a YAML file, filling unset keys with platform
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml)
            .map_err(|e| AiUiError::Config(format!("invalid config file: {}", e)))?;
        let mut config = Config::default();
        if let Some(v) = file.connect_over_cdp {
            config.connect_over_cdp = v;
        }
        if let Some(v) = file.headless {
            config.headless = v;
        }
        if let Some(v) = file.user_data_dir {
            config.user_data_dir = Some(v);
        }
        if let Some(v) = file.debug_port {
            config.debug_port = v;
        }
        if let Some(v) = file.chrome_binary_path {
            config.chrome_binary_path = Some(v);
        }
        Ok(config)
    }

    /// Resolve the Chrome binary to launch: explicit config value first,
    /// then the platform default locations.
    pub fn resolve_chrome_binary(&self) -> Result<PathBuf> {
        self.chrome_binary_path
            .clone()
            .or_else(|| default_chrome_binary_path(self.platform))
            .ok_or_else(|| {
                AiUiError::LaunchFailed(
                    "Chrome binary not found; set chrome_binary_path in the config".to_string(),
                )
            })
    }
}

/// Default Chrome user data dir for the platform, only if it exists.
pub fn default_user_data_dir(platform: Platform) -> Option<PathBuf> {
    let path = match platform {
        Platform::Linux => dirs::config_dir()?.join("google-chrome"),
        Platform::MacOs => dirs::home_dir()?
            .join("Library")
            .join("Application Support")
            .join("Google")
            .join("Chrome"),
        Platform::Windows => dirs::data_local_dir()?
            .join("Google")
            .join("Chrome")
            .join("User Data"),
        Platform::Other => return None,
    };
    path.exists().then_some(path)
}

/// First existing Chrome binary among the well-known install locations.
pub fn default_chrome_binary_path(platform: Platform) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = match platform {
        Platform::Windows => ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .map(|base| {
                PathBuf::from(base)
                    .join("Google")
                    .join("Chrome")
                    .join("Application")
                    .join("chrome.exe")
            })
            .collect(),
        Platform::MacOs => {
            let bundled = "Applications/Google Chrome.app/Contents/MacOS/Google Chrome";
            let mut paths = vec![PathBuf::from("/").join(bundled)];
            if let Some(home) = dirs::home_dir() {
                paths.push(home.join(bundled));
            }
            paths
        }
        Platform::Linux => [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chrome",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
        .iter()
        .map(PathBuf::from)
        .collect(),
        Platform::Other => Vec::new(),
    };

    candidates.into_iter().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Config::new();
        assert!(!config.connect_over_cdp);
        assert!(!config.headless);
        assert_eq!(config.debug_port, DEFAULT_DEBUG_PORT);
        assert_eq!(config.platform, Platform::detect());
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = r#"
debug_port: 9223
user_data_dir: "user_data_dir"
chrome_binary_path: "chrome_binary_path"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.debug_port, 9223);
        assert_eq!(config.user_data_dir, Some(PathBuf::from("user_data_dir")));
        assert_eq!(
            config.chrome_binary_path,
            Some(PathBuf::from("chrome_binary_path"))
        );
        // Untouched keys keep their defaults.
        assert!(!config.connect_over_cdp);
        assert!(!config.headless);
    }

    #[test]
    fn partial_yaml_keeps_port_default() {
        let config = Config::from_yaml("headless: true\n").unwrap();
        assert!(config.headless);
        assert_eq!(config.debug_port, DEFAULT_DEBUG_PORT);
    }

    #[test]
    fn invalid_yaml_is_a_config_error() {
        let err = Config::from_yaml("debug_port: [not a port]").unwrap_err();
        assert!(matches!(err, AiUiError::Config(_)));
    }

    #[test]
    fn load_reads_a_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "debug_port: 9333\nheadless: true\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.debug_port, 9333);
        assert!(config.headless);
    }
}
