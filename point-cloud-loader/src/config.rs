//! Native module and loader configuration.
//!
//! Memory sizes are read once, when the native module is instantiated. The
//! merge order for every call is: explicit overrides, then the cached process
//! config, then built-in defaults.

use std::path::Path;

use constants::loading::{DEFAULT_DECIMATE, DEFAULT_MAX_POINTS};
use constants::memory::{
    DEFAULT_BUDGET_MB, DEFAULT_MEMORY_INITIAL_SIZE, DEFAULT_MEMORY_MAXIMUM_SIZE, ENV_DEBUG,
    ENV_MEMORY_INITIAL_MB, ENV_MEMORY_MAXIMUM_MB, MIB,
};
use serde::{Deserialize, Serialize};

/// Resolved configuration for the native decoder module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Initial foreign heap size in bytes.
    pub memory_initial_size: u64,
    /// Upper bound the foreign heap may grow to, in bytes.
    pub memory_maximum_size: u64,
    /// Verbose lifecycle logging.
    pub debug: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            memory_initial_size: DEFAULT_MEMORY_INITIAL_SIZE,
            memory_maximum_size: DEFAULT_MEMORY_MAXIMUM_SIZE,
            debug: cfg!(debug_assertions),
        }
    }
}

impl ModuleConfig {
    /// Apply overrides on top of this config; set fields win.
    pub fn merged_with(&self, overrides: &ModuleConfigOverrides) -> Self {
        Self {
            memory_initial_size: overrides
                .memory_initial_size
                .unwrap_or(self.memory_initial_size),
            memory_maximum_size: overrides
                .memory_maximum_size
                .unwrap_or(self.memory_maximum_size),
            debug: overrides.debug.unwrap_or(self.debug),
        }
    }

    /// True when the memory sizing differs from `other`.
    pub fn memory_differs(&self, other: &ModuleConfig) -> bool {
        self.memory_initial_size != other.memory_initial_size
            || self.memory_maximum_size != other.memory_maximum_size
    }
}

/// Partial module configuration; unset fields fall through to the cached
/// process config and then to defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfigOverrides {
    #[serde(default)]
    pub memory_initial_size: Option<u64>,
    #[serde(default)]
    pub memory_maximum_size: Option<u64>,
    #[serde(default)]
    pub debug: Option<bool>,
}

impl ModuleConfigOverrides {
    /// Layer `self` over `lower`: fields set here win, unset fields keep `lower`.
    pub fn over(&self, lower: &ModuleConfigOverrides) -> Self {
        Self {
            memory_initial_size: self.memory_initial_size.or(lower.memory_initial_size),
            memory_maximum_size: self.memory_maximum_size.or(lower.memory_maximum_size),
            debug: self.debug.or(lower.debug),
        }
    }

    /// True when any memory sizing field is set.
    pub fn touches_memory(&self) -> bool {
        self.memory_initial_size.is_some() || self.memory_maximum_size.is_some()
    }

    /// Read host-supplied sizing from the environment (values in MiB).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] but with an injectable variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mib = |key: &str| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .filter(|mb| *mb > 0)
                .map(|mb| mb * MIB)
        };

        Self {
            memory_initial_size: mib(ENV_MEMORY_INITIAL_MB),
            memory_maximum_size: mib(ENV_MEMORY_MAXIMUM_MB),
            debug: lookup(ENV_DEBUG).and_then(|raw| parse_flag(&raw)),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Host memory configuration as written in a JSON config file (MiB).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryConfigFile {
    #[serde(default)]
    pub initial: Option<u64>,
    #[serde(default)]
    pub maximum: Option<u64>,
}

/// Top-level loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub memory: MemoryConfigFile,
    #[serde(default)]
    pub debug: Option<bool>,
    /// Ceiling of the allocation ledger in MiB.
    #[serde(default = "default_budget_mb")]
    pub budget_mb: u64,
    #[serde(default = "default_decimate")]
    pub decimate: usize,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

fn default_budget_mb() -> u64 {
    DEFAULT_BUDGET_MB
}

fn default_decimate() -> usize {
    DEFAULT_DECIMATE
}

fn default_max_points() -> usize {
    DEFAULT_MAX_POINTS
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfigFile::default(),
            debug: None,
            budget_mb: DEFAULT_BUDGET_MB,
            decimate: DEFAULT_DECIMATE,
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Module overrides described by this config.
    pub fn module_overrides(&self) -> ModuleConfigOverrides {
        ModuleConfigOverrides {
            memory_initial_size: self.memory.initial.map(|mb| mb * MIB),
            memory_maximum_size: self.memory.maximum.map(|mb| mb * MIB),
            debug: self.debug,
        }
    }

    /// Ledger ceiling in bytes.
    pub fn budget_bytes(&self) -> u64 {
        self.budget_mb * MIB
    }
}

/// Human-readable byte count for logs.
pub fn format_memory(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn explicit_overrides_beat_cached_which_beat_defaults() {
        let cached = ModuleConfigOverrides {
            memory_initial_size: Some(32 * MIB),
            memory_maximum_size: Some(256 * MIB),
            debug: None,
        };
        let explicit = ModuleConfigOverrides {
            memory_maximum_size: Some(1024 * MIB),
            ..Default::default()
        };

        let resolved = ModuleConfig::default().merged_with(&explicit.over(&cached));
        assert_eq!(resolved.memory_initial_size, 32 * MIB);
        assert_eq!(resolved.memory_maximum_size, 1024 * MIB);
        assert_eq!(resolved.debug, ModuleConfig::default().debug);
    }

    #[test]
    fn env_lookup_converts_mib_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            (ENV_MEMORY_INITIAL_MB, "64"),
            (ENV_MEMORY_MAXIMUM_MB, "not-a-number"),
            (ENV_DEBUG, "off"),
        ]
        .into_iter()
        .collect();

        let overrides =
            ModuleConfigOverrides::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(overrides.memory_initial_size, Some(64 * MIB));
        assert_eq!(overrides.memory_maximum_size, None);
        assert_eq!(overrides.debug, Some(false));
    }

    #[test]
    fn config_file_fills_defaults() {
        let config: LoaderConfig =
            serde_json::from_str(r#"{ "memory": { "maximum": 2048 }, "debug": true }"#).unwrap();
        assert_eq!(config.budget_mb, DEFAULT_BUDGET_MB);
        assert_eq!(config.max_points, DEFAULT_MAX_POINTS);

        let overrides = config.module_overrides();
        assert_eq!(overrides.memory_maximum_size, Some(2048 * MIB));
        assert_eq!(overrides.memory_initial_size, None);
        assert_eq!(overrides.debug, Some(true));
    }

    #[test]
    fn memory_formatting_picks_unit() {
        assert_eq!(format_memory(512), "512 bytes");
        assert_eq!(format_memory(2048), "2.00 KB");
        assert_eq!(format_memory(128 * MIB), "128.00 MB");
    }
}
