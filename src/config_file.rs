//! Configuration file handling for backup appliance declarations.
//!
//! The file mirrors what the provisioning layer passes in: the module list,
//! snapshot retention, filesystem defaults, and where the bootstrap assets
//! live. Values are kept raw here (sizes and counts as JSON numbers) so the
//! validator can report non-integral or negative input instead of serde
//! rejecting it with a generic type error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::fs;
use std::path::Path;

use crate::types::{EnvTarget, SinkKind};

/// Device letter used for the first module when none is configured
pub const DEFAULT_DEVICE_BASE: char = 'f';

/// One backup module as declared by the caller, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawModule {
    pub name: String,
    pub ssh_key: String,
    pub size: Number,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_options: Option<String>,
}

impl RawModule {
    /// Convenience constructor for a module without overrides
    pub fn new(name: impl Into<String>, ssh_key: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            ssh_key: ssh_key.into(),
            size: Number::from(size),
            file_system: None,
            mount_options: None,
        }
    }
}

/// Bucket/key of the archive holding the backup script and rsyncd template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSource {
    pub bucket: String,
    pub key: String,
}

/// Backup appliance declaration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    /// Declared modules; absent or empty means one default module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<RawModule>>,

    /// Snapshots kept per module; absent or 0 falls back to 15
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_snapshots: Option<Number>,

    /// Default filesystem for new volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_system: Option<String>,

    /// Default mount options for new volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_options: Option<String>,

    /// First device letter handed out (e.g. 'f' for /dev/sdf)
    #[serde(default = "default_device_base")]
    pub device_base: char,

    #[serde(default)]
    pub env_target: EnvTarget,

    #[serde(default)]
    pub sink: SinkKind,

    /// Bucket receiving backup logs
    pub logs_bucket: String,

    pub asset: AssetSource,

    /// apt packages installed before anything else runs
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
}

fn default_device_base() -> char {
    DEFAULT_DEVICE_BASE
}

fn default_packages() -> Vec<String> {
    vec!["awscli".to_string(), "unzip".to_string()]
}

impl BackupConfig {
    /// Create a configuration with defaults for everything but the buckets
    pub fn new(logs_bucket: impl Into<String>, asset: AssetSource) -> Self {
        Self {
            modules: None,
            max_snapshots: None,
            file_system: None,
            mount_options: None,
            device_base: DEFAULT_DEVICE_BASE,
            env_target: EnvTarget::default(),
            sink: SinkKind::default(),
            logs_bucket: logs_bucket.into(),
            asset,
            packages: default_packages(),
        }
    }

    /// Builder-style module list setter
    pub fn with_modules(mut self, modules: Vec<RawModule>) -> Self {
        self.modules = Some(modules);
        self
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }
}
