//! Backup module validation.
//!
//! Module names and device paths are interpolated into the forced command of
//! an SSH key, so the character-set checks here are the boundary that keeps
//! key holders from running anything other than the backup entry point.

use serde_json::Number;
use std::collections::HashMap;

use crate::config_file::RawModule;
use crate::error::{BootstrapError, Result};

/// Name of the module synthesized when none are declared
pub const DEFAULT_MODULE_NAME: &str = "backup";

/// Size in GB of the synthesized default module
pub const DEFAULT_MODULE_SIZE: u32 = 100;

/// Snapshot retention used when none (or zero) is configured
pub const DEFAULT_MAX_SNAPSHOTS: u32 = 15;

/// Key algorithms accepted at the start of an SSH public key line
const KEY_ALGORITHM_PREFIXES: &[&str] = &["ssh-", "ecdsa-sha2-", "sk-"];

/// A validated backup module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    /// Public key bound to this module; `None` for the synthesized default,
    /// which reuses the instance key pair already present on the machine
    pub ssh_key: Option<String>,
    /// Volume size in GB
    pub size: u32,
    pub file_system: Option<String>,
    pub mount_options: Option<String>,
}

impl ModuleSpec {
    /// The module used when the caller declares none
    pub fn default_module() -> Self {
        Self {
            name: DEFAULT_MODULE_NAME.to_string(),
            ssh_key: None,
            size: DEFAULT_MODULE_SIZE,
            file_system: None,
            mount_options: None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.ssh_key.is_none()
    }
}

/// Validate the declared module list.
///
/// An absent or empty list yields the single default module. Otherwise each
/// module is checked in order and the first violation aborts validation.
///
/// # Errors
///
/// - `InvalidIdentifier` if a name is empty, starts with `-` or `_`, or has
///   characters outside `[A-Za-z0-9_-]`
/// - `InvalidSshKey` if a key is not a single `<algorithm> <base64> [comment]`
///   line, or carries a `command=` or a quote
/// - `InvalidModuleSize` if a size is not a positive integer
/// - `InvalidSetting` if a filesystem/mount override has unsafe characters
/// - `DuplicateModuleName` on the second occurrence of a name
pub fn validate_modules(raw: Option<&[RawModule]>) -> Result<Vec<ModuleSpec>> {
    let raw = match raw {
        Some(modules) if !modules.is_empty() => modules,
        _ => return Ok(vec![ModuleSpec::default_module()]),
    };

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut modules = Vec::with_capacity(raw.len());

    for (index, module) in raw.iter().enumerate() {
        if !is_safe_identifier(&module.name) {
            return Err(BootstrapError::InvalidIdentifier {
                index,
                name: module.name.clone(),
            });
        }

        validate_ssh_key(&module.ssh_key).map_err(|reason| BootstrapError::InvalidSshKey {
            index,
            name: module.name.clone(),
            reason: reason.to_string(),
        })?;

        let size = positive_integer(&module.size)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| BootstrapError::InvalidModuleSize {
                index,
                name: module.name.clone(),
                size: module.size.to_string(),
            })?;

        if let Some(fs) = &module.file_system {
            check_option_value(&format!("modules[{}].fileSystem", index), fs)?;
        }
        if let Some(opts) = &module.mount_options {
            check_option_value(&format!("modules[{}].mountOptions", index), opts)?;
        }

        if let Some(&first) = seen.get(module.name.as_str()) {
            return Err(BootstrapError::DuplicateModuleName {
                index,
                first,
                name: module.name.clone(),
            });
        }
        seen.insert(&module.name, index);

        modules.push(ModuleSpec {
            name: module.name.clone(),
            ssh_key: Some(module.ssh_key.trim().to_string()),
            size,
            file_system: module.file_system.clone(),
            mount_options: module.mount_options.clone(),
        });
    }

    Ok(modules)
}

/// Validate the snapshot retention count.
///
/// Absent or zero falls back to [`DEFAULT_MAX_SNAPSHOTS`].
pub fn validate_max_snapshots(raw: Option<&Number>) -> Result<u32> {
    let Some(value) = raw else {
        return Ok(DEFAULT_MAX_SNAPSHOTS);
    };

    if value.as_u64() == Some(0) || value.as_f64() == Some(0.0) {
        return Ok(DEFAULT_MAX_SNAPSHOTS);
    }

    positive_integer(value)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| BootstrapError::InvalidMaxSnapshots {
            value: value.to_string(),
        })
}

/// Check that a name is safe to place in a shell command and a file name.
///
/// The first character must be a letter or digit so the name is never read
/// as an option by the backup entry point.
pub fn is_safe_identifier(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Check a filesystem or mount-option value.
///
/// Allowed: letters, digits and `_ . , = : / + -`.
pub fn check_option_value(setting: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(BootstrapError::setting(setting, value, "must not be empty"));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "_.,=:/+-".contains(*c)))
    {
        return Err(BootstrapError::setting(
            setting,
            value,
            format!("character {:?} is not allowed", bad),
        ));
    }
    Ok(())
}

/// Accept `<algorithm> <base64> [comment]` and nothing else.
fn validate_ssh_key(key: &str) -> std::result::Result<(), &'static str> {
    let key = key.trim();
    if key.is_empty() {
        return Err("key is empty");
    }
    if key.contains(['\n', '\r']) {
        return Err("key must be a single line");
    }
    if key.contains("command=") {
        return Err("key must not carry a command clause");
    }
    let mut parts = key.split_whitespace();
    let algorithm = parts.next().unwrap_or_default();
    if !KEY_ALGORITHM_PREFIXES
        .iter()
        .any(|prefix| algorithm.starts_with(prefix))
    {
        return Err("key must start with its algorithm (e.g. ssh-ed25519)");
    }
    let Some(material) = parts.next() else {
        return Err("key material is missing");
    };
    if !material
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "+/=".contains(c))
    {
        return Err("key material must be base64");
    }
    if key.contains('"') {
        return Err("key comment must not contain quotes");
    }
    Ok(())
}

/// Accept whole numbers greater than zero, including `50.0`.
fn positive_integer(value: &Number) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return (n > 0).then_some(n);
    }
    if value.is_i64() {
        return None;
    }
    let f = value.as_f64()?;
    (f > 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}
