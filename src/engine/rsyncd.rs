//! Per-module rsync daemon configuration.
//!
//! The asset archive ships one `rsyncd.conf` template containing a `@host@`
//! placeholder. Each module gets its own copy with the placeholder replaced by
//! the module name, plus any filesystem/mount overrides the module declares.

use std::path::PathBuf;

use crate::engine::bootstrap::INSTALL_DIR;
use crate::modules::ModuleSpec;

/// Token replaced by the module name
pub const HOST_PLACEHOLDER: &str = "@host@";

/// A rendered configuration for one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub module: String,
    pub body: String,
}

impl RenderedConfig {
    /// Where this module's config is written on the machine
    pub fn path(&self) -> PathBuf {
        config_path(&self.module)
    }
}

/// `/srv/rsync-backup/rsyncd.<module>.conf`
pub fn config_path(module: &str) -> PathBuf {
    PathBuf::from(format!("{}/rsyncd.{}.conf", INSTALL_DIR, module))
}

/// Render the shared template for `module`.
///
/// Every occurrence of [`HOST_PLACEHOLDER`] is replaced; the rest of the
/// template is copied untouched. Override lines are appended only for
/// overrides the module actually sets.
pub fn render_config(template: &str, module: &ModuleSpec) -> RenderedConfig {
    let mut body = template.replace(HOST_PLACEHOLDER, &module.name);

    let overrides = override_lines(module);
    if !overrides.is_empty() {
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        for line in overrides {
            body.push_str(&line);
            body.push('\n');
        }
    }

    RenderedConfig {
        module: module.name.clone(),
        body,
    }
}

/// `FILE_SYSTEM=` / `MOUNT_OPTS=` lines for the overrides a module sets
pub fn override_lines(module: &ModuleSpec) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(fs) = &module.file_system {
        lines.push(format!("FILE_SYSTEM={}", fs));
    }
    if let Some(opts) = &module.mount_options {
        lines.push(format!("MOUNT_OPTS=\"{}\"", opts));
    }
    lines
}
