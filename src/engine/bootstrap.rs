//! Bootstrap Plan Assembler
//!
//! Translates a `BackupConfig` and the shared rsyncd template into an ordered
//! sequence of typed `BootstrapStep`s that run once at the appliance's first
//! boot.
//!
//! # Step Order
//!
//! | Phase        | Steps |
//! |--------------|-------|
//! | Packages     | InstallPackages |
//! | Assets       | FetchAsset → Extract → RemoveFile(archive) → MoveFile(script) |
//! | Per module   | WriteFile(rsyncd.<m>.conf) → WriteFile(rsync-backup.<m>.sh) → AppendLines / ReplaceForcedCommand |
//! | Environment  | WriteFile(env file) or AppendLines(executable) |
//! | Cleanup      | RemoveFile(rsyncd.conf template) |
//!
//! # Design
//!
//! - **Pure logic**: No I/O; the template arrives as already-loaded text
//! - **Fail fast**: Settings and modules are validated before any step exists
//! - **Deterministic**: Same input, same steps, same rendered bytes
//! - **Accumulator**: Each phase takes the step list by value and returns it

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config_file::{AssetSource, BackupConfig};
use crate::engine::access::{access_entry, AccessControlEntry, ForcedCommand, AUTHORIZED_KEYS_PATH};
use crate::engine::devices::{allocate_devices, DeviceAssignment, DeviceLetter};
use crate::engine::rsyncd::{override_lines, render_config, RenderedConfig};
use crate::error::{BootstrapError, Result};
use crate::modules::{check_option_value, validate_max_snapshots, validate_modules};
use crate::types::EnvTarget;

/// Directory the asset archive is extracted into
pub const INSTALL_DIR: &str = "/srv/rsync-backup";

/// Installed backup entry point
pub const EXECUTABLE_PATH: &str = "/usr/local/bin/rsync-backup";

/// Backup script as shipped inside the asset archive
pub const ARCHIVE_SCRIPT_PATH: &str = "/srv/rsync-backup/rsync-backup.sh";

/// Shared rsyncd template extracted from the archive, removed last
pub const TEMPLATE_PATH: &str = "/srv/rsync-backup/rsyncd.conf";

/// Global environment file used with `EnvTarget::EnvironmentFile`
pub const ENV_FILE_PATH: &str = "/srv/rsync-backup/rsync-backup.env";

/// Mode of every file the plan writes
const FILE_MODE: u32 = 0o644;

// ============================================================================
// Plan Types
// ============================================================================

/// A single provisioning step in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStep {
    /// Refresh the package index and install packages (apt)
    InstallPackages { packages: Vec<String> },

    /// Download the asset archive from object storage
    FetchAsset {
        bucket: String,
        key: String,
        dest: PathBuf,
    },

    /// Unpack a zip archive into a directory
    Extract { archive: PathBuf, dest: PathBuf },

    RemoveFile { path: PathBuf },

    MoveFile { from: PathBuf, to: PathBuf },

    /// Write a whole file
    WriteFile {
        path: PathBuf,
        content: String,
        mode: Option<u32>,
    },

    /// Append lines to a (possibly existing) file
    AppendLines { path: PathBuf, lines: Vec<String> },

    /// Rewrite the forced command attached to the instance key pair
    ReplaceForcedCommand { path: PathBuf, command: ForcedCommand },
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstallPackages { packages } => {
                write!(f, "InstallPackages({})", packages.join(" "))
            }
            Self::FetchAsset { bucket, key, dest } => {
                write!(f, "FetchAsset(s3://{}/{} -> {})", bucket, key, dest.display())
            }
            Self::Extract { archive, dest } => {
                write!(f, "Extract({} -> {})", archive.display(), dest.display())
            }
            Self::RemoveFile { path } => write!(f, "RemoveFile({})", path.display()),
            Self::MoveFile { from, to } => {
                write!(f, "MoveFile({} -> {})", from.display(), to.display())
            }
            Self::WriteFile { path, content, mode } => write!(
                f,
                "WriteFile({}, {} bytes, mode={})",
                path.display(),
                content.len(),
                mode.map(|m| format!("{:o}", m)).unwrap_or_else(|| "-".to_string())
            ),
            Self::AppendLines { path, lines } => {
                write!(f, "AppendLines({}, {} lines)", path.display(), lines.len())
            }
            Self::ReplaceForcedCommand { path, command } => {
                write!(f, "ReplaceForcedCommand({}, {})", path.display(), command.clause())
            }
        }
    }
}

impl BootstrapStep {
    /// Path this step creates or modifies, if it touches a single file
    pub fn target(&self) -> Option<&Path> {
        match self {
            Self::FetchAsset { dest, .. } | Self::Extract { dest, .. } => Some(dest.as_path()),
            Self::RemoveFile { path }
            | Self::WriteFile { path, .. }
            | Self::AppendLines { path, .. }
            | Self::ReplaceForcedCommand { path, .. } => Some(path.as_path()),
            Self::MoveFile { to, .. } => Some(to.as_path()),
            Self::InstallPackages { .. } => None,
        }
    }
}

/// Validated plan-level settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSettings {
    pub max_snapshots: u32,
    pub logs_bucket: String,
    pub file_system: Option<String>,
    pub mount_options: Option<String>,
    pub device_base: DeviceLetter,
    pub env_target: EnvTarget,
    pub asset: AssetSource,
    pub packages: Vec<String>,
}

impl PlanSettings {
    /// Validate the global part of a configuration.
    ///
    /// # Errors
    ///
    /// - `InvalidMaxSnapshots` for a negative or fractional retention count
    /// - `InvalidSetting` for bucket names, asset keys, package names, base
    ///   letters or filesystem defaults that are malformed or shell-unsafe
    pub fn from_config(config: &BackupConfig) -> Result<Self> {
        let max_snapshots = validate_max_snapshots(config.max_snapshots.as_ref())?;

        check_bucket_name("logsBucket", &config.logs_bucket)?;
        check_bucket_name("asset.bucket", &config.asset.bucket)?;
        check_asset_key(&config.asset.key)?;

        for package in &config.packages {
            check_package_name(package)?;
        }
        if let Some(fs) = &config.file_system {
            check_option_value("fileSystem", fs)?;
        }
        if let Some(opts) = &config.mount_options {
            check_option_value("mountOptions", opts)?;
        }

        Ok(Self {
            max_snapshots,
            logs_bucket: config.logs_bucket.clone(),
            file_system: config.file_system.clone(),
            mount_options: config.mount_options.clone(),
            device_base: DeviceLetter::new(config.device_base)?,
            env_target: config.env_target,
            asset: config.asset.clone(),
            packages: config.packages.clone(),
        })
    }

    /// Global environment consumed by the backup script
    pub fn env_lines(&self) -> Vec<String> {
        vec![
            format!("MAX_SNAPSHOTS={}", self.max_snapshots),
            format!("S3_LOGS_BUCKET={}", self.logs_bucket),
            format!("FILE_SYSTEM={}", self.file_system.as_deref().unwrap_or("")),
            format!(
                "MOUNT_OPTS=\"{}\"",
                self.mount_options.as_deref().unwrap_or("")
            ),
        ]
    }

    /// Local path the asset archive is downloaded to
    pub fn archive_path(&self) -> PathBuf {
        Path::new("/tmp").join(&self.asset.key)
    }
}

/// A complete bootstrap plan: ordered steps plus the artifacts they carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPlan {
    /// Ordered sequence of provisioning steps
    pub steps: Vec<BootstrapStep>,
    /// One device per module, in declaration order
    pub assignments: Vec<DeviceAssignment>,
    /// One access entry per module
    pub access: Vec<AccessControlEntry>,
    /// One rendered rsyncd config per module
    pub configs: Vec<RenderedConfig>,
    pub settings: PlanSettings,
}

impl BootstrapPlan {
    /// True when no modules were declared and the default was synthesized
    pub fn uses_default_module(&self) -> bool {
        self.assignments.iter().any(|a| a.module.is_default())
    }

    /// Returns a summary of the plan for logging/display.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Bootstrap Plan: {} module(s)", self.assignments.len()),
            format!("  Max snapshots: {}", self.settings.max_snapshots),
            format!("  Logs bucket: {}", self.settings.logs_bucket),
            format!("  Environment: {}", self.settings.env_target),
        ];
        for (assignment, entry) in self.assignments.iter().zip(&self.access) {
            lines.push(format!(
                "  Module {} ({} GB) on {}: {}",
                assignment.module.name,
                assignment.module.size,
                assignment.device_path().display(),
                entry.command().clause()
            ));
        }
        if self.uses_default_module() {
            lines.push("  Default module: rewrites the instance key's forced command".to_string());
        }
        lines.push(format!("  Steps ({}):", self.steps.len()));
        for (i, step) in self.steps.iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, step));
        }
        let touched = self.touched_files();
        lines.push(format!("  Files touched ({}):", touched.len()));
        lines.extend(touched.iter().map(|path| format!("    {}", path.display())));
        lines.join("\n")
    }

    /// Distinct files the plan creates or modifies, in first-touch order
    pub fn touched_files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = Vec::new();
        for path in self.steps.iter().filter_map(BootstrapStep::target) {
            if !files.contains(&path) {
                files.push(path);
            }
        }
        files
    }
}

// ============================================================================
// Plan Calculation
// ============================================================================

/// Validate a configuration without building steps.
///
/// Runs every check `compile_plan` runs and returns the device assignments.
pub fn check_config(config: &BackupConfig) -> Result<(PlanSettings, Vec<DeviceAssignment>)> {
    let settings = PlanSettings::from_config(config)?;
    let modules = validate_modules(config.modules.as_deref())?;
    let assignments = allocate_devices(modules, settings.device_base)?;
    Ok((settings, assignments))
}

/// Compile a configuration into a bootstrap plan.
///
/// `template` is the contents of the shared `rsyncd.conf` shipped in the
/// asset archive.
///
/// # Errors
///
/// Any validation error aborts compilation; no partial plan is returned.
pub fn compile_plan(config: &BackupConfig, template: &str) -> Result<BootstrapPlan> {
    let (settings, assignments) = check_config(config)?;
    debug!(
        "Allocated {} device(s) from /dev/sd{}",
        assignments.len(),
        settings.device_base
    );

    let steps = provision_steps(Vec::new(), &settings);

    let (steps, access, configs) = assignments.iter().fold(
        (steps, Vec::new(), Vec::new()),
        |(steps, mut access, mut configs), assignment| {
            let entry = access_entry(assignment);
            let rendered = render_config(template, &assignment.module);
            let steps = module_steps(steps, assignment, &rendered, &entry);
            access.push(entry);
            configs.push(rendered);
            (steps, access, configs)
        },
    );

    let steps = environment_steps(steps, &settings);
    let steps = cleanup_steps(steps);

    info!(
        "Compiled bootstrap plan: {} module(s), {} step(s)",
        assignments.len(),
        steps.len()
    );

    Ok(BootstrapPlan {
        steps,
        assignments,
        access,
        configs,
        settings,
    })
}

// ============================================================================
// Phases
// ============================================================================

/// Packages, asset download, extraction, executable install
fn provision_steps(mut steps: Vec<BootstrapStep>, settings: &PlanSettings) -> Vec<BootstrapStep> {
    if !settings.packages.is_empty() {
        steps.push(BootstrapStep::InstallPackages {
            packages: settings.packages.clone(),
        });
    }

    let archive = settings.archive_path();
    steps.push(BootstrapStep::FetchAsset {
        bucket: settings.asset.bucket.clone(),
        key: settings.asset.key.clone(),
        dest: archive.clone(),
    });
    steps.push(BootstrapStep::Extract {
        archive: archive.clone(),
        dest: PathBuf::from(INSTALL_DIR),
    });
    steps.push(BootstrapStep::RemoveFile { path: archive });
    steps.push(BootstrapStep::MoveFile {
        from: PathBuf::from(ARCHIVE_SCRIPT_PATH),
        to: PathBuf::from(EXECUTABLE_PATH),
    });
    steps
}

/// Config, module environment, then access for one module
fn module_steps(
    mut steps: Vec<BootstrapStep>,
    assignment: &DeviceAssignment,
    rendered: &RenderedConfig,
    entry: &AccessControlEntry,
) -> Vec<BootstrapStep> {
    let module = &assignment.module;

    steps.push(BootstrapStep::WriteFile {
        path: rendered.path(),
        content: rendered.body.clone(),
        mode: Some(FILE_MODE),
    });

    let mut env = vec![
        format!("VOLUME_SIZE={}", module.size),
        format!("DEVICE={}", assignment.device_path().display()),
    ];
    env.extend(override_lines(module));
    steps.push(BootstrapStep::WriteFile {
        path: module_env_path(&module.name),
        content: join_lines(&env),
        mode: Some(FILE_MODE),
    });

    steps.push(match entry {
        AccessControlEntry::Append { .. } => BootstrapStep::AppendLines {
            path: PathBuf::from(AUTHORIZED_KEYS_PATH),
            lines: entry.line().into_iter().collect(),
        },
        AccessControlEntry::ReplaceDefault { command } => BootstrapStep::ReplaceForcedCommand {
            path: PathBuf::from(AUTHORIZED_KEYS_PATH),
            command: command.clone(),
        },
    });

    steps
}

/// Global settings, written where the configured variant expects them
fn environment_steps(mut steps: Vec<BootstrapStep>, settings: &PlanSettings) -> Vec<BootstrapStep> {
    let lines = settings.env_lines();
    steps.push(match settings.env_target {
        EnvTarget::EnvironmentFile => BootstrapStep::WriteFile {
            path: PathBuf::from(ENV_FILE_PATH),
            content: join_lines(&lines),
            mode: Some(FILE_MODE),
        },
        EnvTarget::Executable => BootstrapStep::AppendLines {
            path: PathBuf::from(EXECUTABLE_PATH),
            lines,
        },
    });
    steps
}

/// The template is removed only after every module copy exists
fn cleanup_steps(mut steps: Vec<BootstrapStep>) -> Vec<BootstrapStep> {
    steps.push(BootstrapStep::RemoveFile {
        path: PathBuf::from(TEMPLATE_PATH),
    });
    steps
}

// ============================================================================
// Helpers
// ============================================================================

/// `/srv/rsync-backup/rsync-backup.<module>.sh`
pub fn module_env_path(module: &str) -> PathBuf {
    PathBuf::from(format!("{}/rsync-backup.{}.sh", INSTALL_DIR, module))
}

fn join_lines(lines: &[String]) -> String {
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

/// S3 naming rules: 3-63 chars of `a-z 0-9 . -`, alphanumeric at both ends.
fn check_bucket_name(setting: &str, name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    let valid_ends = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());

    if (3..=63).contains(&name.len()) && valid_chars && valid_ends {
        Ok(())
    } else {
        Err(BootstrapError::setting(
            setting,
            name,
            "bucket names are 3-63 characters of a-z, 0-9, '.' and '-'",
        ))
    }
}

/// Relative object key without `..` segments, safe to use as a path under /tmp
fn check_asset_key(key: &str) -> Result<()> {
    let valid_chars = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_.-/".contains(c));
    let valid_segments = key
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    if valid_chars && valid_segments {
        Ok(())
    } else {
        Err(BootstrapError::setting(
            "asset.key",
            key,
            "must be a relative key of letters, digits, '_', '.', '-' and '/'",
        ))
    }
}

fn check_package_name(name: &str) -> Result<()> {
    let valid = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+.-".contains(c));
    if valid {
        Ok(())
    } else {
        Err(BootstrapError::setting(
            "packages",
            name,
            "package names are lowercase letters, digits, '+', '.' and '-'",
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::RawModule;

    const TEMPLATE: &str = "[@host@]\n    path = /mnt/@host@\n";

    fn test_config() -> BackupConfig {
        BackupConfig::new(
            "backup-logs",
            AssetSource {
                bucket: "cdk-assets".to_string(),
                key: "abc123.zip".to_string(),
            },
        )
    }

    fn with_db(config: BackupConfig) -> BackupConfig {
        config.with_modules(vec![RawModule::new("db", "ssh-ed25519 AAAAC3Nz x", 50)])
    }

    fn position(plan: &BootstrapPlan, pred: impl Fn(&BootstrapStep) -> bool) -> usize {
        plan.steps.iter().position(pred).expect("step present") // test: known-good input
    }

    #[test]
    fn test_provisioning_order() {
        let plan = compile_plan(&with_db(test_config()), TEMPLATE).expect("plan");

        assert!(matches!(&plan.steps[0], BootstrapStep::InstallPackages { .. }));
        assert!(matches!(&plan.steps[1], BootstrapStep::FetchAsset { .. }));
        assert!(matches!(&plan.steps[2], BootstrapStep::Extract { .. }));
        assert!(matches!(
            &plan.steps[3],
            BootstrapStep::RemoveFile { path } if path == &PathBuf::from("/tmp/abc123.zip")
        ));
        assert!(matches!(&plan.steps[4], BootstrapStep::MoveFile { .. }));
    }

    #[test]
    fn test_cleanup_is_last() {
        let plan = compile_plan(&with_db(test_config()), TEMPLATE).expect("plan");
        assert_eq!(
            plan.steps.last(),
            Some(&BootstrapStep::RemoveFile {
                path: PathBuf::from(TEMPLATE_PATH)
            })
        );
    }

    #[test]
    fn test_module_steps_internally_ordered() {
        let plan = compile_plan(&with_db(test_config()), TEMPLATE).expect("plan");

        let config_idx = position(&plan, |s| {
            s.target() == Some(Path::new("/srv/rsync-backup/rsyncd.db.conf"))
        });
        let env_idx = position(&plan, |s| {
            s.target() == Some(Path::new("/srv/rsync-backup/rsync-backup.db.sh"))
        });
        let access_idx = position(&plan, |s| matches!(s, BootstrapStep::AppendLines { path, .. } if path == Path::new(AUTHORIZED_KEYS_PATH)));
        let extract_idx = position(&plan, |s| matches!(s, BootstrapStep::Extract { .. }));

        assert!(extract_idx < config_idx);
        assert!(config_idx < env_idx);
        assert!(env_idx < access_idx);
    }

    #[test]
    fn test_module_env_file_contents() {
        let mut config = test_config();
        let mut module = RawModule::new("db", "ssh-ed25519 AAAA x", 50);
        module.file_system = Some("xfs".to_string());
        config = config.with_modules(vec![module]);

        let plan = compile_plan(&config, TEMPLATE).expect("plan");
        let content = plan
            .steps
            .iter()
            .find_map(|s| match s {
                BootstrapStep::WriteFile { path, content, .. }
                    if path == &module_env_path("db") =>
                {
                    Some(content.clone())
                }
                _ => None,
            })
            .expect("module env written");
        assert_eq!(content, "VOLUME_SIZE=50\nDEVICE=/dev/sdf\nFILE_SYSTEM=xfs\n");
    }

    #[test]
    fn test_default_module_replaces_forced_command() {
        let plan = compile_plan(&test_config(), TEMPLATE).expect("plan");

        assert!(plan.uses_default_module());
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].module.name, "backup");
        assert_eq!(plan.assignments[0].module.size, 100);
        assert_eq!(plan.assignments[0].letter.as_char(), 'f');

        let replacements = plan
            .steps
            .iter()
            .filter(|s| matches!(s, BootstrapStep::ReplaceForcedCommand { .. }))
            .count();
        assert_eq!(replacements, 1);
        assert!(!plan
            .steps
            .iter()
            .any(|s| matches!(s, BootstrapStep::AppendLines { path, .. } if path == Path::new(AUTHORIZED_KEYS_PATH))));
    }

    #[test]
    fn test_env_target_environment_file() {
        let plan = compile_plan(&with_db(test_config()), TEMPLATE).expect("plan");
        let env_step = &plan.steps[plan.steps.len() - 2];
        assert_eq!(
            env_step,
            &BootstrapStep::WriteFile {
                path: PathBuf::from(ENV_FILE_PATH),
                content: "MAX_SNAPSHOTS=15\nS3_LOGS_BUCKET=backup-logs\nFILE_SYSTEM=\nMOUNT_OPTS=\"\"\n"
                    .to_string(),
                mode: Some(0o644),
            }
        );
    }

    #[test]
    fn test_env_target_executable() {
        let mut config = with_db(test_config());
        config.env_target = EnvTarget::Executable;
        config.file_system = Some("btrfs".to_string());

        let plan = compile_plan(&config, TEMPLATE).expect("plan");
        let env_step = &plan.steps[plan.steps.len() - 2];
        match env_step {
            BootstrapStep::AppendLines { path, lines } => {
                assert_eq!(path, &PathBuf::from(EXECUTABLE_PATH));
                assert!(lines.contains(&"FILE_SYSTEM=btrfs".to_string()));
            }
            other => panic!("unexpected step {}", other),
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = test_config();
        config.logs_bucket = "Logs Bucket".to_string();
        assert!(matches!(
            compile_plan(&config, TEMPLATE),
            Err(BootstrapError::InvalidSetting { .. })
        ));

        let mut config = test_config();
        config.asset.key = "../etc/passwd".to_string();
        assert!(compile_plan(&config, TEMPLATE).is_err());

        let mut config = test_config();
        config.packages.push("rsync; reboot".to_string());
        assert!(compile_plan(&config, TEMPLATE).is_err());

        let mut config = test_config();
        config.device_base = 'Z';
        assert!(compile_plan(&config, TEMPLATE).is_err());
    }

    #[test]
    fn test_deterministic() {
        let config = with_db(test_config());
        let first = compile_plan(&config, TEMPLATE).expect("plan");
        let second = compile_plan(&config, TEMPLATE).expect("plan");
        assert_eq!(first, second);
        assert_eq!(first.summary(), second.summary());
    }

    #[test]
    fn test_summary_mentions_modules() {
        let plan = compile_plan(&with_db(test_config()), TEMPLATE).expect("plan");
        let summary = plan.summary();
        assert!(summary.contains("Module db (50 GB) on /dev/sdf"));
        assert!(summary.contains("command=\"rsync-backup db 50 /dev/sdf\""));
        assert!(!summary.contains("Default module"));
        assert!(summary.contains("    /srv/rsync-backup/rsyncd.db.conf"));
    }

    #[test]
    fn test_summary_flags_default_module() {
        let plan = compile_plan(&test_config(), TEMPLATE).expect("plan");
        assert!(plan.summary().contains("Default module: rewrites the instance key's forced command"));
    }

    #[test]
    fn test_touched_files_are_distinct() {
        let plan = compile_plan(&with_db(test_config()), TEMPLATE).expect("plan");
        let touched = plan.touched_files();

        let keys = touched
            .iter()
            .filter(|p| p.ends_with("authorized_keys"))
            .count();
        assert_eq!(keys, 1);
        assert_eq!(touched.first(), Some(&Path::new("/tmp/abc123.zip")));
        for (i, path) in touched.iter().enumerate() {
            assert!(!touched[i + 1..].contains(path), "{} listed twice", path.display());
        }
    }
}
