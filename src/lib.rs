//! rsync-backup bootstrap compiler
//!
//! Compiles a list of backup-module declarations into the ordered first-boot
//! plan of an rsync-over-SSH backup appliance: one device, one rsyncd config
//! and one forced-command SSH key per module.

pub mod cli;
pub mod config_file;
pub mod engine;
pub mod error;
pub mod modules;
pub mod sinks;
pub mod types;

// Re-export main types for convenience
pub use config_file::{AssetSource, BackupConfig, RawModule};
pub use error::BootstrapError;
pub use modules::{validate_max_snapshots, validate_modules, ModuleSpec};
pub use types::{EnvTarget, SinkKind};

// Compiler engine
pub use engine::access::{parse_line, AccessControlEntry, ForcedCommand};
pub use engine::actions::Action;
pub use engine::bootstrap::{check_config, compile_plan, BootstrapPlan, BootstrapStep, PlanSettings};
pub use engine::devices::{allocate_devices, DeviceAssignment, DeviceLetter};
pub use engine::rsyncd::{render_config, RenderedConfig};

// Delivery formats
pub use sinks::{render_plan, sink_for, CfnInitSink, PlanSink, UserDataSink};
