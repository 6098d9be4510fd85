//! Inline shell user data.
//!
//! Renders the plan as a bash script run once by the image's first-boot
//! agent. Commands appear one per line in plan order; file writes become a
//! `printf` of the single-quoted content followed by `chmod` when a mode is
//! set.

use crate::engine::actions::{quote, Action};
use crate::engine::bootstrap::BootstrapPlan;
use crate::error::Result;
use crate::sinks::PlanSink;

/// Shell user-data renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct UserDataSink;

impl PlanSink for UserDataSink {
    fn name(&self) -> &'static str {
        "user-data"
    }

    fn render(&self, plan: &BootstrapPlan) -> Result<String> {
        let mut script = String::from("#!/bin/bash\n");
        for action in plan.actions() {
            match action {
                Action::RunCommand { command } => {
                    script.push_str(&command);
                    script.push('\n');
                }
                Action::WriteFile {
                    path,
                    content,
                    mode,
                } => {
                    let path = quote(&path.display().to_string());
                    script.push_str(&format!("printf '%s' {} > {}\n", quote(&content), path));
                    if let Some(mode) = mode {
                        script.push_str(&format!("chmod {:o} {}\n", mode, path));
                    }
                }
            }
        }
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_file::{AssetSource, BackupConfig, RawModule};
    use crate::engine::bootstrap::compile_plan;

    fn config() -> BackupConfig {
        BackupConfig::new(
            "logs-bucket",
            AssetSource {
                bucket: "assets".to_string(),
                key: "bundle.zip".to_string(),
            },
        )
    }

    #[test]
    fn test_script_layout() {
        let plan = compile_plan(
            &config().with_modules(vec![RawModule::new("db", "ssh-ed25519 AAAA x", 50)]),
            "[@host@]\n",
        )
        .expect("plan");
        let script = UserDataSink.render(&plan).expect("render");
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "#!/bin/bash");
        assert_eq!(lines[1], "apt-get update");
        assert_eq!(lines[2], "apt-get install -y awscli unzip");
        assert_eq!(lines[3], "mkdir -p /tmp");
        assert_eq!(lines[4], "aws s3 cp s3://assets/bundle.zip /tmp/bundle.zip");
        assert_eq!(lines[5], "unzip -o /tmp/bundle.zip -d /srv/rsync-backup");
        assert_eq!(
            lines[lines.len() - 1],
            "rm -f /srv/rsync-backup/rsyncd.conf"
        );
        assert!(script.contains("printf '%s' '[db]\n' > /srv/rsync-backup/rsyncd.db.conf\n"));
        assert!(script.contains("chmod 644 /srv/rsync-backup/rsyncd.db.conf\n"));
    }

    #[test]
    fn test_single_command_clause() {
        let plan = compile_plan(
            &config().with_modules(vec![RawModule::new("db", "ssh-ed25519 AAAAC3Nz x", 50)]),
            "[@host@]\n",
        )
        .expect("plan");
        let script = UserDataSink.render(&plan).expect("render");

        assert_eq!(script.matches("command=").count(), 1);
        assert!(script.contains("command=\"rsync-backup db 50 /dev/sdf\""));
    }

    #[test]
    fn test_default_module_uses_sed() {
        let plan = compile_plan(&config(), "[@host@]\n").expect("plan");
        let script = UserDataSink.render(&plan).expect("render");

        assert!(script.contains(
            "sed -i '/command=\"rsync-backup /!s|command=\".*\" |command=\"rsync-backup backup 100 /dev/sdf\" |' /root/.ssh/authorized_keys"
        ));
        assert!(!script.contains(">> /root/.ssh/authorized_keys"));
    }
}
