//! SSH forced-command authorization.
//!
//! Every module key is installed in root's `authorized_keys` behind a
//! `command="..."` restriction, so the key can only ever run the backup entry
//! point for its own module, size and device. The synthesized default module
//! has no key of its own: it takes over the instance key pair, whose existing
//! forced command (the image's "please log in as ubuntu" stub) is rewritten in
//! place instead of appending a second line for the same key.

use std::fmt;
use std::path::PathBuf;

use crate::engine::devices::DeviceAssignment;
use crate::modules::is_safe_identifier;

/// root's authorized keys file on the appliance
pub const AUTHORIZED_KEYS_PATH: &str = "/root/.ssh/authorized_keys";

/// Backup entry point invoked by every forced command
pub const ENTRY_POINT: &str = "rsync-backup";

/// Restrictions applied to every module key
pub const KEY_OPTIONS: &str = "no-port-forwarding,no-agent-forwarding,no-X11-forwarding";

/// The command a module key is pinned to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedCommand {
    pub module: String,
    pub size: u32,
    pub device: PathBuf,
}

impl fmt::Display for ForcedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            ENTRY_POINT,
            self.module,
            self.size,
            self.device.display()
        )
    }
}

impl ForcedCommand {
    /// The `command="..."` clause as it appears in `authorized_keys`
    pub fn clause(&self) -> String {
        format!("command=\"{}\"", self)
    }
}

/// How a module's access is granted on the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessControlEntry {
    /// Append a restricted line for the module's own key
    Append {
        command: ForcedCommand,
        ssh_key: String,
    },
    /// Rewrite the forced command already attached to the instance key pair
    ReplaceDefault { command: ForcedCommand },
}

impl AccessControlEntry {
    pub fn command(&self) -> &ForcedCommand {
        match self {
            Self::Append { command, .. } | Self::ReplaceDefault { command } => command,
        }
    }

    /// Full `authorized_keys` line for appended entries
    pub fn line(&self) -> Option<String> {
        match self {
            Self::Append { command, ssh_key } => {
                Some(format!("{},{} {}", KEY_OPTIONS, command.clause(), ssh_key))
            }
            Self::ReplaceDefault { .. } => None,
        }
    }
}

/// Build the access entry for one allocated module.
pub fn access_entry(assignment: &DeviceAssignment) -> AccessControlEntry {
    let module = &assignment.module;
    let command = ForcedCommand {
        module: module.name.clone(),
        size: module.size,
        device: assignment.device_path(),
    };

    match &module.ssh_key {
        Some(key) => AccessControlEntry::Append {
            command,
            ssh_key: key.clone(),
        },
        None => AccessControlEntry::ReplaceDefault { command },
    }
}

/// Parse an `authorized_keys` line produced by [`AccessControlEntry::line`].
///
/// Returns the forced command only when the line carries the standard
/// restrictions, exactly one `command=` clause, and that clause runs the
/// entry point with a safe module name, a positive size and a `/dev/sd?`
/// device. Anything else yields `None`.
pub fn parse_line(line: &str) -> Option<ForcedCommand> {
    if line.matches("command=").count() != 1 {
        return None;
    }

    let rest = line.strip_prefix(KEY_OPTIONS)?.strip_prefix(",command=\"")?;
    let (command, _key) = rest.split_once("\" ")?;

    let mut parts = command.split(' ');
    let entry = parts.next()?;
    let module = parts.next()?;
    let size = parts.next()?;
    let device = parts.next()?;
    if parts.next().is_some() || entry != ENTRY_POINT || !is_safe_identifier(module) {
        return None;
    }

    let size: u32 = size.parse().ok().filter(|s| *s > 0)?;
    let letter = device.strip_prefix("/dev/sd")?;
    if letter.len() != 1 || !letter.chars().all(|c| c.is_ascii_lowercase()) {
        return None;
    }

    Some(ForcedCommand {
        module: module.to_string(),
        size,
        device: PathBuf::from(device),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::devices::DeviceLetter;
    use crate::modules::ModuleSpec;

    fn assignment(name: &str, key: Option<&str>, size: u32, letter: char) -> DeviceAssignment {
        DeviceAssignment {
            module: ModuleSpec {
                name: name.to_string(),
                ssh_key: key.map(str::to_string),
                size,
                file_system: None,
                mount_options: None,
            },
            letter: DeviceLetter::new(letter).expect("letter"),
        }
    }

    #[test]
    fn test_module_line_binds_name_size_device() {
        let entry = access_entry(&assignment("db", Some("ssh-ed25519 AAAAC3Nz x"), 50, 'f'));
        let line = entry.line().expect("append entry has a line");

        assert_eq!(
            line,
            "no-port-forwarding,no-agent-forwarding,no-X11-forwarding,\
             command=\"rsync-backup db 50 /dev/sdf\" ssh-ed25519 AAAAC3Nz x"
        );
        assert_eq!(line.matches("command=").count(), 1);
    }

    #[test]
    fn test_default_module_replaces() {
        let entry = access_entry(&assignment("backup", None, 100, 'f'));
        assert!(entry.line().is_none());
        assert_eq!(
            entry.command().clause(),
            "command=\"rsync-backup backup 100 /dev/sdf\""
        );
    }

    #[test]
    fn test_parse_line_accepts_generated_lines() {
        let entry = access_entry(&assignment("web_2", Some("ssh-rsa BBBB c@d"), 7, 'z'));
        let line = entry.line().expect("line");
        assert_eq!(parse_line(&line).as_ref(), Some(entry.command()));
    }

    #[test]
    fn test_parse_line_rejects_tampered_lines() {
        let bad = [
            // second command clause smuggled into the key comment
            "no-port-forwarding,no-agent-forwarding,no-X11-forwarding,command=\"rsync-backup db 1 /dev/sdf\" ssh-rsa A command=\"sh\"",
            // missing restrictions
            "command=\"rsync-backup db 1 /dev/sdf\" ssh-rsa A",
            // extra argument
            "no-port-forwarding,no-agent-forwarding,no-X11-forwarding,command=\"rsync-backup db 1 /dev/sdf; sh\" ssh-rsa A",
            // wrong entry point
            "no-port-forwarding,no-agent-forwarding,no-X11-forwarding,command=\"bash db 1 /dev/sdf\" ssh-rsa A",
            // zero size
            "no-port-forwarding,no-agent-forwarding,no-X11-forwarding,command=\"rsync-backup db 0 /dev/sdf\" ssh-rsa A",
            // not a /dev/sd? device
            "no-port-forwarding,no-agent-forwarding,no-X11-forwarding,command=\"rsync-backup db 1 /dev/nvme0\" ssh-rsa A",
        ];
        for line in bad {
            assert!(parse_line(line).is_none(), "should reject: {}", line);
        }
    }
}
