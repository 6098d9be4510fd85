//! Lowering of typed plan steps into machine primitives.
//!
//! The machine collaborator only understands two things: write a file, and
//! run a shell command. This is the one place where plan values are turned
//! into shell text, and every interpolated value goes through [`quote`].

use std::path::{Path, PathBuf};

use crate::engine::access::ENTRY_POINT;
use crate::engine::bootstrap::{BootstrapPlan, BootstrapStep};

/// A primitive the provisioning layer can execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    WriteFile {
        path: PathBuf,
        content: String,
        mode: Option<u32>,
    },
    RunCommand { command: String },
}

impl Action {
    fn run(command: impl Into<String>) -> Self {
        Self::RunCommand {
            command: command.into(),
        }
    }
}

impl BootstrapStep {
    /// Lower this step into one or more primitives.
    pub fn lower(&self) -> Vec<Action> {
        match self {
            Self::InstallPackages { packages } => {
                let names: Vec<String> = packages.iter().map(|p| quote(p)).collect();
                vec![
                    Action::run("apt-get update"),
                    Action::run(format!("apt-get install -y {}", names.join(" "))),
                ]
            }
            Self::FetchAsset { bucket, key, dest } => {
                let parent = dest.parent().unwrap_or(Path::new("/"));
                vec![
                    Action::run(format!("mkdir -p {}", quote_path(parent))),
                    Action::run(format!(
                        "aws s3 cp {} {}",
                        quote(&format!("s3://{}/{}", bucket, key)),
                        quote_path(dest)
                    )),
                ]
            }
            Self::Extract { archive, dest } => vec![Action::run(format!(
                "unzip -o {} -d {}",
                quote_path(archive),
                quote_path(dest)
            ))],
            Self::RemoveFile { path } => vec![Action::run(format!("rm -f {}", quote_path(path)))],
            Self::MoveFile { from, to } => vec![Action::run(format!(
                "mv {} {}",
                quote_path(from),
                quote_path(to)
            ))],
            Self::WriteFile {
                path,
                content,
                mode,
            } => vec![Action::WriteFile {
                path: path.clone(),
                content: content.clone(),
                mode: *mode,
            }],
            Self::AppendLines { path, lines } => lines
                .iter()
                .map(|line| {
                    Action::run(format!(
                        "printf '%s\\n' {} >> {}",
                        quote(line),
                        quote_path(path)
                    ))
                })
                .collect(),
            Self::ReplaceForcedCommand { path, command } => {
                // Lines already bound to the entry point are left alone so a
                // re-run cannot rewrite module keys.
                let script = format!(
                    "/command=\"{} /!s|command=\".*\" |{} |",
                    ENTRY_POINT,
                    command.clause()
                );
                vec![Action::run(format!(
                    "sed -i {} {}",
                    quote(&script),
                    quote_path(path)
                ))]
            }
        }
    }
}

impl BootstrapPlan {
    /// The whole plan as primitives, in execution order
    pub fn actions(&self) -> Vec<Action> {
        self.steps.iter().flat_map(BootstrapStep::lower).collect()
    }
}

/// Quote a value for a POSIX shell.
///
/// Values made only of characters with no shell meaning are returned as-is;
/// anything else is wrapped in single quotes with embedded quotes escaped.
pub fn quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

fn quote_path(path: &Path) -> String {
    quote(&path.display().to_string())
}
