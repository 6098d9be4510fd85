//! Type-safe configuration choices for the bootstrap compiler
//!
//! Variant differences between deployments (how the plan is delivered to the
//! machine, where global settings are written) are modelled as enums rather
//! than strings so every consumer matches them exhaustively.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// How the compiled plan is delivered to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    /// Inline shell script passed as instance user data
    #[default]
    #[strum(serialize = "user-data")]
    UserData,
    /// Declarative init document (one config per action, ordered config set)
    #[strum(serialize = "cfn-init")]
    CfnInit,
}

/// Where the global environment settings end up on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
pub enum EnvTarget {
    /// A dedicated environment file sourced by the backup script
    #[default]
    #[strum(serialize = "environment-file")]
    EnvironmentFile,
    /// Lines appended to the installed backup executable
    #[strum(serialize = "executable")]
    Executable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_sink_kind_parse() {
        assert_eq!("user-data".parse::<SinkKind>().ok(), Some(SinkKind::UserData));
        assert_eq!("cfn-init".parse::<SinkKind>().ok(), Some(SinkKind::CfnInit));
        assert!("cloud-config".parse::<SinkKind>().is_err());
    }

    #[test]
    fn test_serde_matches_strum() {
        for target in EnvTarget::iter() {
            let json = serde_json::to_string(&target).expect("serialize");
            assert_eq!(json, format!("\"{}\"", target));
        }
        for sink in SinkKind::iter() {
            let json = serde_json::to_string(&sink).expect("serialize");
            assert_eq!(json, format!("\"{}\"", sink));
        }
    }
}
