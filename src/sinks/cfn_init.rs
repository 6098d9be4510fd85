//! Declarative init document.
//!
//! Renders the plan as CloudFormation-Init style metadata. Within a single
//! config the init agent processes files before commands, which would break
//! plan order, so every action becomes its own config (`step000`,
//! `step001`, ...) and one config set lists them in order. Configs in a set
//! run strictly one after another.
//!
//! ```json
//! {
//!   "configSets": { "default": ["step000", "step001"] },
//!   "step000": { "commands": { "step000": { "command": "apt-get update" } } },
//!   "step001": { "files": { "/srv/x": { "content": "...", "mode": "000644",
//!                                       "owner": "root", "group": "root" } } }
//! }
//! ```

use serde_json::{json, Map, Value};

use crate::engine::actions::Action;
use crate::engine::bootstrap::BootstrapPlan;
use crate::error::Result;
use crate::sinks::PlanSink;

/// Declarative init renderer
#[derive(Debug, Clone)]
pub struct CfnInitSink {
    /// Name of the config set the agent is told to run
    pub config_set: String,
    /// Owner and group of written files
    pub owner: String,
}

impl Default for CfnInitSink {
    fn default() -> Self {
        Self {
            config_set: "default".to_string(),
            owner: "root".to_string(),
        }
    }
}

impl CfnInitSink {
    /// Build the document as a JSON value.
    pub fn document(&self, plan: &BootstrapPlan) -> Value {
        let actions = plan.actions();
        let width = actions.len().to_string().len().max(3);

        let mut root = Map::new();
        let mut order = Vec::with_capacity(actions.len());

        for (i, action) in actions.into_iter().enumerate() {
            let step = format!("step{:0width$}", i, width = width);
            let config = match action {
                Action::RunCommand { command } => json!({
                    "commands": { step.clone(): { "command": command } }
                }),
                Action::WriteFile {
                    path,
                    content,
                    mode,
                } => {
                    let mut file = Map::new();
                    file.insert("content".to_string(), Value::String(content));
                    if let Some(mode) = mode {
                        file.insert("mode".to_string(), Value::String(format!("{:06o}", mode)));
                    }
                    file.insert("owner".to_string(), Value::String(self.owner.clone()));
                    file.insert("group".to_string(), Value::String(self.owner.clone()));
                    json!({ "files": { path.display().to_string(): file } })
                }
            };
            root.insert(step.clone(), config);
            order.push(Value::String(step));
        }

        root.insert(
            "configSets".to_string(),
            json!({ self.config_set.clone(): order }),
        );
        Value::Object(root)
    }
}

impl PlanSink for CfnInitSink {
    fn name(&self) -> &'static str {
        "cfn-init"
    }

    fn render(&self, plan: &BootstrapPlan) -> Result<String> {
        let mut out = serde_json::to_string_pretty(&self.document(plan))?;
        out.push('\n');
        Ok(out)
    }
}
