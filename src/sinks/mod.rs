//! Plan delivery formats.
//!
//! This module provides the `PlanSink` trait for rendering a compiled
//! `BootstrapPlan` into the text a machine consumes at first boot. The
//! compiler never knows which delivery mechanism is used; deployments pick a
//! sink through `SinkKind`.
//!
//! # Contract
//!
//! - `render()` consumes the plan's primitives (`BootstrapPlan::actions`) in
//!   order and must preserve that order on the machine.
//! - Output is a pure function of the plan: rendering twice yields the same
//!   bytes.

pub mod cfn_init;
pub mod user_data;

use crate::engine::bootstrap::BootstrapPlan;
use crate::error::Result;
use crate::types::SinkKind;

pub use cfn_init::CfnInitSink;
pub use user_data::UserDataSink;

/// A renderer for compiled plans.
pub trait PlanSink {
    /// Short name used in logs (e.g. "user-data").
    fn name(&self) -> &'static str;

    /// Render the plan into the sink's document format.
    fn render(&self, plan: &BootstrapPlan) -> Result<String>;
}

/// Sink implementation for a configured kind
pub fn sink_for(kind: SinkKind) -> Box<dyn PlanSink> {
    match kind {
        SinkKind::UserData => Box::new(UserDataSink),
        SinkKind::CfnInit => Box::new(CfnInitSink::default()),
    }
}

/// Render `plan` with the sink selected by `kind`.
pub fn render_plan(plan: &BootstrapPlan, kind: SinkKind) -> Result<String> {
    let sink = sink_for(kind);
    tracing::debug!("Rendering {} steps with {} sink", plan.steps.len(), sink.name());
    sink.render(plan)
}
