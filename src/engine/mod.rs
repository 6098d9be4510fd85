//! Engine modules: the compiler that translates backup declarations into a
//! bootstrap plan.
//!
//! The engine sits between configuration (which modules the caller wants) and
//! delivery (how the plan reaches the machine). It allocates devices, builds
//! access entries and configs, and orders them into one validated plan.

pub mod access;
pub mod actions;
pub mod bootstrap;
pub mod devices;
pub mod rsyncd;
