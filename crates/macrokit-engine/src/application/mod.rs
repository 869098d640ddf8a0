//! Application-layer coordinators.
//!
//! Capture and execution each get one coordinator.  Coordinators own
//! session state, depend only on trait seams, and report everything
//! observable through the event bus.

pub mod capture;
pub mod execution;
