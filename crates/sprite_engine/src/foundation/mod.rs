//! Foundation utilities shared by every engine layer
//!
//! - plane math and transform helpers
//! - slot allocation and slotmap re-exports
//! - the frame clock with load pause brackets
//! - logger setup and script failure reporting

pub mod collections;
pub mod logging;
pub mod math;
pub mod time;
