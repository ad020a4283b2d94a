//! Recurring automation over open CAPAs

pub mod metrics;
pub mod sweeper;
