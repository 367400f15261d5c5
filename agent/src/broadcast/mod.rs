//! Live dashboard updates

pub mod hub;
pub mod notifier;
pub mod protocol;
