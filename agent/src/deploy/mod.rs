//! Deployment module

pub mod coordinator;
pub mod executor;
pub mod fsm;
pub mod pipeline;
