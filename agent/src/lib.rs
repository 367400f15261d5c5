//! shipd library
//!
//! Push-to-deploy agent for a single service: webhook pushes are turned into
//! deployment records, built one at a time, and streamed to dashboard clients.

pub mod app;
pub mod broadcast;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
