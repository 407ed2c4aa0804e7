#![forbid(unsafe_code)]

//! `cellar`: launch and supervise Roblox Player and Studio under Wine.

#[cfg(not(unix))]
compile_error!("cellar supervises Wine processes and only builds on Unix hosts");

pub mod config;
pub mod cpu;
pub mod dirs;
pub mod errors;
pub mod integrations;
pub mod launcher;
pub mod models;
pub mod orchestrator;
pub mod sandbox;
pub mod state;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
