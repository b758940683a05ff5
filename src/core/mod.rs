// src/core/mod.rs

//! Platform-independent domain logic: the error taxonomy, approval policy, history ring,
//! output bounding, built-in parsing, settings, and the session registry.

pub mod approval;
pub mod builtins;
pub mod config_loader;
pub mod errors;
pub mod history;
pub mod output;
pub mod session_manager;
