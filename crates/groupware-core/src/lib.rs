//! # groupware-core
//!
//! Core crate for the groupware extension engine. Contains the
//! configuration schemas, the engine event types, the logging
//! bootstrap, and the unified error system.
//!
//! This crate has **no** internal dependencies on other groupware
//! crates.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod result;

pub use error::EngineError;
pub use result::EngineResult;
