//! runwarden core - platform-independent abstractions and configuration
//!
//! This crate provides the program descriptors, configuration loader, event
//! model, error types and process traits shared by the platform crates and
//! the supervisor.

mod config;
mod descriptor;
mod error;
mod event;
mod process;
mod resolver;

pub use config::*;
pub use descriptor::*;
pub use error::*;
pub use event::*;
pub use process::*;
pub use resolver::*;
