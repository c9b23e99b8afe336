//! docqa-core
//!
//! Domain types, error taxonomy, service traits, configuration and the
//! chunker shared by every other crate in the workspace.

pub mod chunker;
pub mod config;
pub mod conversation;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
