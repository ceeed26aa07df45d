//! Server module for deckhand
//!
//! Contains the main server initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all server components
//! - `loader`: Configuration loading from files and environment
//! - `state`: Shared state handed to every handler
//! - `init`: Main server initialization and run loop

pub mod config;
mod init;
mod loader;
mod state;

// Re-export public API
pub use init::run;
pub use loader::load_config;
pub use state::AppState;
