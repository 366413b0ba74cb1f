//! Command implementations
//!
//! Each command is a module with an execute function that takes parsed CLI args
//! and executes the operation against the database or a running hub.

pub mod bookmark;
pub mod config;
pub mod history;
pub mod open;

pub use bookmark::execute as bookmark;
pub use config::execute as config;
pub use history::execute as history;
pub use open::execute as open;
