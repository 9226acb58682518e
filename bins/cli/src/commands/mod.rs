//! Command handlers.

pub mod clear;
pub mod config;
pub mod index;
pub mod search;
pub mod watch;

pub use clear::run_clear;
pub use config::run_config;
pub use index::run_index;
pub use search::{SearchArgs, run_search};
pub use watch::run_watch;
