//! CLI command implementation

pub mod error;
pub mod fetch;

pub use error::{exit_code, PERMISSION_DENIED_EXIT_STATUS};
pub use fetch::{Cli, SourceType};
