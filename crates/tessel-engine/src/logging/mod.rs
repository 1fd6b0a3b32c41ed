//! Logging setup.
//!
//! The engine logs through the `log` facade only. Binaries call [`init_logging`]
//! to install `env_logger`.

mod init;

pub use init::{init_logging, LoggingConfig};
