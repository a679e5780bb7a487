//! Process plumbing shared by QueryKit binaries: layered configuration and
//! logging setup.

pub mod config;
pub mod logging;

pub use config::{default_logging_config, AppConfig, CliArgs, LogSection, LoggingConfig};
pub use logging::{init_default_logging, init_logging_from_config};
