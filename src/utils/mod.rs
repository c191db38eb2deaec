//! Logging setup and config validation.
pub mod logging;
pub mod validation;

pub use logging::LoggingConfig;
pub use validation::ConfigValidator;
