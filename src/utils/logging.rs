use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EnvConfig;

pub struct LoggingConfig;

impl LoggingConfig {
    /// Installs the global subscriber. `RUST_LOG` picks the filter and
    /// `TOOLFLOW_DEBUG` turns on debug output. Only the first call has an
    /// effect.
    ///
    /// ```no_run
    /// use toolflow::utils::LoggingConfig;
    ///
    /// LoggingConfig::init();
    /// tracing::info!("ready");
    /// ```
    pub fn init() {
        let is_debug = Self::is_debug();

        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => {
                if is_debug {
                    EnvFilter::new("toolflow=debug,info")
                } else {
                    EnvFilter::new("toolflow=info,warn")
                }
            }
        };

        // stdout carries the event stream
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(is_debug)
            .with_file(is_debug)
            .with_line_number(is_debug)
            .with_thread_ids(is_debug);

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok();

        if installed && is_debug {
            tracing::debug!("debug logging enabled");
        }
    }

    /// Same as `init`, with an explicit filter.
    pub fn init_with_filter(filter: &str) {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(filter))
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
    }

    pub fn is_debug() -> bool {
        EnvConfig::is_debug_mode()
    }
}
