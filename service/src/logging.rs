use crate::config::{Config, RustEnv};
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// HTTP stack targets that only reach the console at TRACE.
const HTTP_STACK_TARGETS: &[&str] = &["tower", "tower_http", "tracing", "hyper", "axum"];

/// Console logging derived from the runtime configuration.
#[derive(Debug, Clone, PartialEq)]
struct LogSettings {
    level: LevelFilter,
    hide_http_stack: bool,
    color: ColorChoice,
}

impl LogSettings {
    fn from_config(config: &Config) -> Self {
        Self::new(config.log_level_filter, &config.runtime_env)
    }

    fn new(level: LevelFilter, env: &RustEnv) -> Self {
        Self {
            level,
            hide_http_stack: level != LevelFilter::Trace,
            // Production output goes to a collector, not a terminal
            color: match env {
                RustEnv::Production => ColorChoice::Never,
                RustEnv::Development | RustEnv::Staging => ColorChoice::Auto,
            },
        }
    }

    fn hidden_targets(&self) -> &'static [&'static str] {
        if self.hide_http_stack {
            HTTP_STACK_TARGETS
        } else {
            &[]
        }
    }

    fn build(&self) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();
        for target in self.hidden_targets() {
            builder.add_filter_ignore_str(target);
        }
        builder.build()
    }
}

pub struct Logger {}

impl Logger {
    /// Installs the global console logger. A second call leaves the first
    /// logger in place.
    pub fn init_logger(config: &Config) {
        let settings = LogSettings::from_config(config);

        if let Err(e) = TermLogger::init(
            settings.level,
            settings.build(),
            TerminalMode::Mixed,
            settings.color,
        ) {
            eprintln!("Logger already initialized: {e}");
        }
    }
}
