//! Tracing subscriber setup for hosts embedding the pipeline.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_filter() -> EnvFilter {
    if cfg!(debug_assertions) {
        EnvFilter::new("info,bookvoice=debug")
    } else {
        EnvFilter::new("info")
    }
}

/// Installs the global tracing subscriber and routes `log` records into it.
///
/// `RUST_LOG` overrides the default filter. Safe to call more than once;
/// only the first call has an effect. Returns `false` when another
/// subscriber was already installed by the host.
pub fn init_tracing(format: LogFormat) -> bool {
    static INIT: OnceLock<bool> = OnceLock::new();
    *INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true);

        let installed = match format {
            LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()).is_ok(),
            LogFormat::Json => {
                tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
            }
        };

        if let Err(e) = tracing_log::LogTracer::init() {
            tracing::debug!("log bridge not installed: {}", e);
        }
        installed
    })
}
