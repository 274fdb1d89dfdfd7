use std::sync::Once;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn";

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_FILTER);
}

/// Install the global fmt subscriber once per process. `RUST_LOG` wins over
/// `default_filter`; later calls are no-ops.
pub fn init_tracing_with(default_filter: &str) {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok();

        if installed {
            info!("offline cache tracing initialized");
        }
    });
}
