pub mod faulty;
pub mod project;

pub use faulty::{FaultyStore, FaultyTx};
pub use project::{TempDatabase, TestProject};

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once. `RUST_LOG` overrides the default `warn` filter.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
