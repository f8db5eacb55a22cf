// Cleanup scheduling
pub mod scheduler;

// Observability
pub mod logging;

// App state (configuration, paths)
pub mod state;

pub use scheduler::spawn_cleanup;
pub use state::{AppConfig, AppState, LoggingConfig, StateError};
