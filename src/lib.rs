// membank - the mem_bank background job stack
//
// Re-exports the queue, configuration, logging and embedding job crates so a
// service can depend on a single package.

// Logging is always available
pub use membank_log as log;

// Re-export optional crates
#[cfg(feature = "queue")]
pub use membank_queue as queue;

#[cfg(feature = "config")]
pub use membank_config as config;

#[cfg(feature = "jobs")]
pub use membank_jobs as jobs;

// Prelude for common imports
pub mod prelude {
    pub use membank_log::{Format, Level, LogConfig};

    #[cfg(feature = "queue")]
    pub use membank_queue::prelude::*;

    #[cfg(feature = "config")]
    pub use membank_config::{Settings, SettingsLoader};

    #[cfg(feature = "jobs")]
    pub use membank_jobs::{EmbeddingService, JobFactory, MemoryRepository, register_embedding_handlers};
}
