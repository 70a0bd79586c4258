// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod bootstrap;
pub mod caption;
pub mod config;
pub mod harvest;
pub mod host;
pub mod media;
pub mod metrics;
pub mod orchestrator;
pub mod rng;
pub mod source;
pub mod storage;
#[doc(hidden)]
pub mod testing;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::bootstrap::RelayRuntime;
pub use crate::harvest::scheduler::{spawn_harvest_scheduler, CycleOutcome, HarvestJob};
pub use crate::harvest::{HarvestReport, Harvester, RetryPolicy};
pub use crate::orchestrator::{Orchestrator, ProcessedPost, TransformError};
pub use crate::storage::{MetadataRecord, Storage};
