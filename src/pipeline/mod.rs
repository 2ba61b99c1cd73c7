//! Batch jobs over the stores: the Document Builder, the Cache Synchronizer
//! and the analytics summary.

pub mod analytics;
pub mod builder;
pub mod sync;

pub use analytics::AnalyticsJob;
pub use builder::{DocumentBuilder, MigrationReport, RecordFailure};
pub use sync::{CacheSynchronizer, SyncReport};
