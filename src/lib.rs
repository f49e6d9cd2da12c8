//! sparkify-lake: a batch job that turns raw song and event logs into a
//! Parquet star schema.
//!
//! Song metadata and user activity logs are read as NDJSON from object
//! storage (or the local filesystem), shaped into the `songs`, `artists`,
//! `users`, `time` and `songplays` tables, and written back as Hive-partitioned
//! Parquet. Every run replaces the previous output.
//!
//! # Example
//!
//! ```ignore
//! use sparkify_lake::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("etl.yaml")?;
//!     let stats = run_pipeline(config).await?;
//!     println!("Wrote {} files", stats.files_written());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod partition;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod source;
pub mod storage;
pub mod transform;

// Re-export main types
pub use config::Config;
pub use pipeline::{Pipeline, PipelineStats, RunPlan, plan, run_pipeline};
pub use storage::{StorageProvider, StorageProviderRef};
