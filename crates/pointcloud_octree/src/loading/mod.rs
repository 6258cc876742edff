//! Node loading pipeline: sources, decoding, decode workers, scheduling.
//!
//! # Module Structure
//!
//! - [`schema`]: `EptMetadata`, `PointSchema` - dataset metadata and record layout
//! - [`source`]: `NodeSource` trait, `FileSource`, `MemorySource`
//! - [`decoder`]: binary payload to `PointAttributes`
//! - [`worker_pool`]: bounded decode workers with idle retirement
//! - [`counter`]: injected in-flight counter and `LoadingState`
//! - [`loader`]: `NodeLoader` - issues loads and applies completions

pub mod counter;
pub mod decoder;
pub mod loader;
pub mod schema;
pub mod source;
pub mod worker_pool;

pub use counter::{LoadCounter, LoadingState};
pub use decoder::{decode_points, DecodedNode, PointAttributes};
pub use loader::{CompletionSummary, LoadCompletion, LoadOutcome, LoadedPayload, NodeLoader};
pub use schema::{Dimension, DimensionKind, EptMetadata, PointSchema, SchemaField, ValueType};
pub use source::{FileSource, MemorySource, NodeSource};
pub use worker_pool::{Job, Worker, WorkerPool};
