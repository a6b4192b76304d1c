//! Bulk upload of JSON graph descriptions into Neo4j.
//!
//! A payload lists node groups and relationship groups. Each group is split
//! into batches, compiled into one parameterized `UNWIND` statement per batch
//! and executed in order: every node batch before any relationship batch.

pub mod api_client;
pub mod backend;
pub mod batch;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod key_path;
pub mod models;
pub mod neo4j_storage;
pub mod node_compiler;
pub mod properties;
pub mod relationship_compiler;
pub mod retry;
pub mod upload;
pub mod worker;

pub use backend::GraphBackend;
pub use batch::compile;
pub use config::Neo4jConfig;
pub use error::{Result, UploadError};
pub use models::{
    CompiledStatement, Counters, GraphSpecification, NodeGroup, RelationshipGroup, TargetNodeRef, UploadResult,
};
pub use neo4j_storage::Neo4jBackend;
pub use upload::{batch_upload, batch_upload_with_progress, Uploader};

#[cfg(test)]
mod test_support;
