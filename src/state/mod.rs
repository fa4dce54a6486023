//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Checkpoint`: The resume position, one cursor per traversal level
//! - `Level`: The four nesting levels of the crawl
//! - `CheckpointStore`: Persists the checkpoint as a JSON document between runs

mod checkpoint;

// Re-export main types
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, Level};
