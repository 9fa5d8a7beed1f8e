pub mod context_files;
pub mod error;
pub mod generation;
pub mod init;
pub mod models;
pub mod session;
pub mod similarity;
pub mod snapshot;
pub mod types;

#[cfg(test)]
mod test_support;

pub use crate::context_files::{ContextFileAnalyzer, serialize_context};
pub use crate::error::{AppError, ErrorCode, Result};
pub use crate::generation::{CancellationToken, Generation, GenerationClient};
pub use crate::init::{AppState, Config, app_init};
pub use crate::snapshot::SnapshotBuilder;
