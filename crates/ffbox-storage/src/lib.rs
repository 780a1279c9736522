//! Temp-directory storage for the ffbox media service.
//!
//! - [`StorageRoot`]: the directory every component reads and writes
//! - [`ArtifactRegistry`]: the single source of truth for what may be served
//!   and what the cleanup sweep may delete

pub mod error;
pub mod registry;
pub mod root;

pub use error::{StorageError, StorageResult};
pub use registry::{AdoptReport, ArtifactRegistry};
pub use root::{is_valid_artifact_name, StorageRoot, TRANSIENT_PREFIXES};
