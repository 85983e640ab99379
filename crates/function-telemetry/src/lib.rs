//! This crate contains the tracing subscriber setup used by the function
//! binaries in this workspace.
pub mod tracing;

pub use tracing::Tracing;
