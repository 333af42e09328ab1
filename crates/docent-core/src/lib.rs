//! Docent Core - Domain types for the asynchronous document-analysis pipeline.

mod retry;
mod types;

pub use retry::RetryPolicy;
pub use types::*;
