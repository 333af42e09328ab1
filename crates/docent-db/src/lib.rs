//! Docent DB - SQLite persistence for jobs, the work queue and the vector index.

mod database;
mod error;
mod migrations;
mod operations;

pub use database::Database;
pub use error::{DbError, DbResult};
pub use operations::queue::FailureDisposition;
pub use operations::vectors::cosine_similarity;
