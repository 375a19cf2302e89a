//! Persistence layer — libsql-backed storage for email logs, tracked
//! meetings, and the reminder queue.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::*;
