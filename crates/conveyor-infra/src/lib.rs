//! Infrastructure layer for Conveyor: SQLite implementations of the
//! `conveyor-core` store and repository traits.

pub mod sqlite;

pub use sqlite::job::SqliteJobStore;
pub use sqlite::pool::DatabasePool;
pub use sqlite::workflow::SqliteWorkflowRepository;
