/// Database model definitions.
pub mod models;
/// Session, progress and response storage backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
