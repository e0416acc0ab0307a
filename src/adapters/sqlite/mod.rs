//! SQLite adapters for the persistence ports.

pub mod connection;
pub mod event_repository;
pub mod goal_repository;
pub mod migrations;
pub mod task_repository;

pub use connection::{create_migrated_memory_pool, create_pool, ConnectionError, PoolConfig};
pub use event_repository::SqliteEventRepository;
pub use goal_repository::SqliteGoalRepository;
pub use migrations::{embedded_migrations, Migration, MigrationError, Migrator};
pub use task_repository::SqliteTaskRepository;
