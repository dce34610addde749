//! Database layer
//!
//! Persistence for users, sessions, subjects, courses, modules, contents and
//! the polymorphic item tables. Both SQLite (default) and MySQL are
//! supported behind the `DatabasePool` trait; the driver is chosen from
//! configuration.
//!
//! ```ignore
//! use educa::config::DatabaseConfig;
//! use educa::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
