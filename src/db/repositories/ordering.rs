//! Scoped ordering for modules and contents
//!
//! Modules are ordered within their course and contents within their
//! module. A new record gets the next position in its scope: 0 for the
//! first sibling, otherwise one past the current maximum.
//!
//! The read of the current maximum and the later insert are not isolated.
//! Two concurrent creations in the same scope can receive the same order;
//! listings sort by `(sort_order, id)` so such ties stay stable.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Sibling group a new record is ordered within
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// Modules of a course
    Course(i64),
    /// Contents of a module
    Module(i64),
}

impl OrderScope {
    fn id(&self) -> i64 {
        match self {
            OrderScope::Course(id) | OrderScope::Module(id) => *id,
        }
    }

    fn ordered(&self) -> Ordered {
        match self {
            OrderScope::Course(_) => Ordered::Module,
            OrderScope::Module(_) => Ordered::Content,
        }
    }
}

/// Record type carrying a scoped order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordered {
    Module,
    Content,
}

impl Ordered {
    fn table(&self) -> &'static str {
        match self {
            Ordered::Module => "modules",
            Ordered::Content => "contents",
        }
    }

    fn scope_column(&self) -> &'static str {
        match self {
            Ordered::Module => "course_id",
            Ordered::Content => "module_id",
        }
    }

    /// UPDATE restricted to rows whose course belongs to the given owner
    fn owned_update_sql(&self) -> &'static str {
        match self {
            Ordered::Module => {
                "UPDATE modules SET sort_order = ? WHERE id = ? \
                 AND course_id IN (SELECT id FROM courses WHERE owner_id = ?)"
            }
            Ordered::Content => {
                "UPDATE contents SET sort_order = ? WHERE id = ? \
                 AND module_id IN (SELECT m.id FROM modules m \
                 JOIN courses c ON c.id = m.course_id WHERE c.owner_id = ?)"
            }
        }
    }
}

#[async_trait]
pub trait OrderingRepository: Send + Sync {
    /// Next free position in `scope`.
    ///
    /// Returns 0 without querying when the scope id is not a saved record
    /// (`<= 0`).
    async fn next_order_in_scope(&self, scope: OrderScope) -> Result<i32>;

    /// Set the order of one record if its course is owned by `owner_id`.
    /// Returns whether a row was updated.
    async fn set_order_if_owned(&self, ordered: Ordered, id: i64, order: i32, owner_id: i64) -> Result<bool>;
}

pub struct SqlxOrderingRepository {
    pool: DynDatabasePool,
}

impl SqlxOrderingRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OrderingRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl OrderingRepository for SqlxOrderingRepository {
    async fn next_order_in_scope(&self, scope: OrderScope) -> Result<i32> {
        if scope.id() <= 0 {
            return Ok(0);
        }

        let ordered = scope.ordered();
        let sql = format!(
            "SELECT sort_order FROM {} WHERE {} = ? ORDER BY sort_order DESC LIMIT 1",
            ordered.table(),
            ordered.scope_column()
        );

        let last: Option<i32> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(scope.id())
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to read last order in scope")?
                .map(|row| row.get("sort_order")),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(scope.id())
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to read last order in scope")?
                .map(|row| row.get("sort_order")),
        };

        Ok(last.map_or(0, |order| order + 1))
    }

    async fn set_order_if_owned(&self, ordered: Ordered, id: i64, order: i32, owner_id: i64) -> Result<bool> {
        let sql = ordered.owned_update_sql();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(order)
                .bind(id)
                .bind(owner_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update order")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(order)
                .bind(id)
                .bind(owner_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update order")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}
