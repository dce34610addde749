//! Item repository
//!
//! Each `ItemKind` has its own table. Rows share the base columns and differ
//! only in the payload column, so every query here is built from the kind.
//! Insert and delete are also exposed on bare connections so the content
//! repository can run them inside its transactions.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Item, ItemBase, ItemFields, ItemKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlConnection, Row, SqliteConnection};
use std::sync::Arc;

/// Column holding the kind-specific payload
pub(crate) fn payload_column(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Text => "body",
        ItemKind::Video => "url",
        ItemKind::Image | ItemKind::File => "file",
    }
}

fn select_sql(kind: ItemKind) -> String {
    format!(
        "SELECT id, owner_id, title, {} AS payload, created_at, updated_at FROM {} WHERE id = ?",
        payload_column(kind),
        kind.table()
    )
}

fn insert_sql(kind: ItemKind) -> String {
    format!(
        "INSERT INTO {} (owner_id, title, {}, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        kind.table(),
        payload_column(kind)
    )
}

fn update_sql(kind: ItemKind) -> String {
    let column = payload_column(kind);
    format!(
        "UPDATE {} SET title = ?, {} = COALESCE(?, {}), updated_at = ? WHERE id = ?",
        kind.table(),
        column,
        column
    )
}

fn delete_sql(kind: ItemKind) -> String {
    format!("DELETE FROM {} WHERE id = ?", kind.table())
}

/// Item repository trait
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Load an item from its kind's table
    async fn get(&self, kind: ItemKind, id: i64) -> Result<Option<Item>>;

    /// Update title and payload in place. A `None` payload keeps the
    /// stored one.
    async fn update(&self, kind: ItemKind, id: i64, fields: &ItemFields) -> Result<Option<Item>>;
}

pub struct SqlxItemRepository {
    pool: DynDatabasePool,
}

impl SqlxItemRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ItemRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ItemRepository for SqlxItemRepository {
    async fn get(&self, kind: ItemKind, id: i64) -> Result<Option<Item>> {
        let sql = select_sql(kind);
        let item = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .with_context(|| format!("Failed to get {} item", kind))?
                .map(|row| row_to_item_sqlite(kind, &row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .with_context(|| format!("Failed to get {} item", kind))?
                .map(|row| row_to_item_mysql(kind, &row)),
        };
        Ok(item)
    }

    async fn update(&self, kind: ItemKind, id: i64, fields: &ItemFields) -> Result<Option<Item>> {
        let sql = update_sql(kind);
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(&fields.title)
                .bind(&fields.payload)
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .with_context(|| format!("Failed to update {} item", kind))?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(&fields.title)
                .bind(&fields.payload)
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .with_context(|| format!("Failed to update {} item", kind))?
                .rows_affected(),
        };

        if affected == 0 {
            return Ok(None);
        }
        self.get(kind, id).await
    }
}

fn row_to_item_sqlite(kind: ItemKind, row: &sqlx::sqlite::SqliteRow) -> Item {
    let base = ItemBase {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };
    Item::from_parts(kind, base, row.get("payload"))
}

fn row_to_item_mysql(kind: ItemKind, row: &sqlx::mysql::MySqlRow) -> Item {
    let base = ItemBase {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };
    Item::from_parts(kind, base, row.get("payload"))
}

// ============================================================================
// Connection-level helpers (used inside transactions)
// ============================================================================

pub(crate) async fn insert_item_sqlite(
    conn: &mut SqliteConnection,
    kind: ItemKind,
    owner_id: i64,
    title: &str,
    payload: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(&insert_sql(kind))
        .bind(owner_id)
        .bind(title)
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await
        .with_context(|| format!("Failed to create {} item", kind))?;
    Ok(result.last_insert_rowid())
}

pub(crate) async fn insert_item_mysql(
    conn: &mut MySqlConnection,
    kind: ItemKind,
    owner_id: i64,
    title: &str,
    payload: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(&insert_sql(kind))
        .bind(owner_id)
        .bind(title)
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await
        .with_context(|| format!("Failed to create {} item", kind))?;
    Ok(result.last_insert_id() as i64)
}

pub(crate) async fn delete_item_sqlite(conn: &mut SqliteConnection, kind: ItemKind, id: i64) -> Result<()> {
    sqlx::query(&delete_sql(kind))
        .bind(id)
        .execute(conn)
        .await
        .with_context(|| format!("Failed to delete {} item", kind))?;
    Ok(())
}

pub(crate) async fn delete_item_mysql(conn: &mut MySqlConnection, kind: ItemKind, id: i64) -> Result<()> {
    sqlx::query(&delete_sql(kind))
        .bind(id)
        .execute(conn)
        .await
        .with_context(|| format!("Failed to delete {} item", kind))?;
    Ok(())
}
