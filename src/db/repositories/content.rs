//! Content repository
//!
//! A content row binds a module to one item through `(item_kind, item_id)`.
//! Items are written together with their content row, and removed with it,
//! inside a single transaction.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Content, ItemFields, ItemKind};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlConnection, Row, SqliteConnection};
use std::sync::Arc;

use super::item::{delete_item_sqlite, delete_item_mysql, insert_item_mysql, insert_item_sqlite};

const SELECT_CONTENT: &str = "SELECT id, module_id, item_kind, item_id, sort_order FROM contents";

const INSERT_CONTENT: &str =
    "INSERT INTO contents (module_id, item_kind, item_id, sort_order) VALUES (?, ?, ?, ?)";

/// Which contents a cascading purge removes
#[derive(Debug, Clone, Copy)]
pub(crate) enum ContentFilter {
    Module(i64),
    Course(i64),
}

impl ContentFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            ContentFilter::Module(_) => "module_id = ?",
            ContentFilter::Course(_) => "module_id IN (SELECT id FROM modules WHERE course_id = ?)",
        }
    }

    fn id(&self) -> i64 {
        match self {
            ContentFilter::Module(id) | ContentFilter::Course(id) => *id,
        }
    }
}

/// Content repository trait
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Create an item and the content row pointing at it, in one transaction
    async fn create_with_item(
        &self,
        module_id: i64,
        kind: ItemKind,
        owner_id: i64,
        fields: &ItemFields,
        order: i32,
    ) -> Result<Content>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Content>>;

    /// Content row pointing at the given item
    async fn get_by_item(&self, kind: ItemKind, item_id: i64) -> Result<Option<Content>>;

    /// Contents of a module ordered by `(sort_order, id)`
    async fn list_by_module(&self, module_id: i64) -> Result<Vec<Content>>;

    /// Delete the item then the content row, in one transaction
    async fn delete_with_item(&self, content: &Content) -> Result<()>;

    /// Owner of the course this content belongs to
    async fn owner_of(&self, content_id: i64) -> Result<Option<i64>>;
}

pub struct SqlxContentRepository {
    pool: DynDatabasePool,
}

impl SqlxContentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn create_with_item(
        &self,
        module_id: i64,
        kind: ItemKind,
        owner_id: i64,
        fields: &ItemFields,
        order: i32,
    ) -> Result<Content> {
        let payload = fields
            .payload
            .as_deref()
            .ok_or_else(|| anyhow!("New {} item has no payload", kind))?;
        let now = Utc::now();

        let (id, item_id) = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                let item_id =
                    insert_item_sqlite(&mut tx, kind, owner_id, &fields.title, payload, now).await?;
                let id = sqlx::query(INSERT_CONTENT)
                    .bind(module_id)
                    .bind(kind.as_str())
                    .bind(item_id)
                    .bind(order)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create content")?
                    .last_insert_rowid();
                tx.commit().await.context("Failed to commit content creation")?;
                (id, item_id)
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                let item_id =
                    insert_item_mysql(&mut tx, kind, owner_id, &fields.title, payload, now).await?;
                let id = sqlx::query(INSERT_CONTENT)
                    .bind(module_id)
                    .bind(kind.as_str())
                    .bind(item_id)
                    .bind(order)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to create content")?
                    .last_insert_id() as i64;
                tx.commit().await.context("Failed to commit content creation")?;
                (id, item_id)
            }
        };

        Ok(Content {
            id,
            module_id,
            item_kind: kind,
            item_id,
            order,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Content>> {
        let sql = format!("{} WHERE id = ?", SELECT_CONTENT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get content")?
                .as_ref()
                .map(row_to_content_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get content")?
                .as_ref()
                .map(row_to_content_mysql)
                .transpose(),
        }
    }

    async fn get_by_item(&self, kind: ItemKind, item_id: i64) -> Result<Option<Content>> {
        let sql = format!("{} WHERE item_kind = ? AND item_id = ?", SELECT_CONTENT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(kind.as_str())
                .bind(item_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get content by item")?
                .as_ref()
                .map(row_to_content_sqlite)
                .transpose(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(kind.as_str())
                .bind(item_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get content by item")?
                .as_ref()
                .map(row_to_content_mysql)
                .transpose(),
        }
    }

    async fn list_by_module(&self, module_id: i64) -> Result<Vec<Content>> {
        let sql = format!("{} WHERE module_id = ? ORDER BY sort_order, id", SELECT_CONTENT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(module_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list contents")?
                .iter()
                .map(row_to_content_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(module_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list contents")?
                .iter()
                .map(row_to_content_mysql)
                .collect(),
        }
    }

    async fn delete_with_item(&self, content: &Content) -> Result<()> {
        let sql = "DELETE FROM contents WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                delete_item_sqlite(&mut tx, content.item_kind, content.item_id).await?;
                sqlx::query(sql)
                    .bind(content.id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete content")?;
                tx.commit().await.context("Failed to commit content deletion")?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                delete_item_mysql(&mut tx, content.item_kind, content.item_id).await?;
                sqlx::query(sql)
                    .bind(content.id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete content")?;
                tx.commit().await.context("Failed to commit content deletion")?;
            }
        }
        Ok(())
    }

    async fn owner_of(&self, content_id: i64) -> Result<Option<i64>> {
        let sql = r#"
            SELECT c.owner_id FROM contents t
            JOIN modules m ON m.id = t.module_id
            JOIN courses c ON c.id = m.course_id
            WHERE t.id = ?
        "#;
        let owner = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(content_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to resolve content owner")?
                .map(|row| row.get("owner_id")),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(content_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to resolve content owner")?
                .map(|row| row.get("owner_id")),
        };
        Ok(owner)
    }
}

fn parse_kind(raw: &str) -> Result<ItemKind> {
    raw.parse::<ItemKind>()
        .with_context(|| format!("Invalid item kind in database: {}", raw))
}

fn row_to_content_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Content> {
    let kind: String = row.get("item_kind");
    Ok(Content {
        id: row.get("id"),
        module_id: row.get("module_id"),
        item_kind: parse_kind(&kind)?,
        item_id: row.get("item_id"),
        order: row.get("sort_order"),
    })
}

fn row_to_content_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Content> {
    let kind: String = row.get("item_kind");
    Ok(Content {
        id: row.get("id"),
        module_id: row.get("module_id"),
        item_kind: parse_kind(&kind)?,
        item_id: row.get("item_id"),
        order: row.get("sort_order"),
    })
}

// ============================================================================
// Cascading purge (runs inside the caller's transaction)
// ============================================================================

/// Delete every content matched by `filter` together with its item
pub(crate) async fn purge_contents_sqlite(conn: &mut SqliteConnection, filter: ContentFilter) -> Result<()> {
    let rows = sqlx::query(&format!(
        "SELECT item_kind, item_id FROM contents WHERE {}",
        filter.where_clause()
    ))
    .bind(filter.id())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list contents to purge")?;

    for row in rows {
        let kind: String = row.get("item_kind");
        delete_item_sqlite(&mut *conn, parse_kind(&kind)?, row.get("item_id")).await?;
    }

    sqlx::query(&format!("DELETE FROM contents WHERE {}", filter.where_clause()))
        .bind(filter.id())
        .execute(&mut *conn)
        .await
        .context("Failed to purge contents")?;
    Ok(())
}

/// Delete every content matched by `filter` together with its item
pub(crate) async fn purge_contents_mysql(conn: &mut MySqlConnection, filter: ContentFilter) -> Result<()> {
    let rows = sqlx::query(&format!(
        "SELECT item_kind, item_id FROM contents WHERE {}",
        filter.where_clause()
    ))
    .bind(filter.id())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list contents to purge")?;

    for row in rows {
        let kind: String = row.get("item_kind");
        delete_item_mysql(&mut *conn, parse_kind(&kind)?, row.get("item_id")).await?;
    }

    sqlx::query(&format!("DELETE FROM contents WHERE {}", filter.where_clause()))
        .bind(filter.id())
        .execute(&mut *conn)
        .await
        .context("Failed to purge contents")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ItemRepository, SqlxItemRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::Item;

    async fn setup() -> (DynDatabasePool, SqlxContentRepository, SqlxItemRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        for sql in [
            "INSERT INTO users (username, email, password_hash, role) VALUES ('a', 'a@x.io', 'h', 'instructor')",
            "INSERT INTO subjects (title, slug) VALUES ('Math', 'math')",
            "INSERT INTO courses (owner_id, subject_id, title, slug, overview) VALUES (1, 1, 'A', 'a', '')",
            "INSERT INTO modules (course_id, title, sort_order) VALUES (1, 'Intro', 0)",
            "INSERT INTO modules (course_id, title, sort_order) VALUES (1, 'Next', 1)",
        ] {
            pool.execute(sql).await.unwrap();
        }
        (
            pool.clone(),
            SqlxContentRepository::new(pool.clone()),
            SqlxItemRepository::new(pool),
        )
    }

    fn fields(title: &str, payload: &str) -> ItemFields {
        ItemFields {
            title: title.to_string(),
            payload: Some(payload.to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_with_item_and_resolve() {
        let (_pool, contents, items) = setup().await;
        let content = contents
            .create_with_item(1, ItemKind::Text, 1, &fields("Welcome", "hello"), 0)
            .await
            .unwrap();

        assert_eq!(content.module_id, 1);
        assert_eq!(content.item_kind, ItemKind::Text);

        let item = items.get(ItemKind::Text, content.item_id).await.unwrap().unwrap();
        match item {
            Item::Text(text) => {
                assert_eq!(text.base.title, "Welcome");
                assert_eq!(text.body, "hello");
                assert_eq!(text.base.owner_id, 1);
            }
            other => panic!("unexpected item {:?}", other),
        }

        let by_item = contents.get_by_item(ItemKind::Text, content.item_id).await.unwrap();
        assert_eq!(by_item, Some(content));
    }

    #[tokio::test]
    async fn test_create_without_payload_fails() {
        let (_pool, contents, _items) = setup().await;
        let empty = ItemFields {
            title: "x".to_string(),
            payload: None,
        };
        assert!(contents.create_with_item(1, ItemKind::Video, 1, &empty, 0).await.is_err());
        assert!(contents.list_by_module(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sorted_by_order_then_id() {
        let (_pool, contents, _items) = setup().await;
        let a = contents.create_with_item(1, ItemKind::Text, 1, &fields("a", "a"), 2).await.unwrap();
        let b = contents.create_with_item(1, ItemKind::Text, 1, &fields("b", "b"), 0).await.unwrap();
        let c = contents.create_with_item(1, ItemKind::Text, 1, &fields("c", "c"), 2).await.unwrap();
        contents.create_with_item(2, ItemKind::Text, 1, &fields("d", "d"), 0).await.unwrap();

        let ids: Vec<i64> = contents.list_by_module(1).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![b.id, a.id, c.id]);
    }

    #[tokio::test]
    async fn test_delete_with_item_leaves_no_orphan() {
        let (_pool, contents, items) = setup().await;
        let content = contents
            .create_with_item(1, ItemKind::Video, 1, &fields("Talk", "https://vimeo.com/1"), 0)
            .await
            .unwrap();

        contents.delete_with_item(&content).await.unwrap();

        assert!(contents.get_by_id(content.id).await.unwrap().is_none());
        assert!(items.get(ItemKind::Video, content.item_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_item_update_keeps_payload_when_none() {
        let (_pool, contents, items) = setup().await;
        let content = contents
            .create_with_item(1, ItemKind::File, 1, &fields("Notes", "files/notes.pdf"), 0)
            .await
            .unwrap();

        let updated = items
            .update(
                ItemKind::File,
                content.item_id,
                &ItemFields {
                    title: "Lecture notes".to_string(),
                    payload: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.base().title, "Lecture notes");
        assert_eq!(updated.payload(), "files/notes.pdf");
        assert!(items.update(ItemKind::File, 999, &fields("x", "y")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owner_of() {
        let (_pool, contents, _items) = setup().await;
        let content = contents.create_with_item(2, ItemKind::Text, 1, &fields("t", "b"), 0).await.unwrap();
        assert_eq!(contents.owner_of(content.id).await.unwrap(), Some(1));
        assert_eq!(contents.owner_of(12345).await.unwrap(), None);
    }
}
