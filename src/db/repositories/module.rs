//! Module repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Module;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

use super::content::{purge_contents_mysql, purge_contents_sqlite, ContentFilter};

const SELECT_MODULE: &str = "SELECT id, course_id, title, description, sort_order FROM modules";

/// Module repository trait
#[async_trait]
pub trait ModuleRepository: Send + Sync {
    /// Insert a module at the given position
    async fn create(&self, course_id: i64, title: &str, description: &str, order: i32) -> Result<Module>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Module>>;

    /// Modules of a course ordered by `(sort_order, id)`
    async fn list_by_course(&self, course_id: i64) -> Result<Vec<Module>>;

    /// Update title and description; the order is left alone
    async fn update(&self, id: i64, title: &str, description: &str) -> Result<()>;

    /// Delete the module with its contents and their items, in one transaction
    async fn delete_cascade(&self, id: i64) -> Result<()>;

    /// Owner of the course this module belongs to
    async fn owner_of(&self, module_id: i64) -> Result<Option<i64>>;
}

pub struct SqlxModuleRepository {
    pool: DynDatabasePool,
}

impl SqlxModuleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ModuleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ModuleRepository for SqlxModuleRepository {
    async fn create(&self, course_id: i64, title: &str, description: &str, order: i32) -> Result<Module> {
        let sql = "INSERT INTO modules (course_id, title, description, sort_order) VALUES (?, ?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(course_id)
                .bind(title)
                .bind(description)
                .bind(order)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create module")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(course_id)
                .bind(title)
                .bind(description)
                .bind(order)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create module")?
                .last_insert_id() as i64,
        };

        Ok(Module {
            id,
            course_id,
            title: title.to_string(),
            description: description.to_string(),
            order,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Module>> {
        let sql = format!("{} WHERE id = ?", SELECT_MODULE);
        let module = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get module")?
                .map(|row| row_to_module_sqlite(&row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get module")?
                .map(|row| row_to_module_mysql(&row)),
        };
        Ok(module)
    }

    async fn list_by_course(&self, course_id: i64) -> Result<Vec<Module>> {
        let sql = format!("{} WHERE course_id = ? ORDER BY sort_order, id", SELECT_MODULE);
        let modules = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(course_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list modules")?
                .iter()
                .map(row_to_module_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(course_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list modules")?
                .iter()
                .map(row_to_module_mysql)
                .collect(),
        };
        Ok(modules)
    }

    async fn update(&self, id: i64, title: &str, description: &str) -> Result<()> {
        let sql = "UPDATE modules SET title = ?, description = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(title)
                    .bind(description)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update module")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(title)
                    .bind(description)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update module")?;
            }
        }
        Ok(())
    }

    async fn delete_cascade(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM modules WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                purge_contents_sqlite(&mut tx, ContentFilter::Module(id)).await?;
                sqlx::query(sql)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete module")?;
                tx.commit().await.context("Failed to commit module deletion")?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                purge_contents_mysql(&mut tx, ContentFilter::Module(id)).await?;
                sqlx::query(sql)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete module")?;
                tx.commit().await.context("Failed to commit module deletion")?;
            }
        }
        Ok(())
    }

    async fn owner_of(&self, module_id: i64) -> Result<Option<i64>> {
        let sql = "SELECT c.owner_id FROM modules m JOIN courses c ON c.id = m.course_id WHERE m.id = ?";
        let owner = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(module_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to resolve module owner")?
                .map(|row| row.get("owner_id")),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(module_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to resolve module owner")?
                .map(|row| row.get("owner_id")),
        };
        Ok(owner)
    }
}

fn row_to_module_sqlite(row: &sqlx::sqlite::SqliteRow) -> Module {
    Module {
        id: row.get("id"),
        course_id: row.get("course_id"),
        title: row.get("title"),
        description: row.get("description"),
        order: row.get("sort_order"),
    }
}

fn row_to_module_mysql(row: &sqlx::mysql::MySqlRow) -> Module {
    Module {
        id: row.get("id"),
        course_id: row.get("course_id"),
        title: row.get("title"),
        description: row.get("description"),
        order: row.get("sort_order"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ContentRepository, SqlxContentRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ItemFields, ItemKind};

    async fn setup() -> (DynDatabasePool, SqlxModuleRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        for sql in [
            "INSERT INTO users (username, email, password_hash, role) VALUES ('a', 'a@x.io', 'h', 'instructor')",
            "INSERT INTO subjects (title, slug) VALUES ('Math', 'math')",
            "INSERT INTO courses (owner_id, subject_id, title, slug, overview) VALUES (1, 1, 'A', 'a', '')",
        ] {
            pool.execute(sql).await.unwrap();
        }
        (pool.clone(), SqlxModuleRepository::new(pool))
    }

    #[tokio::test]
    async fn test_create_update_list() {
        let (_pool, repo) = setup().await;
        let first = repo.create(1, "Intro", "", 1).await.unwrap();
        let second = repo.create(1, "Basics", "Numbers", 0).await.unwrap();

        repo.update(first.id, "Introduction", "Start here").await.unwrap();

        let modules = repo.list_by_course(1).await.unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].id, second.id);
        assert_eq!(modules[1].title, "Introduction");
        assert_eq!(modules[1].description, "Start here");
        assert_eq!(modules[1].order, 1);
    }

    #[tokio::test]
    async fn test_delete_cascade_removes_items() {
        let (pool, repo) = setup().await;
        let module = repo.create(1, "Intro", "", 0).await.unwrap();
        let contents = SqlxContentRepository::new(pool.clone());
        let content = contents
            .create_with_item(
                module.id,
                ItemKind::Text,
                1,
                &ItemFields {
                    title: "t".to_string(),
                    payload: Some("body".to_string()),
                },
                0,
            )
            .await
            .unwrap();

        repo.delete_cascade(module.id).await.unwrap();

        assert!(repo.get_by_id(module.id).await.unwrap().is_none());
        assert!(contents.get_by_id(content.id).await.unwrap().is_none());
        let row = sqlx::query("SELECT COUNT(*) AS n FROM items_text")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        let remaining: i64 = row.get("n");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_owner_of() {
        let (_pool, repo) = setup().await;
        let module = repo.create(1, "Intro", "", 0).await.unwrap();
        assert_eq!(repo.owner_of(module.id).await.unwrap(), Some(1));
        assert_eq!(repo.owner_of(77).await.unwrap(), None);
    }
}
