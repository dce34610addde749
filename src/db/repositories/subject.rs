//! Subject repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Subject, SubjectWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Subject repository trait
#[async_trait]
pub trait SubjectRepository: Send + Sync {
    async fn create(&self, title: &str, slug: &str) -> Result<Subject>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Subject>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Subject>>;

    /// All subjects ordered by title, each with its course count
    async fn list_with_counts(&self) -> Result<Vec<SubjectWithCount>>;
}

pub struct SqlxSubjectRepository {
    pool: DynDatabasePool,
}

impl SqlxSubjectRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubjectRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_where(&self, filter: &str, value: SubjectKey<'_>) -> Result<Option<Subject>> {
        let sql = format!("SELECT id, title, slug FROM subjects WHERE {} = ?", filter);
        let subject = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let query = sqlx::query(&sql);
                let query = match value {
                    SubjectKey::Id(id) => query.bind(id),
                    SubjectKey::Slug(slug) => query.bind(slug),
                };
                query
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get subject")?
                    .map(|row| Subject {
                        id: row.get("id"),
                        title: row.get("title"),
                        slug: row.get("slug"),
                    })
            }
            DatabaseDriver::Mysql => {
                let query = sqlx::query(&sql);
                let query = match value {
                    SubjectKey::Id(id) => query.bind(id),
                    SubjectKey::Slug(slug) => query.bind(slug),
                };
                query
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get subject")?
                    .map(|row| Subject {
                        id: row.get("id"),
                        title: row.get("title"),
                        slug: row.get("slug"),
                    })
            }
        };
        Ok(subject)
    }
}

enum SubjectKey<'a> {
    Id(i64),
    Slug(&'a str),
}

const LIST_WITH_COUNTS: &str = r#"
    SELECT s.id, s.title, s.slug, COUNT(c.id) AS total_courses
    FROM subjects s
    LEFT JOIN courses c ON c.subject_id = s.id
    GROUP BY s.id, s.title, s.slug
    ORDER BY s.title, s.id
"#;

#[async_trait]
impl SubjectRepository for SqlxSubjectRepository {
    async fn create(&self, title: &str, slug: &str) -> Result<Subject> {
        let sql = "INSERT INTO subjects (title, slug) VALUES (?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(title)
                .bind(slug)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create subject")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(title)
                .bind(slug)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create subject")?
                .last_insert_id() as i64,
        };

        Ok(Subject {
            id,
            title: title.to_string(),
            slug: slug.to_string(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Subject>> {
        self.get_where("id", SubjectKey::Id(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Subject>> {
        self.get_where("slug", SubjectKey::Slug(slug)).await
    }

    async fn list_with_counts(&self) -> Result<Vec<SubjectWithCount>> {
        let subjects = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(LIST_WITH_COUNTS)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list subjects")?
                .iter()
                .map(|row| SubjectWithCount {
                    subject: Subject {
                        id: row.get("id"),
                        title: row.get("title"),
                        slug: row.get("slug"),
                    },
                    total_courses: row.get("total_courses"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(LIST_WITH_COUNTS)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list subjects")?
                .iter()
                .map(|row| SubjectWithCount {
                    subject: Subject {
                        id: row.get("id"),
                        title: row.get("title"),
                        slug: row.get("slug"),
                    },
                    total_courses: row.get("total_courses"),
                })
                .collect(),
        };
        Ok(subjects)
    }
}
