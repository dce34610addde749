//! Course repository
//!
//! Courses and their enrolled-students set.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Course, CourseFields};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use super::content::{purge_contents_mysql, purge_contents_sqlite, ContentFilter};

const SELECT_COURSE: &str =
    "SELECT id, owner_id, subject_id, title, slug, overview, created_at FROM courses";

const NEWEST_FIRST: &str = "ORDER BY created_at DESC, id DESC";

/// Course repository trait
#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn create(&self, owner_id: i64, fields: &CourseFields) -> Result<Course>;

    async fn update(&self, id: i64, fields: &CourseFields) -> Result<()>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>>;

    /// Whether another course already uses `slug`
    async fn slug_taken(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Courses owned by a user, newest first
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Course>>;

    /// Catalogue listing, newest first, optionally limited to one subject
    async fn list(&self, subject_id: Option<i64>) -> Result<Vec<Course>>;

    /// Delete the course with its modules, contents and items in one
    /// transaction
    async fn delete_cascade(&self, id: i64) -> Result<()>;

    async fn owner_of(&self, course_id: i64) -> Result<Option<i64>>;

    /// Add a student to the course; enrolling twice is a no-op
    async fn enroll(&self, course_id: i64, user_id: i64) -> Result<()>;

    async fn is_enrolled(&self, course_id: i64, user_id: i64) -> Result<bool>;

    /// Courses a user is enrolled in, newest first
    async fn list_enrolled(&self, user_id: i64) -> Result<Vec<Course>>;
}

pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_where(&self, filter: &str, key: CourseKey<'_>) -> Result<Option<Course>> {
        let sql = format!("{} WHERE {} = ?", SELECT_COURSE, filter);
        let course = match self.pool.driver() {
            DatabaseDriver::Sqlite => key
                .bind_sqlite(sqlx::query(&sql))
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get course")?
                .map(|row| row_to_course_sqlite(&row)),
            DatabaseDriver::Mysql => key
                .bind_mysql(sqlx::query(&sql))
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get course")?
                .map(|row| row_to_course_mysql(&row)),
        };
        Ok(course)
    }

    async fn fetch_all(&self, sql: &str, bind: Option<i64>) -> Result<Vec<Course>> {
        let courses = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(sql);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                query
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list courses")?
                    .iter()
                    .map(row_to_course_sqlite)
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(sql);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                query
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list courses")?
                    .iter()
                    .map(row_to_course_mysql)
                    .collect()
            }
        };
        Ok(courses)
    }
}

#[derive(Clone, Copy)]
enum CourseKey<'a> {
    Id(i64),
    Slug(&'a str),
}

impl<'a> CourseKey<'a> {
    fn bind_sqlite(
        self,
        query: sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>>,
    ) -> sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>> {
        match self {
            CourseKey::Id(id) => query.bind(id),
            CourseKey::Slug(slug) => query.bind(slug),
        }
    }

    fn bind_mysql(
        self,
        query: sqlx::query::Query<'a, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    ) -> sqlx::query::Query<'a, sqlx::MySql, sqlx::mysql::MySqlArguments> {
        match self {
            CourseKey::Id(id) => query.bind(id),
            CourseKey::Slug(slug) => query.bind(slug),
        }
    }
}

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, owner_id: i64, fields: &CourseFields) -> Result<Course> {
        let sql = r#"
            INSERT INTO courses (owner_id, subject_id, title, slug, overview, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(owner_id)
                .bind(fields.subject_id)
                .bind(&fields.title)
                .bind(&fields.slug)
                .bind(&fields.overview)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create course")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(owner_id)
                .bind(fields.subject_id)
                .bind(&fields.title)
                .bind(&fields.slug)
                .bind(&fields.overview)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create course")?
                .last_insert_id() as i64,
        };

        Ok(Course {
            id,
            owner_id,
            subject_id: fields.subject_id,
            title: fields.title.clone(),
            slug: fields.slug.clone(),
            overview: fields.overview.clone(),
            created_at: now,
        })
    }

    async fn update(&self, id: i64, fields: &CourseFields) -> Result<()> {
        let sql = "UPDATE courses SET subject_id = ?, title = ?, slug = ?, overview = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(fields.subject_id)
                    .bind(&fields.title)
                    .bind(&fields.slug)
                    .bind(&fields.overview)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update course")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(fields.subject_id)
                    .bind(&fields.title)
                    .bind(&fields.slug)
                    .bind(&fields.overview)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update course")?;
            }
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>> {
        self.fetch_one_where("id", CourseKey::Id(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        self.fetch_one_where("slug", CourseKey::Slug(slug)).await
    }

    async fn slug_taken(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        Ok(match self.get_by_slug(slug).await? {
            Some(course) => Some(course.id) != exclude_id,
            None => false,
        })
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Course>> {
        let sql = format!("{} WHERE owner_id = ? {}", SELECT_COURSE, NEWEST_FIRST);
        self.fetch_all(&sql, Some(owner_id)).await
    }

    async fn list(&self, subject_id: Option<i64>) -> Result<Vec<Course>> {
        let sql = match subject_id {
            Some(_) => format!("{} WHERE subject_id = ? {}", SELECT_COURSE, NEWEST_FIRST),
            None => format!("{} {}", SELECT_COURSE, NEWEST_FIRST),
        };
        self.fetch_all(&sql, subject_id).await
    }

    async fn delete_cascade(&self, id: i64) -> Result<()> {
        let delete_modules = "DELETE FROM modules WHERE course_id = ?";
        let delete_course = "DELETE FROM courses WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                purge_contents_sqlite(&mut tx, ContentFilter::Course(id)).await?;
                sqlx::query(delete_modules)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete course modules")?;
                sqlx::query(delete_course)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete course")?;
                tx.commit().await.context("Failed to commit course deletion")?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                purge_contents_mysql(&mut tx, ContentFilter::Course(id)).await?;
                sqlx::query(delete_modules)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete course modules")?;
                sqlx::query(delete_course)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to delete course")?;
                tx.commit().await.context("Failed to commit course deletion")?;
            }
        }
        Ok(())
    }

    async fn owner_of(&self, course_id: i64) -> Result<Option<i64>> {
        Ok(self.get_by_id(course_id).await?.map(|course| course.owner_id))
    }

    async fn enroll(&self, course_id: i64, user_id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("INSERT OR IGNORE INTO course_students (course_id, user_id) VALUES (?, ?)")
                    .bind(course_id)
                    .bind(user_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to enroll student")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query("INSERT IGNORE INTO course_students (course_id, user_id) VALUES (?, ?)")
                    .bind(course_id)
                    .bind(user_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to enroll student")?;
            }
        }
        Ok(())
    }

    async fn is_enrolled(&self, course_id: i64, user_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS n FROM course_students WHERE course_id = ? AND user_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(course_id)
                .bind(user_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check enrollment")?
                .get("n"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(course_id)
                .bind(user_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check enrollment")?
                .get("n"),
        };
        Ok(count > 0)
    }

    async fn list_enrolled(&self, user_id: i64) -> Result<Vec<Course>> {
        let sql = format!(
            "{} WHERE id IN (SELECT course_id FROM course_students WHERE user_id = ?) {}",
            SELECT_COURSE, NEWEST_FIRST
        );
        self.fetch_all(&sql, Some(user_id)).await
    }
}

fn row_to_course_sqlite(row: &sqlx::sqlite::SqliteRow) -> Course {
    Course {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        subject_id: row.get("subject_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        overview: row.get("overview"),
        created_at: row.get("created_at"),
    }
}

fn row_to_course_mysql(row: &sqlx::mysql::MySqlRow) -> Course {
    Course {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        subject_id: row.get("subject_id"),
        title: row.get("title"),
        slug: row.get("slug"),
        overview: row.get("overview"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ContentRepository, ModuleRepository, SqlxContentRepository, SqlxModuleRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ItemFields, ItemKind};

    async fn setup() -> (DynDatabasePool, SqlxCourseRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        for sql in [
            "INSERT INTO users (username, email, password_hash, role) VALUES ('a', 'a@x.io', 'h', 'instructor')",
            "INSERT INTO users (username, email, password_hash, role) VALUES ('s', 's@x.io', 'h', 'student')",
            "INSERT INTO subjects (title, slug) VALUES ('Math', 'math')",
            "INSERT INTO subjects (title, slug) VALUES ('Music', 'music')",
        ] {
            pool.execute(sql).await.unwrap();
        }
        (pool.clone(), SqlxCourseRepository::new(pool))
    }

    fn fields(subject_id: i64, slug: &str) -> CourseFields {
        CourseFields {
            subject_id,
            title: slug.to_uppercase(),
            slug: slug.to_string(),
            overview: format!("About {}", slug),
        }
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let (_pool, repo) = setup().await;
        let course = repo.create(1, &fields(1, "algebra")).await.unwrap();
        assert_eq!(course.owner_id, 1);

        let mut changed = fields(2, "harmony");
        changed.overview = "Chords".to_string();
        repo.update(course.id, &changed).await.unwrap();

        let loaded = repo.get_by_slug("harmony").await.unwrap().unwrap();
        assert_eq!(loaded.id, course.id);
        assert_eq!(loaded.subject_id, 2);
        assert_eq!(loaded.overview, "Chords");
        assert!(repo.get_by_slug("algebra").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_slug_taken_excludes_self() {
        let (_pool, repo) = setup().await;
        let course = repo.create(1, &fields(1, "algebra")).await.unwrap();

        assert!(repo.slug_taken("algebra", None).await.unwrap());
        assert!(!repo.slug_taken("algebra", Some(course.id)).await.unwrap());
        assert!(!repo.slug_taken("geometry", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_newest_first_and_by_subject() {
        let (_pool, repo) = setup().await;
        let a = repo.create(1, &fields(1, "a")).await.unwrap();
        let b = repo.create(1, &fields(2, "b")).await.unwrap();
        let c = repo.create(1, &fields(1, "c")).await.unwrap();

        let ids: Vec<i64> = repo.list_by_owner(1).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        let ids: Vec<i64> = repo.list(Some(1)).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![c.id, a.id]);

        assert_eq!(repo.list(None).await.unwrap().len(), 3);
        assert!(repo.list_by_owner(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enrollment() {
        let (_pool, repo) = setup().await;
        let course = repo.create(1, &fields(1, "algebra")).await.unwrap();

        assert!(!repo.is_enrolled(course.id, 2).await.unwrap());
        repo.enroll(course.id, 2).await.unwrap();
        repo.enroll(course.id, 2).await.unwrap();
        assert!(repo.is_enrolled(course.id, 2).await.unwrap());

        let enrolled = repo.list_enrolled(2).await.unwrap();
        assert_eq!(enrolled.len(), 1);
        assert_eq!(enrolled[0].id, course.id);
    }

    #[tokio::test]
    async fn test_delete_cascade_leaves_no_items() {
        let (pool, repo) = setup().await;
        let course = repo.create(1, &fields(1, "algebra")).await.unwrap();
        let modules = SqlxModuleRepository::new(pool.clone());
        let contents = SqlxContentRepository::new(pool.clone());
        let module = modules.create(course.id, "m", "", 0).await.unwrap();
        for kind in [ItemKind::Text, ItemKind::Video] {
            contents
                .create_with_item(
                    module.id,
                    kind,
                    1,
                    &ItemFields {
                        title: "x".to_string(),
                        payload: Some("y".to_string()),
                    },
                    0,
                )
                .await
                .unwrap();
        }

        repo.delete_cascade(course.id).await.unwrap();

        assert!(repo.get_by_id(course.id).await.unwrap().is_none());
        assert!(modules.get_by_id(module.id).await.unwrap().is_none());
        for table in ["items_text", "items_video", "contents"] {
            let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
                .fetch_one(pool.sqlite().unwrap())
                .await
                .unwrap();
            let n: i64 = row.get("n");
            assert_eq!(n, 0, "{} not empty", table);
        }
    }
}
