//! Shared setup for service tests

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::cache::create_cache;
use crate::config::{CacheConfig, UploadConfig};
use crate::db::repositories::*;
use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::models::{Course, CourseInput, Subject, User, UserRole};
use crate::services::{ContentService, CourseService, MediaStorage, ModuleService, SubjectService};

pub(crate) struct Fixture {
    pub pool: DynDatabasePool,
    pub subject: Subject,
    pub courses: CourseService,
    pub subjects: SubjectService,
    pub modules: ModuleService,
    pub contents: ContentService,
    media: TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let media = TempDir::new().expect("Failed to create media dir");
        let storage = Arc::new(MediaStorage::new(&UploadConfig {
            path: media.path().to_path_buf(),
            ..UploadConfig::default()
        }));
        let cache = create_cache(&CacheConfig::default());

        let course_repo = SqlxCourseRepository::boxed(pool.clone());
        let subject_repo = SqlxSubjectRepository::boxed(pool.clone());
        let module_repo = SqlxModuleRepository::boxed(pool.clone());
        let content_repo = SqlxContentRepository::boxed(pool.clone());
        let item_repo = SqlxItemRepository::boxed(pool.clone());
        let ordering = SqlxOrderingRepository::boxed(pool.clone());

        let subject = subject_repo
            .create("Mathematics", "mathematics")
            .await
            .expect("Failed to create subject");

        Self {
            courses: CourseService::new(
                course_repo.clone(),
                subject_repo.clone(),
                module_repo.clone(),
                content_repo.clone(),
                item_repo.clone(),
                storage.clone(),
                cache.clone(),
            ),
            subjects: SubjectService::new(subject_repo, cache),
            modules: ModuleService::new(
                module_repo.clone(),
                course_repo.clone(),
                content_repo.clone(),
                item_repo.clone(),
                ordering.clone(),
                storage.clone(),
            ),
            contents: ContentService::new(content_repo, item_repo, module_repo, course_repo, ordering, storage),
            pool,
            subject,
            media,
        }
    }

    /// Insert a user directly, skipping password hashing
    pub async fn user(&self, username: &str, role: UserRole) -> User {
        SqlxUserRepository::new(self.pool.clone())
            .create(&User::new(
                username.to_string(),
                format!("{}@example.com", username),
                "not-a-real-hash".to_string(),
                role,
            ))
            .await
            .expect("Failed to create user")
    }

    pub async fn course(&self, owner: &User, slug: &str) -> Course {
        self.courses
            .create(
                owner,
                &CourseInput {
                    subject_id: self.subject.id.to_string(),
                    title: format!("Course {}", slug),
                    slug: slug.to_string(),
                    overview: "Overview".to_string(),
                },
            )
            .await
            .expect("Failed to create course")
    }

    pub fn media_root(&self) -> &Path {
        self.media.path()
    }
}
