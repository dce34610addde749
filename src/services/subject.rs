//! Subject service
//!
//! The subject list (with course counts) is read on every catalogue page
//! and cached until a subject or course changes.

use anyhow::Context;
use std::sync::Arc;

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::SubjectRepository;
use crate::models::{Subject, SubjectInput, SubjectWithCount, User};
use crate::services::course::{CourseServiceError, CATALOGUE_CACHE_PREFIX};
use crate::services::validation::{is_valid_slug, FormErrors};

pub(crate) const SUBJECTS_CACHE_KEY: &str = "subjects";

pub struct SubjectService {
    repo: Arc<dyn SubjectRepository>,
    cache: Arc<Cache>,
}

impl SubjectService {
    pub fn new(repo: Arc<dyn SubjectRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    /// All subjects ordered by title, each with its number of courses
    pub async fn list(&self) -> Result<Vec<SubjectWithCount>, CourseServiceError> {
        match self.cache.get::<Vec<SubjectWithCount>>(SUBJECTS_CACHE_KEY).await {
            Ok(Some(subjects)) => return Ok(subjects),
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable subject cache: {:#}", e),
        }

        let subjects = self
            .repo
            .list_with_counts()
            .await
            .context("Failed to list subjects")?;

        if let Err(e) = self.cache.set(SUBJECTS_CACHE_KEY, &subjects).await {
            tracing::warn!("Failed to cache subjects: {:#}", e);
        }
        Ok(subjects)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Subject, CourseServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get subject")?
            .ok_or(CourseServiceError::NotFound)
    }

    /// Create a subject. Admins only.
    pub async fn create(&self, user: &User, input: &SubjectInput) -> Result<Subject, CourseServiceError> {
        if !user.is_admin() {
            return Err(CourseServiceError::Forbidden);
        }

        let title = input.title.trim();
        let slug = input.slug.trim();

        let mut errors = FormErrors::new();
        errors.require("title", title);
        errors.max_length("title", title, 200);
        errors.require("slug", slug);
        errors.max_length("slug", slug, 200);
        if !slug.is_empty() && !is_valid_slug(slug) {
            errors.add(
                "slug",
                "Enter a valid \u{201c}slug\u{201d} consisting of lowercase letters, numbers, underscores or hyphens.",
            );
        }
        if !errors.contains("slug")
            && self
                .repo
                .get_by_slug(slug)
                .await
                .context("Failed to check subject slug")?
                .is_some()
        {
            errors.add("slug", "Subject with this Slug already exists.");
        }
        if !errors.is_empty() {
            return Err(CourseServiceError::Validation(errors));
        }

        let subject = self
            .repo
            .create(title, slug)
            .await
            .context("Failed to create subject")?;

        if let Err(e) = self.cache.delete(SUBJECTS_CACHE_KEY).await {
            tracing::warn!("Failed to invalidate subject cache: {:#}", e);
        }
        if let Err(e) = self.cache.delete_prefix(CATALOGUE_CACHE_PREFIX).await {
            tracing::warn!("Failed to invalidate catalogue cache: {:#}", e);
        }

        tracing::info!("Created subject {}", subject.slug);
        Ok(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::services::testing::Fixture;

    fn input(title: &str, slug: &str) -> SubjectInput {
        SubjectInput {
            title: title.to_string(),
            slug: slug.to_string(),
        }
    }

    #[tokio::test]
    async fn test_admin_creates_subject_and_list_refreshes() {
        let fx = Fixture::new().await;
        let admin = fx.user("root", UserRole::Admin).await;

        let before = fx.subjects.list().await.unwrap();
        assert_eq!(before.len(), 1);

        fx.subjects.create(&admin, &input("Algebra", "algebra")).await.unwrap();

        let after = fx.subjects.list().await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].subject.slug, "algebra");
        assert_eq!(after[0].total_courses, 0);
    }

    #[tokio::test]
    async fn test_instructor_cannot_create_subject() {
        let fx = Fixture::new().await;
        let instructor = fx.user("ada", UserRole::Instructor).await;

        assert!(matches!(
            fx.subjects.create(&instructor, &input("Physics", "physics")).await,
            Err(CourseServiceError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_subject_validation() {
        let fx = Fixture::new().await;
        let admin = fx.user("root", UserRole::Admin).await;

        let err = fx
            .subjects
            .create(&admin, &input("", &fx.subject.slug))
            .await
            .unwrap_err();
        match err {
            CourseServiceError::Validation(errors) => {
                assert!(errors.contains("title"));
                assert!(errors.contains("slug"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        assert!(matches!(
            fx.subjects.create(&admin, &input("Bad", "Bad Slug")).await,
            Err(CourseServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_by_slug() {
        let fx = Fixture::new().await;
        assert_eq!(fx.subjects.get_by_slug(&fx.subject.slug).await.unwrap().id, fx.subject.id);
        assert!(matches!(
            fx.subjects.get_by_slug("nope").await,
            Err(CourseServiceError::NotFound)
        ));
    }
}
