//! Course service
//!
//! Instructor-side course management filtered to the requester's own
//! courses, plus the public catalogue and student enrollment.

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{
    ContentRepository, CourseRepository, ItemRepository, ModuleRepository, SubjectRepository,
};
use crate::models::{Course, CourseFields, CourseInput, Module, Subject, User};
use crate::services::content::stored_files;
use crate::services::ownership::{ensure_owner, CourseOwner};
use crate::services::storage::MediaStorage;
use crate::services::subject::SUBJECTS_CACHE_KEY;
use crate::services::validation::{is_valid_slug, FormErrors};

pub(crate) const CATALOGUE_CACHE_PREFIX: &str = "catalogue:";

/// Errors of the course management operations (courses, modules, contents)
#[derive(Debug, thiserror::Error)]
pub enum CourseServiceError {
    /// Missing, or owned by someone else
    #[error("Not found")]
    NotFound,

    /// The requester lacks the role for this operation
    #[error("Permission denied")]
    Forbidden,

    #[error("Invalid content kind: {0}")]
    InvalidKind(String),

    #[error("Validation error: {0}")]
    Validation(FormErrors),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<crate::models::InvalidKind> for CourseServiceError {
    fn from(err: crate::models::InvalidKind) -> Self {
        CourseServiceError::InvalidKind(err.0)
    }
}

/// A course with what its public page shows
#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    pub course: Course,
    pub subject: Option<Subject>,
    pub modules: Vec<Module>,
}

pub struct CourseService {
    course_repo: Arc<dyn CourseRepository>,
    subject_repo: Arc<dyn SubjectRepository>,
    module_repo: Arc<dyn ModuleRepository>,
    content_repo: Arc<dyn ContentRepository>,
    item_repo: Arc<dyn ItemRepository>,
    storage: Arc<MediaStorage>,
    cache: Arc<Cache>,
}

impl CourseService {
    pub fn new(
        course_repo: Arc<dyn CourseRepository>,
        subject_repo: Arc<dyn SubjectRepository>,
        module_repo: Arc<dyn ModuleRepository>,
        content_repo: Arc<dyn ContentRepository>,
        item_repo: Arc<dyn ItemRepository>,
        storage: Arc<MediaStorage>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            course_repo,
            subject_repo,
            module_repo,
            content_repo,
            item_repo,
            storage,
            cache,
        }
    }

    /// Courses owned by the requester, newest first
    pub async fn list_owned(&self, user: &User) -> Result<Vec<Course>, CourseServiceError> {
        Ok(self
            .course_repo
            .list_by_owner(user.id)
            .await
            .context("Failed to list courses")?)
    }

    /// A course, if the requester owns it
    pub async fn get_owned(&self, id: i64, requester: i64) -> Result<Course, CourseServiceError> {
        ensure_owner(&CourseOwner(self.course_repo.clone()), id, requester).await?;
        self.course_repo
            .get_by_id(id)
            .await
            .context("Failed to get course")?
            .ok_or(CourseServiceError::NotFound)
    }

    pub async fn create(&self, user: &User, input: &CourseInput) -> Result<Course, CourseServiceError> {
        require_instructor(user)?;
        let fields = self.validate(input, None).await?;

        let course = self
            .course_repo
            .create(user.id, &fields)
            .await
            .context("Failed to create course")?;
        self.invalidate_catalogue().await;

        tracing::info!("User {} created course {} ({})", user.id, course.id, course.slug);
        Ok(course)
    }

    pub async fn update(&self, id: i64, user: &User, input: &CourseInput) -> Result<Course, CourseServiceError> {
        require_instructor(user)?;
        let existing = self.get_owned(id, user.id).await?;
        let fields = self.validate(input, Some(id)).await?;

        self.course_repo
            .update(id, &fields)
            .await
            .context("Failed to update course")?;
        self.invalidate_catalogue().await;

        Ok(Course {
            subject_id: fields.subject_id,
            title: fields.title,
            slug: fields.slug,
            overview: fields.overview,
            ..existing
        })
    }

    /// Delete a course with its modules, contents and items. Uploaded files
    /// are removed afterwards.
    pub async fn delete(&self, id: i64, user: &User) -> Result<(), CourseServiceError> {
        require_instructor(user)?;
        self.get_owned(id, user.id).await?;

        let module_ids: Vec<i64> = self
            .module_repo
            .list_by_course(id)
            .await
            .context("Failed to list modules")?
            .into_iter()
            .map(|m| m.id)
            .collect();
        let files = stored_files(self.content_repo.as_ref(), self.item_repo.as_ref(), &module_ids).await?;

        self.course_repo
            .delete_cascade(id)
            .await
            .context("Failed to delete course")?;
        self.invalidate_catalogue().await;

        for file in files {
            self.storage.remove(&file).await;
        }

        tracing::info!("User {} deleted course {}", user.id, id);
        Ok(())
    }

    /// Public catalogue, optionally restricted to one subject
    pub async fn catalogue(&self, subject_id: Option<i64>) -> Result<Vec<Course>, CourseServiceError> {
        let key = match subject_id {
            Some(id) => format!("{}{}", CATALOGUE_CACHE_PREFIX, id),
            None => format!("{}all", CATALOGUE_CACHE_PREFIX),
        };

        match self.cache.get::<Vec<Course>>(&key).await {
            Ok(Some(courses)) => return Ok(courses),
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring unreadable cache entry {}: {:#}", key, e),
        }

        let courses = self
            .course_repo
            .list(subject_id)
            .await
            .context("Failed to list courses")?;

        if let Err(e) = self.cache.set(&key, &courses).await {
            tracing::warn!("Failed to cache {}: {:#}", key, e);
        }
        Ok(courses)
    }

    /// Public course page by slug
    pub async fn detail(&self, slug: &str) -> Result<CourseDetail, CourseServiceError> {
        let course = self
            .course_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get course")?
            .ok_or(CourseServiceError::NotFound)?;

        let subject = self
            .subject_repo
            .get_by_id(course.subject_id)
            .await
            .context("Failed to get subject")?;
        let modules = self
            .module_repo
            .list_by_course(course.id)
            .await
            .context("Failed to list modules")?;

        Ok(CourseDetail {
            course,
            subject,
            modules,
        })
    }

    /// Enroll a user in a course. Enrolling twice is a no-op.
    pub async fn enroll(&self, course_id: i64, user: &User) -> Result<Course, CourseServiceError> {
        let course = self
            .course_repo
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or(CourseServiceError::NotFound)?;

        self.course_repo
            .enroll(course_id, user.id)
            .await
            .context("Failed to enroll")?;

        tracing::info!("User {} enrolled in course {}", user.id, course_id);
        Ok(course)
    }

    pub async fn is_enrolled(&self, course_id: i64, user_id: i64) -> Result<bool, CourseServiceError> {
        Ok(self
            .course_repo
            .is_enrolled(course_id, user_id)
            .await
            .context("Failed to check enrollment")?)
    }

    /// Courses the user is enrolled in
    pub async fn enrolled(&self, user: &User) -> Result<Vec<Course>, CourseServiceError> {
        Ok(self
            .course_repo
            .list_enrolled(user.id)
            .await
            .context("Failed to list enrolled courses")?)
    }

    async fn validate(&self, input: &CourseInput, exclude_id: Option<i64>) -> Result<CourseFields, CourseServiceError> {
        let mut errors = FormErrors::new();

        let subject_id = match input.subject_id.trim() {
            "" => {
                errors.add("subject_id", "This field is required.");
                None
            }
            raw => match raw.parse::<i64>() {
                Ok(id) => {
                    let exists = self
                        .subject_repo
                        .get_by_id(id)
                        .await
                        .context("Failed to get subject")?
                        .is_some();
                    if exists {
                        Some(id)
                    } else {
                        errors.add("subject_id", INVALID_CHOICE);
                        None
                    }
                }
                Err(_) => {
                    errors.add("subject_id", INVALID_CHOICE);
                    None
                }
            },
        };

        let title = input.title.trim();
        errors.require("title", title);
        errors.max_length("title", title, 200);

        let slug = input.slug.trim();
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
                .course_repo
                .slug_taken(slug, exclude_id)
                .await
                .context("Failed to check course slug")?
        {
            errors.add("slug", "Course with this Slug already exists.");
        }

        errors.require("overview", &input.overview);

        match subject_id {
            Some(subject_id) if errors.is_empty() => Ok(CourseFields {
                subject_id,
                title: title.to_string(),
                slug: slug.to_string(),
                overview: input.overview.trim().to_string(),
            }),
            _ => Err(CourseServiceError::Validation(errors)),
        }
    }

    async fn invalidate_catalogue(&self) {
        if let Err(e) = self.cache.delete_prefix(CATALOGUE_CACHE_PREFIX).await {
            tracing::warn!("Failed to invalidate catalogue cache: {:#}", e);
        }
        // subject list carries course counts
        if let Err(e) = self.cache.delete(SUBJECTS_CACHE_KEY).await {
            tracing::warn!("Failed to invalidate subject cache: {:#}", e);
        }
    }
}

const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

fn require_instructor(user: &User) -> Result<(), CourseServiceError> {
    if user.is_instructor() {
        Ok(())
    } else {
        Err(CourseServiceError::Forbidden)
    }
}
