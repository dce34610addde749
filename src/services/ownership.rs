//! Ownership checks for courses and everything under them
//!
//! Each resource kind has a resolver that finds the owner of the course it
//! belongs to. A resource that doesn't exist and one owned by someone else
//! both come back as `NotFound`, so callers cannot tell which ids exist.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::repositories::{ContentRepository, CourseRepository, ModuleRepository};
use crate::services::course::CourseServiceError;

/// Finds the owner of the course a resource belongs to
#[async_trait]
pub trait OwnerResolver: Send + Sync {
    async fn resolve_owner(&self, id: i64) -> anyhow::Result<Option<i64>>;
}

pub struct CourseOwner(pub Arc<dyn CourseRepository>);

pub struct ModuleOwner(pub Arc<dyn ModuleRepository>);

pub struct ContentOwner(pub Arc<dyn ContentRepository>);

#[async_trait]
impl OwnerResolver for CourseOwner {
    async fn resolve_owner(&self, id: i64) -> anyhow::Result<Option<i64>> {
        self.0.owner_of(id).await
    }
}

#[async_trait]
impl OwnerResolver for ModuleOwner {
    async fn resolve_owner(&self, id: i64) -> anyhow::Result<Option<i64>> {
        self.0.owner_of(id).await
    }
}

#[async_trait]
impl OwnerResolver for ContentOwner {
    async fn resolve_owner(&self, id: i64) -> anyhow::Result<Option<i64>> {
        self.0.owner_of(id).await
    }
}

/// `Ok` when `requester` owns the course behind `id`
pub async fn ensure_owner<R>(resolver: &R, id: i64, requester: i64) -> Result<(), CourseServiceError>
where
    R: OwnerResolver + ?Sized,
{
    match resolver.resolve_owner(id).await? {
        Some(owner) if owner == requester => Ok(()),
        _ => Err(CourseServiceError::NotFound),
    }
}
