//! Course model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course owned by one instructor. Listed newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    /// The instructor that created the course
    pub owner_id: i64,
    pub subject_id: i64,
    pub title: String,
    /// URL-friendly identifier (unique)
    pub slug: String,
    pub overview: String,
    pub created_at: DateTime<Utc>,
}

/// Editable course fields.
///
/// The owner is always the requester and is never read from the form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseInput {
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub overview: String,
}

/// Validated course fields ready to be written
#[derive(Debug, Clone)]
pub struct CourseFields {
    pub subject_id: i64,
    pub title: String,
    pub slug: String,
    pub overview: String,
}
