//! Subject model

use serde::{Deserialize, Serialize};

/// A catalogue category grouping courses. Listed by title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub title: String,
    /// URL-friendly identifier (unique)
    pub slug: String,
}

/// Subject with the number of courses filed under it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectWithCount {
    #[serde(flatten)]
    pub subject: Subject,
    pub total_courses: i64,
}

/// Input for creating a subject
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
}
