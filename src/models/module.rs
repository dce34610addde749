//! Module model

use serde::{Deserialize, Serialize};

/// An ordered section of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
    /// Position within the course, assigned on creation
    pub order: i32,
}

/// Fields for a new module. `order: None` appends to the end of the course.
#[derive(Debug, Clone)]
pub struct NewModule {
    pub course_id: i64,
    pub title: String,
    pub description: String,
    pub order: Option<i32>,
}

/// One row of the module formset posted by the course module editor.
///
/// `id: None` is an extra (new) row; `delete` marks an existing row for
/// removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModuleFormRow {
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub delete: bool,
}

impl ModuleFormRow {
    /// An extra row left blank is ignored rather than rejected
    pub fn is_blank(&self) -> bool {
        self.id.is_none() && self.title.trim().is_empty() && self.description.trim().is_empty()
    }
}
