//! Module service
//!
//! Modules are managed through a formset: one form row per existing module
//! plus blank rows for new ones, each row optionally marked for deletion.

use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::db::repositories::{
    ContentRepository, CourseRepository, ItemRepository, ModuleRepository, OrderScope, Ordered,
    OrderingRepository,
};
use crate::models::{Course, Module, ModuleFormRow, NewModule};
use crate::services::content::stored_files;
use crate::services::course::CourseServiceError;
use crate::services::ownership::{ensure_owner, CourseOwner, ModuleOwner};
use crate::services::storage::MediaStorage;
use crate::services::validation::FormErrors;

/// Blank rows appended to the formset for new modules
pub const EXTRA_FORMS: usize = 2;

/// Upper bound on `form-TOTAL_FORMS`
pub const MAX_FORMS: usize = 1000;

const FORMSET_PREFIX: &str = "form";

pub struct ModuleService {
    module_repo: Arc<dyn ModuleRepository>,
    course_repo: Arc<dyn CourseRepository>,
    content_repo: Arc<dyn ContentRepository>,
    item_repo: Arc<dyn ItemRepository>,
    ordering: Arc<dyn OrderingRepository>,
    storage: Arc<MediaStorage>,
}

impl ModuleService {
    pub fn new(
        module_repo: Arc<dyn ModuleRepository>,
        course_repo: Arc<dyn CourseRepository>,
        content_repo: Arc<dyn ContentRepository>,
        item_repo: Arc<dyn ItemRepository>,
        ordering: Arc<dyn OrderingRepository>,
        storage: Arc<MediaStorage>,
    ) -> Self {
        Self {
            module_repo,
            course_repo,
            content_repo,
            item_repo,
            ordering,
            storage,
        }
    }

    /// An owned course with its modules in order
    pub async fn list(&self, course_id: i64, requester: i64) -> Result<(Course, Vec<Module>), CourseServiceError> {
        let course = self.owned_course(course_id, requester).await?;
        let modules = self
            .module_repo
            .list_by_course(course_id)
            .await
            .context("Failed to list modules")?;
        Ok((course, modules))
    }

    /// A module, if the requester owns its course
    pub async fn get_owned(&self, module_id: i64, requester: i64) -> Result<Module, CourseServiceError> {
        ensure_owner(&ModuleOwner(self.module_repo.clone()), module_id, requester).await?;
        self.module_repo
            .get_by_id(module_id)
            .await
            .context("Failed to get module")?
            .ok_or(CourseServiceError::NotFound)
    }

    /// Create a module. Without an explicit order it goes after its
    /// current siblings.
    pub async fn create(&self, new: NewModule, requester: i64) -> Result<Module, CourseServiceError> {
        self.owned_course(new.course_id, requester).await?;

        let mut errors = FormErrors::new();
        validate_module_fields(&mut errors, &new.title);
        if !errors.is_empty() {
            return Err(CourseServiceError::Validation(errors));
        }

        self.insert(new.course_id, new.title.trim(), new.description.trim(), new.order)
            .await
    }

    pub async fn update(
        &self,
        module_id: i64,
        requester: i64,
        title: &str,
        description: &str,
    ) -> Result<Module, CourseServiceError> {
        let module = self.get_owned(module_id, requester).await?;

        let mut errors = FormErrors::new();
        validate_module_fields(&mut errors, title);
        if !errors.is_empty() {
            return Err(CourseServiceError::Validation(errors));
        }

        self.module_repo
            .update(module_id, title.trim(), description.trim())
            .await
            .context("Failed to update module")?;

        Ok(Module {
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            ..module
        })
    }

    /// Delete a module with its contents and items
    pub async fn delete(&self, module_id: i64, requester: i64) -> Result<(), CourseServiceError> {
        self.get_owned(module_id, requester).await?;
        let files = self.delete_unchecked(module_id).await?;
        self.remove_files(files).await;
        Ok(())
    }

    /// Form rows for the course's modules followed by blank extra rows
    pub fn formset_rows(modules: &[Module]) -> Vec<ModuleFormRow> {
        modules
            .iter()
            .map(|m| ModuleFormRow {
                id: Some(m.id),
                title: m.title.clone(),
                description: m.description.clone(),
                delete: false,
            })
            .chain(std::iter::repeat_with(ModuleFormRow::default).take(EXTRA_FORMS))
            .collect()
    }

    /// Validate and apply a submitted formset.
    ///
    /// Rows are checked before anything is written. Existing rows are
    /// updated or deleted, filled blank rows become new modules at the end
    /// of the course, untouched blank rows are ignored.
    pub async fn apply_formset(
        &self,
        course_id: i64,
        requester: i64,
        rows: &[ModuleFormRow],
    ) -> Result<Vec<Module>, CourseServiceError> {
        self.owned_course(course_id, requester).await?;

        let existing: HashMap<i64, Module> = self
            .module_repo
            .list_by_course(course_id)
            .await
            .context("Failed to list modules")?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let mut errors = FormErrors::new();
        for (index, row) in rows.iter().enumerate() {
            if row.is_blank() || row.delete {
                continue;
            }
            let mut row_errors = FormErrors::new();
            if let Some(id) = row.id {
                if !existing.contains_key(&id) {
                    row_errors.add("id", "Select a valid choice. That choice is not one of the available choices.");
                }
            }
            validate_module_fields(&mut row_errors, &row.title);
            errors.merge(row_errors.prefixed(&format!("{}-{}-", FORMSET_PREFIX, index)));
        }
        if !errors.is_empty() {
            return Err(CourseServiceError::Validation(errors));
        }

        let mut files = Vec::new();
        for row in rows {
            match (row.id, row.delete) {
                (Some(id), true) if existing.contains_key(&id) => {
                    files.extend(self.delete_unchecked(id).await?);
                }
                (Some(id), false) => {
                    let Some(current) = existing.get(&id) else {
                        continue;
                    };
                    let (title, description) = (row.title.trim(), row.description.trim());
                    if current.title != title || current.description != description {
                        self.module_repo
                            .update(id, title, description)
                            .await
                            .context("Failed to update module")?;
                    }
                }
                (None, false) if !row.is_blank() => {
                    self.insert(course_id, row.title.trim(), row.description.trim(), None)
                        .await?;
                }
                _ => {}
            }
        }
        self.remove_files(files).await;

        Ok(self
            .module_repo
            .list_by_course(course_id)
            .await
            .context("Failed to list modules")?)
    }

    /// Apply `{ "<module id>": order }` pairs. Ids that aren't numbers or
    /// aren't in one of the requester's courses are skipped.
    pub async fn reorder(&self, requester: i64, orders: &BTreeMap<String, i32>) -> Result<usize, CourseServiceError> {
        apply_reorder(self.ordering.as_ref(), Ordered::Module, requester, orders).await
    }

    async fn owned_course(&self, course_id: i64, requester: i64) -> Result<Course, CourseServiceError> {
        ensure_owner(&CourseOwner(self.course_repo.clone()), course_id, requester).await?;
        self.course_repo
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or(CourseServiceError::NotFound)
    }

    async fn insert(
        &self,
        course_id: i64,
        title: &str,
        description: &str,
        order: Option<i32>,
    ) -> Result<Module, CourseServiceError> {
        let order = match order {
            Some(order) => order,
            None => self
                .ordering
                .next_order_in_scope(OrderScope::Course(course_id))
                .await
                .context("Failed to compute module order")?,
        };

        let module = self
            .module_repo
            .create(course_id, title, description, order)
            .await
            .context("Failed to create module")?;
        tracing::debug!("Created module {} in course {} at {}", module.id, course_id, order);
        Ok(module)
    }

    /// Delete without an ownership check, returning the stored files to
    /// remove once the rows are gone
    async fn delete_unchecked(&self, module_id: i64) -> Result<Vec<String>, CourseServiceError> {
        let files = stored_files(self.content_repo.as_ref(), self.item_repo.as_ref(), &[module_id]).await?;
        self.module_repo
            .delete_cascade(module_id)
            .await
            .context("Failed to delete module")?;
        Ok(files)
    }

    async fn remove_files(&self, files: Vec<String>) {
        for file in files {
            self.storage.remove(&file).await;
        }
    }
}

/// Shared by the module and content reorder endpoints
pub(crate) async fn apply_reorder(
    ordering: &dyn OrderingRepository,
    ordered: Ordered,
    requester: i64,
    orders: &BTreeMap<String, i32>,
) -> Result<usize, CourseServiceError> {
    let mut applied = 0;
    for (key, order) in orders {
        let Ok(id) = key.trim().parse::<i64>() else {
            continue;
        };
        if ordering
            .set_order_if_owned(ordered, id, *order, requester)
            .await
            .context("Failed to update order")?
        {
            applied += 1;
        }
    }

    if applied < orders.len() {
        tracing::debug!(
            "Reorder of {:?} by user {}: applied {} of {}",
            ordered,
            requester,
            applied,
            orders.len()
        );
    }
    Ok(applied)
}

fn validate_module_fields(errors: &mut FormErrors, title: &str) {
    errors.require("title", title);
    errors.max_length("title", title.trim(), 200);
}

/// Read formset rows from submitted form fields.
///
/// Expects `form-TOTAL_FORMS` and, per row `N`, the optional fields
/// `form-N-id`, `form-N-title`, `form-N-description` and `form-N-DELETE`.
pub fn parse_formset(fields: &HashMap<String, String>) -> Result<Vec<ModuleFormRow>, FormErrors> {
    let total = fields
        .get(&format!("{}-TOTAL_FORMS", FORMSET_PREFIX))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            let mut errors = FormErrors::new();
            errors.add(
                FormErrors::NON_FIELD,
                "ManagementForm data is missing or has been tampered with.",
            );
            errors
        })?;

    if total > MAX_FORMS {
        let mut errors = FormErrors::new();
        errors.add(
            FormErrors::NON_FIELD,
            format!("Please submit at most {} forms.", MAX_FORMS),
        );
        return Err(errors);
    }

    let field = |index: usize, name: &str| {
        fields
            .get(&format!("{}-{}-{}", FORMSET_PREFIX, index, name))
            .map(String::as_str)
            .unwrap_or("")
    };

    let mut errors = FormErrors::new();
    let mut rows = Vec::with_capacity(total);
    for index in 0..total {
        let id = match field(index, "id").trim() {
            "" => None,
            raw => match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add(
                        &format!("{}-{}-id", FORMSET_PREFIX, index),
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    None
                }
            },
        };

        rows.push(ModuleFormRow {
            id,
            title: field(index, "title").to_string(),
            description: field(index, "description").to_string(),
            delete: matches!(field(index, "DELETE"), "on" | "true" | "1"),
        });
    }

    if errors.is_empty() {
        Ok(rows)
    } else {
        Err(errors)
    }
}
