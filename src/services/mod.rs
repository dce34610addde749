//! Services layer - Business logic
//!
//! Services implement the rules of the course platform on top of the
//! repositories:
//! - ownership checks and permission roles
//! - scoped ordering of modules and contents
//! - form validation with field-level errors
//! - media storage and per-kind rendering of items

pub mod content;
pub mod course;
pub mod markdown;
pub mod module;
pub mod ownership;
pub mod password;
pub mod render;
pub mod storage;
pub mod subject;
pub mod user;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use content::{ContentService, ItemForm, ModuleContents, RenderedContent};
pub use course::{CourseDetail, CourseService, CourseServiceError};
pub use markdown::MarkdownRenderer;
pub use module::{parse_formset, ModuleService};
pub use ownership::{ensure_owner, ContentOwner, CourseOwner, ModuleOwner, OwnerResolver};
pub use password::{hash_password, verify_password};
pub use render::{embed_url, Presentation, Render};
pub use storage::{MediaStorage, Upload};
pub use subject::SubjectService;
pub use user::{UserService, UserServiceError};
pub use validation::FormErrors;
