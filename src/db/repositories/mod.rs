//! Database repositories
//!
//! One repository per entity, each a trait plus an `Sqlx*` implementation
//! that dispatches on the configured driver.

pub mod content;
pub mod course;
pub mod item;
pub mod module;
pub mod ordering;
pub mod session;
pub mod subject;
pub mod user;

pub use content::{ContentRepository, SqlxContentRepository};
pub use course::{CourseRepository, SqlxCourseRepository};
pub use item::{ItemRepository, SqlxItemRepository};
pub use module::{ModuleRepository, SqlxModuleRepository};
pub use ordering::{OrderScope, Ordered, OrderingRepository, SqlxOrderingRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use subject::{SqlxSubjectRepository, SubjectRepository};
pub use user::{SqlxUserRepository, UserRepository};
