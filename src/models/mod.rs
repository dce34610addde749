//! Data models
//!
//! Database entities (User, Session, Subject, Course, Module, Content and the
//! polymorphic items) plus the input types the services accept.

mod content;
mod course;
mod item;
mod module;
mod session;
mod subject;
mod user;

pub use content::Content;
pub use course::{Course, CourseFields, CourseInput};
pub use item::{
    FileItem, ImageItem, InvalidKind, Item, ItemBase, ItemFields, ItemKind, TextItem, VideoItem,
};
pub use module::{Module, ModuleFormRow, NewModule};
pub use session::Session;
pub use subject::{Subject, SubjectInput, SubjectWithCount};
pub use user::{CreateUserInput, User, UserRole};
