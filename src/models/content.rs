//! Content model

use serde::{Deserialize, Serialize};

use super::ItemKind;

/// Binds one item to a module at a given position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub module_id: i64,
    pub item_kind: ItemKind,
    pub item_id: i64,
    /// Position within the module, assigned on creation
    pub order: i32,
}
