//! Polymorphic content items
//!
//! Four unrelated item kinds share a common base (owner, title, timestamps)
//! and live in their own tables. `ItemKind` is the single list of allowed
//! kinds: it validates the `model_name` path segment and picks the table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The allowed item kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Video,
    Image,
    File,
}

/// Returned when a kind name is not one of `text`, `video`, `image`, `file`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid content kind: {0}")]
pub struct InvalidKind(pub String);

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [ItemKind::Text, ItemKind::Video, ItemKind::Image, ItemKind::File];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Text => "text",
            ItemKind::Video => "video",
            ItemKind::Image => "image",
            ItemKind::File => "file",
        }
    }

    /// Table holding items of this kind
    pub fn table(&self) -> &'static str {
        match self {
            ItemKind::Text => "items_text",
            ItemKind::Video => "items_video",
            ItemKind::Image => "items_image",
            ItemKind::File => "items_file",
        }
    }

    /// Whether the payload is an uploaded file
    pub fn is_upload(&self) -> bool {
        matches!(self, ItemKind::Image | ItemKind::File)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = InvalidKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ItemKind::Text),
            "video" => Ok(ItemKind::Video),
            "image" => Ok(ItemKind::Image),
            "file" => Ok(ItemKind::File),
            other => Err(InvalidKind(other.to_string())),
        }
    }
}

/// Fields shared by every item kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBase {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextItem {
    #[serde(flatten)]
    pub base: ItemBase,
    /// Markdown body
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoItem {
    #[serde(flatten)]
    pub base: ItemBase,
    /// External video page URL
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    #[serde(flatten)]
    pub base: ItemBase,
    /// Path relative to the media root
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    #[serde(flatten)]
    pub base: ItemBase,
    /// Path relative to the media root
    pub file: String,
}

/// A loaded item of any kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Item {
    Text(TextItem),
    Video(VideoItem),
    Image(ImageItem),
    File(FileItem),
}

impl Item {
    /// Reassemble an item from its stored columns
    pub fn from_parts(kind: ItemKind, base: ItemBase, payload: String) -> Self {
        match kind {
            ItemKind::Text => Item::Text(TextItem { base, body: payload }),
            ItemKind::Video => Item::Video(VideoItem { base, url: payload }),
            ItemKind::Image => Item::Image(ImageItem { base, file: payload }),
            ItemKind::File => Item::File(FileItem { base, file: payload }),
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Text(_) => ItemKind::Text,
            Item::Video(_) => ItemKind::Video,
            Item::Image(_) => ItemKind::Image,
            Item::File(_) => ItemKind::File,
        }
    }

    pub fn base(&self) -> &ItemBase {
        match self {
            Item::Text(item) => &item.base,
            Item::Video(item) => &item.base,
            Item::Image(item) => &item.base,
            Item::File(item) => &item.base,
        }
    }

    pub fn id(&self) -> i64 {
        self.base().id
    }

    pub fn owner_id(&self) -> i64 {
        self.base().owner_id
    }

    /// Kind-specific payload column value (body, url or stored file path)
    pub fn payload(&self) -> &str {
        match self {
            Item::Text(item) => &item.body,
            Item::Video(item) => &item.url,
            Item::Image(item) => &item.file,
            Item::File(item) => &item.file,
        }
    }

    /// Stored file path for upload kinds
    pub fn stored_file(&self) -> Option<&str> {
        match self {
            Item::Image(item) => Some(&item.file),
            Item::File(item) => Some(&item.file),
            _ => None,
        }
    }
}

/// Validated item fields ready to be written.
///
/// Owner, order and timestamps are never part of this: they come from the
/// requester and the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFields {
    pub title: String,
    /// Body, URL or stored file path depending on the kind. `None` keeps the
    /// current value on update (an upload kind edited without a new file).
    pub payload: Option<String>,
}
