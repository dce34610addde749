//! Content service
//!
//! Creates, updates, lists and deletes the items placed in a module. Item
//! kind comes from the URL, so it is validated before anything else.

use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

use crate::db::repositories::{
    ContentRepository, CourseRepository, ItemRepository, ModuleRepository, OrderScope, Ordered,
    OrderingRepository,
};
use crate::models::{Content, Course, Item, ItemFields, ItemKind, Module};
use crate::services::course::CourseServiceError;
use crate::services::module::apply_reorder;
use crate::services::ownership::{ensure_owner, ContentOwner, ModuleOwner};
use crate::services::render::{Presentation, Render};
use crate::services::storage::{MediaStorage, Upload};
use crate::services::validation::FormErrors;

/// Submitted item form. Owner, order and timestamps are never read from
/// user input.
#[derive(Debug, Clone, Default)]
pub struct ItemForm {
    pub title: String,
    /// Body of a text item
    pub content: String,
    /// Address of a video item
    pub url: String,
    /// File of an image or file item
    pub upload: Option<Upload>,
}

impl ItemForm {
    /// Prefill for editing an existing item
    pub fn from_item(item: &Item) -> Self {
        let mut form = Self {
            title: item.base().title.clone(),
            ..Self::default()
        };
        match item {
            Item::Text(text) => form.content = text.body.clone(),
            Item::Video(video) => form.url = video.url.clone(),
            Item::Image(_) | Item::File(_) => {}
        }
        form
    }
}

/// One entry of a module's content list
#[derive(Debug, Clone, Serialize)]
pub struct RenderedContent {
    pub content: Content,
    pub item: Item,
    pub presentation: Presentation,
}

/// Everything the module content page shows
#[derive(Debug, Clone, Serialize)]
pub struct ModuleContents {
    pub course: Course,
    pub module: Module,
    pub modules: Vec<Module>,
    pub contents: Vec<RenderedContent>,
}

pub struct ContentService {
    content_repo: Arc<dyn ContentRepository>,
    item_repo: Arc<dyn ItemRepository>,
    module_repo: Arc<dyn ModuleRepository>,
    course_repo: Arc<dyn CourseRepository>,
    ordering: Arc<dyn OrderingRepository>,
    storage: Arc<MediaStorage>,
}

impl ContentService {
    pub fn new(
        content_repo: Arc<dyn ContentRepository>,
        item_repo: Arc<dyn ItemRepository>,
        module_repo: Arc<dyn ModuleRepository>,
        course_repo: Arc<dyn CourseRepository>,
        ordering: Arc<dyn OrderingRepository>,
        storage: Arc<MediaStorage>,
    ) -> Self {
        Self {
            content_repo,
            item_repo,
            module_repo,
            course_repo,
            ordering,
            storage,
        }
    }

    pub fn storage(&self) -> &MediaStorage {
        &self.storage
    }

    /// The concrete item a content row points at
    pub async fn resolve_item(&self, content: &Content) -> Result<Item, CourseServiceError> {
        self.item_repo
            .get(content.item_kind, content.item_id)
            .await
            .context("Failed to load item")?
            .ok_or(CourseServiceError::NotFound)
    }

    /// An owned module with its contents rendered in order
    pub async fn module_contents(&self, module_id: i64, requester: i64) -> Result<ModuleContents, CourseServiceError> {
        let module = self.owned_module(module_id, requester).await?;
        let course = self
            .course_repo
            .get_by_id(module.course_id)
            .await
            .context("Failed to get course")?
            .ok_or(CourseServiceError::NotFound)?;
        let modules = self
            .module_repo
            .list_by_course(course.id)
            .await
            .context("Failed to list modules")?;

        let rows = self
            .content_repo
            .list_by_module(module_id)
            .await
            .context("Failed to list contents")?;

        let mut contents = Vec::with_capacity(rows.len());
        for content in rows {
            match self.resolve_item(&content).await {
                Ok(item) => {
                    let presentation = item.render(&self.storage);
                    contents.push(RenderedContent {
                        content,
                        item,
                        presentation,
                    });
                }
                Err(CourseServiceError::NotFound) => {
                    tracing::warn!(
                        "Content {} points at missing {} item {}",
                        content.id,
                        content.item_kind,
                        content.item_id
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ModuleContents {
            course,
            module,
            modules,
            contents,
        })
    }

    /// Module and, when editing, the item for an item form page
    pub async fn item_for_form(
        &self,
        kind_name: &str,
        module_id: i64,
        requester: i64,
        item_id: Option<i64>,
    ) -> Result<(ItemKind, Module, Option<Item>), CourseServiceError> {
        let kind: ItemKind = kind_name.parse()?;
        let module = self.owned_module(module_id, requester).await?;
        let item = match item_id {
            Some(id) => Some(self.item_in_module(kind, id, module_id, requester).await?),
            None => None,
        };
        Ok((kind, module, item))
    }

    /// Create an item with its content row at the end of the module, or
    /// update an existing item in place.
    ///
    /// Checks run in order: kind, module ownership, item ownership when
    /// updating, form fields. Nothing is written unless all pass.
    pub async fn create_or_update_item(
        &self,
        kind_name: &str,
        owner_id: i64,
        module_id: i64,
        form: ItemForm,
        existing_id: Option<i64>,
    ) -> Result<Item, CourseServiceError> {
        self.save_item(kind_name, owner_id, module_id, form, existing_id, None)
            .await
    }

    /// Create an item whose content row is stored at `order` as given.
    /// Gaps and ties are allowed.
    pub async fn create_item_at(
        &self,
        kind_name: &str,
        owner_id: i64,
        module_id: i64,
        form: ItemForm,
        order: i32,
    ) -> Result<Item, CourseServiceError> {
        self.save_item(kind_name, owner_id, module_id, form, None, Some(order))
            .await
    }

    async fn save_item(
        &self,
        kind_name: &str,
        owner_id: i64,
        module_id: i64,
        form: ItemForm,
        existing_id: Option<i64>,
        order: Option<i32>,
    ) -> Result<Item, CourseServiceError> {
        let kind: ItemKind = kind_name.parse()?;
        self.owned_module(module_id, owner_id).await?;

        let existing = match existing_id {
            Some(id) => Some(self.item_in_module(kind, id, module_id, owner_id).await?),
            None => None,
        };

        let errors = self.validate(kind, &form, existing.is_some());
        if !errors.is_empty() {
            return Err(CourseServiceError::Validation(errors));
        }

        let stored = match (&form.upload, kind.is_upload()) {
            (Some(upload), true) => Some(
                self.storage
                    .store(kind, upload)
                    .await
                    .context("Failed to store upload")?,
            ),
            _ => None,
        };

        let payload = match kind {
            ItemKind::Text => Some(form.content.clone()),
            ItemKind::Video => Some(form.url.trim().to_string()),
            ItemKind::Image | ItemKind::File => stored.clone(),
        };
        let fields = ItemFields {
            title: form.title.trim().to_string(),
            payload,
        };

        let result = match &existing {
            Some(item) => self.update_item(kind, item.id(), &fields).await,
            None => self.create_item(kind, owner_id, module_id, &fields, order).await,
        };

        match result {
            Ok(item) => {
                // replaced upload
                if let (Some(old), Some(_)) = (existing.as_ref().and_then(Item::stored_file), &stored) {
                    self.storage.remove(old).await;
                }
                Ok(item)
            }
            Err(e) => {
                if let Some(path) = stored {
                    self.storage.remove(&path).await;
                }
                Err(e)
            }
        }
    }

    /// Delete a content row and its item. Returns the module it was in.
    pub async fn delete_content(&self, content_id: i64, requester: i64) -> Result<i64, CourseServiceError> {
        ensure_owner(&ContentOwner(self.content_repo.clone()), content_id, requester).await?;

        let content = self
            .content_repo
            .get_by_id(content_id)
            .await
            .context("Failed to get content")?
            .ok_or(CourseServiceError::NotFound)?;
        let stored = self
            .item_repo
            .get(content.item_kind, content.item_id)
            .await
            .context("Failed to load item")?
            .and_then(|item| item.stored_file().map(str::to_string));

        self.content_repo
            .delete_with_item(&content)
            .await
            .context("Failed to delete content")?;

        if let Some(path) = stored {
            self.storage.remove(&path).await;
        }

        tracing::info!(
            "User {} deleted content {} ({} item {})",
            requester,
            content.id,
            content.item_kind,
            content.item_id
        );
        Ok(content.module_id)
    }

    /// Apply `{ "<content id>": order }` pairs, skipping ids outside the
    /// requester's courses
    pub async fn reorder(&self, requester: i64, orders: &BTreeMap<String, i32>) -> Result<usize, CourseServiceError> {
        apply_reorder(self.ordering.as_ref(), Ordered::Content, requester, orders).await
    }

    async fn owned_module(&self, module_id: i64, requester: i64) -> Result<Module, CourseServiceError> {
        ensure_owner(&ModuleOwner(self.module_repo.clone()), module_id, requester).await?;
        self.module_repo
            .get_by_id(module_id)
            .await
            .context("Failed to get module")?
            .ok_or(CourseServiceError::NotFound)
    }

    async fn owned_item(&self, kind: ItemKind, id: i64, requester: i64) -> Result<Item, CourseServiceError> {
        match self.item_repo.get(kind, id).await.context("Failed to load item")? {
            Some(item) if item.owner_id() == requester => Ok(item),
            _ => Err(CourseServiceError::NotFound),
        }
    }

    /// An owned item that is bound to the given module
    async fn item_in_module(
        &self,
        kind: ItemKind,
        id: i64,
        module_id: i64,
        requester: i64,
    ) -> Result<Item, CourseServiceError> {
        let item = self.owned_item(kind, id, requester).await?;
        match self
            .content_repo
            .get_by_item(kind, id)
            .await
            .context("Failed to get content")?
        {
            Some(content) if content.module_id == module_id => Ok(item),
            _ => Err(CourseServiceError::NotFound),
        }
    }

    async fn create_item(
        &self,
        kind: ItemKind,
        owner_id: i64,
        module_id: i64,
        fields: &ItemFields,
        order: Option<i32>,
    ) -> Result<Item, CourseServiceError> {
        let order = match order {
            Some(order) => order,
            None => self
                .ordering
                .next_order_in_scope(OrderScope::Module(module_id))
                .await
                .context("Failed to compute content order")?,
        };

        let content = self
            .content_repo
            .create_with_item(module_id, kind, owner_id, fields, order)
            .await
            .context("Failed to create content")?;
        tracing::debug!(
            "Created {} item {} as content {} at {}",
            kind,
            content.item_id,
            content.id,
            order
        );

        self.resolve_item(&content).await
    }

    async fn update_item(&self, kind: ItemKind, id: i64, fields: &ItemFields) -> Result<Item, CourseServiceError> {
        self.item_repo
            .update(kind, id, fields)
            .await
            .context("Failed to update item")?
            .ok_or(CourseServiceError::NotFound)
    }

    fn validate(&self, kind: ItemKind, form: &ItemForm, updating: bool) -> FormErrors {
        let mut errors = FormErrors::new();
        errors.require("title", &form.title);
        errors.max_length("title", form.title.trim(), 250);

        match kind {
            ItemKind::Text => errors.require("content", &form.content),
            ItemKind::Video => {
                errors.require("url", &form.url);
                if !form.url.trim().is_empty() && !is_valid_url(form.url.trim()) {
                    errors.add("url", "Enter a valid URL.");
                }
            }
            ItemKind::Image | ItemKind::File => match &form.upload {
                Some(upload) => {
                    for problem in self.storage.check(kind, upload) {
                        errors.add("file", problem);
                    }
                }
                None if !updating => errors.add("file", "This field is required."),
                None => {}
            },
        }
        errors
    }
}

/// Stored upload paths of the items in the given modules
pub(crate) async fn stored_files(
    content_repo: &dyn ContentRepository,
    item_repo: &dyn ItemRepository,
    module_ids: &[i64],
) -> anyhow::Result<Vec<String>> {
    let mut files = Vec::new();
    for module_id in module_ids {
        let contents = content_repo
            .list_by_module(*module_id)
            .await
            .context("Failed to list contents")?;
        for content in contents.iter().filter(|c| c.item_kind.is_upload()) {
            if let Some(item) = item_repo
                .get(content.item_kind, content.item_id)
                .await
                .context("Failed to load item")?
            {
                files.extend(item.stored_file().map(str::to_string));
            }
        }
    }
    Ok(files)
}

/// Absolute http(s) URL with a host
fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewModule, UserRole};
    use crate::services::testing::Fixture;

    fn text(title: &str, body: &str) -> ItemForm {
        ItemForm {
            title: title.to_string(),
            content: body.to_string(),
            ..ItemForm::default()
        }
    }

    async fn module(fx: &Fixture, owner: &crate::models::User, slug: &str) -> Module {
        let course = fx.course(owner, slug).await;
        fx.modules
            .create(
                NewModule {
                    course_id: course.id,
                    title: "Module".to_string(),
                    description: String::new(),
                    order: None,
                },
                owner.id,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_text_contents_are_ordered_per_module() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let first = module(&fx, &alice, "c1").await;
        let second = module(&fx, &alice, "c2").await;

        fx.contents
            .create_or_update_item("text", alice.id, first.id, text("A", "hello"), None)
            .await
            .unwrap();
        fx.contents
            .create_or_update_item("text", alice.id, second.id, text("X", "other"), None)
            .await
            .unwrap();
        fx.contents
            .create_or_update_item("text", alice.id, first.id, text("B", "again"), None)
            .await
            .unwrap();

        let page = fx.contents.module_contents(first.id, alice.id).await.unwrap();
        let orders: Vec<(String, i32)> = page
            .contents
            .iter()
            .map(|c| (c.item.base().title.clone(), c.content.order))
            .collect();
        assert_eq!(orders, vec![("A".to_string(), 0), ("B".to_string(), 1)]);

        let other = fx.contents.module_contents(second.id, alice.id).await.unwrap();
        assert_eq!(other.contents[0].content.order, 0);

        match &page.contents[0].presentation {
            Presentation::Text { html, .. } => assert_eq!(html, "<p>hello</p>\n"),
            other => panic!("unexpected presentation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_kind_writes_nothing() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let module = module(&fx, &alice, "c").await;

        let err = fx
            .contents
            .create_or_update_item("course", alice.id, module.id, text("A", "b"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CourseServiceError::InvalidKind(ref k) if k == "course"));

        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        assert!(page.contents.is_empty());
    }

    #[tokio::test]
    async fn test_validation_errors_per_kind() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let module = module(&fx, &alice, "c").await;

        let err = fx
            .contents
            .create_or_update_item(
                "video",
                alice.id,
                module.id,
                ItemForm {
                    title: "Talk".to_string(),
                    url: "not a url".to_string(),
                    ..ItemForm::default()
                },
                None,
            )
            .await
            .unwrap_err();
        match err {
            CourseServiceError::Validation(errors) => {
                assert_eq!(errors.get("url").unwrap(), ["Enter a valid URL."]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let err = fx
            .contents
            .create_or_update_item("file", alice.id, module.id, text("", ""), None)
            .await
            .unwrap_err();
        match err {
            CourseServiceError::Validation(errors) => {
                assert!(errors.contains("title"));
                assert!(errors.contains("file"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_owner_cannot_add_or_delete() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let bob = fx.user("bob", UserRole::Instructor).await;
        let module = module(&fx, &alice, "c").await;

        assert!(matches!(
            fx.contents
                .create_or_update_item("text", bob.id, module.id, text("A", "b"), None)
                .await,
            Err(CourseServiceError::NotFound)
        ));

        let item = fx
            .contents
            .create_or_update_item("text", alice.id, module.id, text("Mine", "body"), None)
            .await
            .unwrap();
        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        let content_id = page.contents[0].content.id;

        assert!(matches!(
            fx.contents.delete_content(content_id, bob.id).await,
            Err(CourseServiceError::NotFound)
        ));
        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        assert_eq!(page.contents.len(), 1);
        assert_eq!(page.contents[0].item.id(), item.id());
    }

    #[tokio::test]
    async fn test_update_in_place_creates_no_content() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let bob = fx.user("bob", UserRole::Instructor).await;
        let module = module(&fx, &alice, "c").await;

        let item = fx
            .contents
            .create_or_update_item("text", alice.id, module.id, text("Old", "old body"), None)
            .await
            .unwrap();
        let updated = fx
            .contents
            .create_or_update_item("text", alice.id, module.id, text("New", "new body"), Some(item.id()))
            .await
            .unwrap();

        assert_eq!(updated.id(), item.id());
        assert_eq!(updated.base().title, "New");
        assert_eq!(updated.payload(), "new body");

        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        assert_eq!(page.contents.len(), 1);

        let bob_module = self::module(&fx, &bob, "d").await;
        assert!(matches!(
            fx.contents
                .create_or_update_item("text", bob.id, bob_module.id, text("Stolen", "x"), Some(item.id()))
                .await,
            Err(CourseServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_content_removes_item_and_file() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let module = module(&fx, &alice, "c").await;

        let item = fx
            .contents
            .create_or_update_item(
                "file",
                alice.id,
                module.id,
                ItemForm {
                    title: "Slides".to_string(),
                    upload: Some(Upload {
                        file_name: "slides.pdf".to_string(),
                        content_type: "application/pdf".to_string(),
                        data: b"%PDF-1.4".to_vec(),
                    }),
                    ..ItemForm::default()
                },
                None,
            )
            .await
            .unwrap();
        let stored = fx.media_root().join(item.stored_file().unwrap());
        assert!(stored.exists());

        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        let content = page.contents[0].content.clone();

        let module_id = fx.contents.delete_content(content.id, alice.id).await.unwrap();
        assert_eq!(module_id, module.id);

        assert!(matches!(
            fx.contents.resolve_item(&content).await,
            Err(CourseServiceError::NotFound)
        ));
        assert!(!stored.exists());
    }

    #[tokio::test]
    async fn test_reorder_contents() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let module = module(&fx, &alice, "c").await;

        for title in ["A", "B", "C"] {
            fx.contents
                .create_or_update_item("text", alice.id, module.id, text(title, "x"), None)
                .await
                .unwrap();
        }
        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        let ids: Vec<i64> = page.contents.iter().map(|c| c.content.id).collect();

        let orders = BTreeMap::from([(ids[0].to_string(), 2), (ids[2].to_string(), 0)]);
        assert_eq!(fx.contents.reorder(alice.id, &orders).await.unwrap(), 2);

        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        let titles: Vec<&str> = page.contents.iter().map(|c| c.item.base().title.as_str()).collect();
        assert_eq!(titles, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("https://"));
        assert!(!is_valid_url("https://exa mple.com"));
        assert!(!is_valid_url("https://["));
        assert!(!is_valid_url("http://example.com:99999/"));
        assert!(!is_valid_url("https://exa%zzmple.com"));
        assert!(!is_valid_url("http://@"));
        assert!(!is_valid_url("javascript:alert(1)"));
    }

    #[tokio::test]
    async fn test_malformed_video_url_is_not_saved() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let module = module(&fx, &alice, "c").await;

        let err = fx
            .contents
            .create_or_update_item(
                "video",
                alice.id,
                module.id,
                ItemForm {
                    title: "Talk".to_string(),
                    url: "http://example.com:99999/".to_string(),
                    ..ItemForm::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CourseServiceError::Validation(ref e) if e.contains("url")));

        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        assert!(page.contents.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_order_is_kept() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let module = module(&fx, &alice, "c").await;

        fx.contents
            .create_item_at("text", alice.id, module.id, text("Late", "x"), 7)
            .await
            .unwrap();
        fx.contents
            .create_item_at("text", alice.id, module.id, text("Tied", "x"), 7)
            .await
            .unwrap();
        fx.contents
            .create_or_update_item("text", alice.id, module.id, text("Next", "x"), None)
            .await
            .unwrap();

        let page = fx.contents.module_contents(module.id, alice.id).await.unwrap();
        let orders: Vec<(&str, i32)> = page
            .contents
            .iter()
            .map(|c| (c.item.base().title.as_str(), c.content.order))
            .collect();
        assert_eq!(orders, vec![("Late", 7), ("Tied", 7), ("Next", 8)]);

        assert!(matches!(
            fx.contents
                .create_item_at("course", alice.id, module.id, text("A", "b"), 0)
                .await,
            Err(CourseServiceError::InvalidKind(_))
        ));
    }

    #[tokio::test]
    async fn test_item_is_edited_only_through_its_module() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice", UserRole::Instructor).await;
        let home = module(&fx, &alice, "c").await;
        let elsewhere = module(&fx, &alice, "d").await;

        let item = fx
            .contents
            .create_or_update_item("text", alice.id, home.id, text("Mine", "body"), None)
            .await
            .unwrap();

        assert!(matches!(
            fx.contents
                .create_or_update_item("text", alice.id, elsewhere.id, text("Moved", "x"), Some(item.id()))
                .await,
            Err(CourseServiceError::NotFound)
        ));
        assert!(matches!(
            fx.contents.item_for_form("text", elsewhere.id, alice.id, Some(item.id())).await,
            Err(CourseServiceError::NotFound)
        ));

        let (_, _, found) = fx
            .contents
            .item_for_form("text", home.id, alice.id, Some(item.id()))
            .await
            .unwrap();
        assert_eq!(found.map(|i| i.base().title.clone()), Some("Mine".to_string()));
    }
}
