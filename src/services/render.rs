//! Per-kind presentation of content items

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::{FileItem, ImageItem, Item, ItemKind, TextItem, VideoItem};
use crate::services::markdown::MarkdownRenderer;
use crate::services::storage::{display_name, MediaStorage};

static YOUTUBE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.|m\.)?(?:youtube\.com/(?:watch\?(?:.*&)?v=|embed/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{6,})",
    )
    .ok()
});

static VIMEO: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.|player\.)?vimeo\.com/(?:video/)?(\d+)").ok()
});

/// What a rendered item looks like, ready for a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Presentation {
    Text { title: String, html: String },
    Video { title: String, url: String, embed_url: String },
    Image { title: String, url: String },
    File { title: String, url: String, file_name: String },
}

impl Presentation {
    pub fn kind(&self) -> ItemKind {
        match self {
            Presentation::Text { .. } => ItemKind::Text,
            Presentation::Video { .. } => ItemKind::Video,
            Presentation::Image { .. } => ItemKind::Image,
            Presentation::File { .. } => ItemKind::File,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Presentation::Text { title, .. }
            | Presentation::Video { title, .. }
            | Presentation::Image { title, .. }
            | Presentation::File { title, .. } => title,
        }
    }
}

/// Produce the kind-specific presentation of an item
pub trait Render {
    fn render(&self, media: &MediaStorage) -> Presentation;
}

impl Render for TextItem {
    fn render(&self, _media: &MediaStorage) -> Presentation {
        Presentation::Text {
            title: self.base.title.clone(),
            html: MarkdownRenderer::new().render(&self.body),
        }
    }
}

impl Render for VideoItem {
    fn render(&self, _media: &MediaStorage) -> Presentation {
        Presentation::Video {
            title: self.base.title.clone(),
            url: self.url.clone(),
            embed_url: embed_url(&self.url),
        }
    }
}

impl Render for ImageItem {
    fn render(&self, media: &MediaStorage) -> Presentation {
        Presentation::Image {
            title: self.base.title.clone(),
            url: media.url_for(&self.file),
        }
    }
}

impl Render for FileItem {
    fn render(&self, media: &MediaStorage) -> Presentation {
        Presentation::File {
            title: self.base.title.clone(),
            url: media.url_for(&self.file),
            file_name: display_name(&self.file).to_string(),
        }
    }
}

impl Render for Item {
    fn render(&self, media: &MediaStorage) -> Presentation {
        match self {
            Item::Text(item) => item.render(media),
            Item::Video(item) => item.render(media),
            Item::Image(item) => item.render(media),
            Item::File(item) => item.render(media),
        }
    }
}

/// Player URL for YouTube and Vimeo links, otherwise the URL itself
pub fn embed_url(url: &str) -> String {
    let url = url.trim();

    if let Some(id) = capture(&YOUTUBE, url) {
        return format!("https://www.youtube.com/embed/{}", id);
    }
    if let Some(id) = capture(&VIMEO, url) {
        return format!("https://player.vimeo.com/video/{}", id);
    }
    url.to_string()
}

fn capture<'a>(pattern: &Lazy<Option<Regex>>, url: &'a str) -> Option<&'a str> {
    pattern
        .as_ref()?
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::models::ItemBase;
    use chrono::Utc;

    fn base(title: &str) -> ItemBase {
        let now = Utc::now();
        ItemBase {
            id: 1,
            owner_id: 1,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn media() -> MediaStorage {
        MediaStorage::new(&UploadConfig::default())
    }

    #[test]
    fn test_embed_url_youtube() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "http://www.youtube.com/embed/dQw4w9WgXcQ",
        ] {
            assert_eq!(embed_url(url), "https://www.youtube.com/embed/dQw4w9WgXcQ", "{}", url);
        }
    }

    #[test]
    fn test_embed_url_vimeo() {
        assert_eq!(embed_url("https://vimeo.com/76979871"), "https://player.vimeo.com/video/76979871");
        assert_eq!(
            embed_url("https://player.vimeo.com/video/76979871"),
            "https://player.vimeo.com/video/76979871"
        );
    }

    #[test]
    fn test_embed_url_other_passes_through() {
        assert_eq!(embed_url("https://example.com/talk.mp4"), "https://example.com/talk.mp4");
    }

    #[test]
    fn test_render_text_item() {
        let item = Item::Text(TextItem {
            base: base("Intro"),
            body: "**hello** <i>x</i>".to_string(),
        });
        match item.render(&media()) {
            Presentation::Text { title, html } => {
                assert_eq!(title, "Intro");
                assert!(html.contains("<strong>hello</strong>"));
                assert!(html.contains("&lt;i&gt;"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_render_upload_items() {
        let image = Item::Image(ImageItem {
            base: base("Diagram"),
            file: "images/abc.png".to_string(),
        });
        assert_eq!(
            image.render(&media()),
            Presentation::Image {
                title: "Diagram".to_string(),
                url: "/media/images/abc.png".to_string(),
            }
        );

        let file = Item::File(FileItem {
            base: base("Slides"),
            file: "files/123/slides.pdf".to_string(),
        });
        assert_eq!(
            file.render(&media()),
            Presentation::File {
                title: "Slides".to_string(),
                url: "/media/files/123/slides.pdf".to_string(),
                file_name: "slides.pdf".to_string(),
            }
        );
    }

    #[test]
    fn test_presentation_serializes_with_kind_tag() {
        let json = serde_json::to_value(Presentation::Image {
            title: "t".to_string(),
            url: "/media/x".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["url"], "/media/x");
    }
}
