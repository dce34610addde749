//! Markdown rendering for text items
//!
//! Bodies are Markdown rendered with pulldown-cmark. Raw HTML in the source
//! is escaped rather than passed through, and links or images with a
//! script URL are neutralised.
//!
//! ```
//! use educa::services::markdown::MarkdownRenderer;
//!
//! let html = MarkdownRenderer::new().render("# Hello\n\n<b>raw</b>");
//! assert!(html.contains("<h1>Hello</h1>"));
//! assert!(html.contains("&lt;b&gt;raw&lt;/b&gt;"));
//! ```

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};

#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Tables, strikethrough, task lists and smart punctuation enabled
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        Self { options }
    }

    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, self.options);
        let events = parser.map(sanitize_event);

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, events);
        html_output
    }
}

fn sanitize_event(event: Event<'_>) -> Event<'_> {
    match event {
        // Text events are escaped by push_html
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    }
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let scheme = url.trim_start().to_ascii_lowercase();
    if scheme.starts_with("javascript:") || scheme.starts_with("vbscript:") || scheme.starts_with("data:") {
        CowStr::Borrowed("#")
    } else {
        url
    }
}
