//! Template engine
//!
//! Page templates are embedded in the binary and rendered with Tera.
//! Every page gets the standard variables (site name, request path, the
//! current user and its CSRF token). Item presentations are rendered by a
//! per-kind fragment, `content/<kind>.html`.

use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};

use crate::models::User;
use crate::services::render::Presentation;

mod error;

pub use error::TemplateError;

pub const SITE_NAME: &str = "Educa";

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct TemplateAssets;

pub struct TemplateEngine {
    tera: Tera,
}

/// Variables available to every page
#[derive(Debug, Clone, Default)]
pub struct StandardTemplateVars {
    pub request_path: String,
    pub current_user: Option<CurrentUser>,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub is_instructor: bool,
    pub is_admin: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role.to_string(),
            is_instructor: user.is_instructor(),
            is_admin: user.is_admin(),
        }
    }
}

impl TemplateEngine {
    /// Load every embedded template
    pub fn new() -> Result<Self, TemplateError> {
        let templates: Vec<(String, String)> = TemplateAssets::iter()
            .filter_map(|name| {
                let file = TemplateAssets::get(&name)?;
                let content = String::from_utf8_lossy(&file.data).into_owned();
                Some((name.into_owned(), content))
            })
            .collect();

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Render(error_chain(&e)))?;

        tracing::debug!("Loaded {} templates", tera.get_template_names().count());
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, TemplateError> {
        if !self.has_template(template) {
            return Err(TemplateError::NotFound(template.to_string()));
        }
        self.tera
            .render(template, context)
            .map_err(|e| TemplateError::Render(format!("Failed to render '{}': {}", template, error_chain(&e))))
    }

    /// Render a page with the standard variables added to `context`
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        vars: &StandardTemplateVars,
    ) -> Result<String, TemplateError> {
        let mut full = context.clone();
        full.insert("site_name", SITE_NAME);
        full.insert("request_path", &vars.request_path);
        full.insert("current_user", &vars.current_user);
        full.insert("csrf_token", &vars.csrf_token);
        self.render(template, &full)
    }

    /// HTML fragment for one item presentation
    pub fn render_item(&self, presentation: &Presentation) -> Result<String, TemplateError> {
        let mut context = TeraContext::new();
        context.insert("item", presentation);
        self.render(&format!("content/{}.html", presentation.kind()), &context)
    }
}

fn error_chain(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}
