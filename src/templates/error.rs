//! Template engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    /// No embedded template with this name
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Parse or render failure, with the tera cause chain
    #[error("Template error: {0}")]
    Render(String),
}
