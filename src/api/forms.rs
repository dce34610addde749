//! Submitted HTML forms
//!
//! Views accept either `application/x-www-form-urlencoded` or
//! `multipart/form-data` bodies through the same `FormData` extractor.

use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header,
    Form,
};
use std::collections::HashMap;

use crate::api::middleware::ApiError;
use crate::services::Upload;

#[derive(Debug, Clone, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, Upload>,
}

impl FormData {
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Checkbox semantics: present and not "off"/"false"
    pub fn checked(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|v| !matches!(v.as_str(), "" | "off" | "false" | "0"))
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}

impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation_error(e.body_text()))?;
            return Ok(FormData {
                fields: pairs.into_iter().collect(),
                files: HashMap::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;

        let mut form = FormData::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

                    // browsers send an empty part for an untouched file input
                    if file_name.is_empty() && data.is_empty() {
                        continue;
                    }
                    form.files.insert(
                        name,
                        Upload {
                            file_name,
                            content_type,
                            data: data.to_vec(),
                        },
                    );
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::validation_error(format!("Failed to read field: {}", e)))?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }
}
