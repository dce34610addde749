//! Educa - course management backend
//!
//! Instructors build courses out of ordered modules holding ordered
//! content items of four kinds (text, video, image, file). Students browse
//! the catalogue and enroll.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod templates;
