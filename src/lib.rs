//! Folio - a personal blogging platform
//!
//! Posts, short posts, book notes and series with threaded comments,
//! privacy-preserving analytics and SEO documents, served as a JSON API.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
