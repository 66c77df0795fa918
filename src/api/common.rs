//! Common API utilities and shared types

use axum::http::{header, HeaderMap};
use serde::Deserialize;

use crate::api::middleware::{client_ip, AppState};
use crate::models::ListParams;

pub fn default_page() -> u32 {
    1
}

pub fn default_per_page() -> u32 {
    10
}

/// Admin listings show more rows
pub fn default_admin_per_page() -> u32 {
    20
}

/// Basic pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Admin pagination query parameters
#[derive(Debug, Deserialize)]
pub struct AdminPaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_admin_per_page")]
    pub per_page: u32,
}

impl AdminPaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Anonymous visitor identity for the current request
pub fn visitor_hash(state: &AppState, headers: &HeaderMap) -> String {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    state
        .analytics_service
        .visitor_hash(&client_ip(headers), user_agent)
}

/// `Referer` header, if it is valid text
pub fn referrer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::REFERER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}
