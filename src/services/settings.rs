//! Settings service
//!
//! Typed site settings over the key-value `settings` table. Keys missing from
//! the table fall back to the `site` section of the configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{Cache, CacheLayer};
use crate::config::SiteConfig;
use crate::db::repositories::SettingsRepository;

const SETTINGS_CACHE_KEY: &str = "settings:site";
const SETTINGS_CACHE_TTL_SECS: u64 = 3600;

/// Known setting keys
pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const SITE_DESCRIPTION: &str = "site_description";
    pub const SITE_URL: &str = "site_url";
    pub const AUTHOR_NAME: &str = "author_name";
    pub const COMMENT_MODERATION: &str = "comment_moderation";
    pub const POSTS_PER_PAGE: &str = "posts_per_page";
}

/// Site settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_description: String,
    /// Public base URL without trailing slash
    pub site_url: String,
    pub author_name: String,
    /// New comments wait for approval when on
    pub comment_moderation: bool,
    pub posts_per_page: u32,
}

impl SiteSettings {
    pub fn from_config(site: &SiteConfig) -> Self {
        Self {
            site_name: site.name.clone(),
            site_description: site.description.clone(),
            site_url: site.url.trim_end_matches('/').to_string(),
            author_name: site.author.clone(),
            comment_moderation: true,
            posts_per_page: 10,
        }
    }

    /// Absolute URL for a site path such as `/posts/hello`
    pub fn absolute_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.site_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (keys::SITE_NAME.to_string(), self.site_name.clone()),
            (keys::SITE_DESCRIPTION.to_string(), self.site_description.clone()),
            (keys::SITE_URL.to_string(), self.site_url.clone()),
            (keys::AUTHOR_NAME.to_string(), self.author_name.clone()),
            (
                keys::COMMENT_MODERATION.to_string(),
                self.comment_moderation.to_string(),
            ),
            (keys::POSTS_PER_PAGE.to_string(), self.posts_per_page.to_string()),
        ])
    }
}

/// Partial update; absent fields keep their value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettingsInput {
    pub site_name: Option<String>,
    pub site_description: Option<String>,
    pub site_url: Option<String>,
    pub author_name: Option<String>,
    pub comment_moderation: Option<bool>,
    pub posts_per_page: Option<u32>,
}

/// Settings service errors
#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Settings service for managing site configuration
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: Arc<Cache>,
    defaults: SiteSettings,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, cache: Arc<Cache>, site: &SiteConfig) -> Self {
        Self {
            repo,
            cache,
            defaults: SiteSettings::from_config(site),
        }
    }

    /// Current site settings, stored values over configured defaults
    pub async fn get_site_settings(&self) -> Result<SiteSettings, SettingsServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<SiteSettings>(SETTINGS_CACHE_KEY).await {
            return Ok(cached);
        }

        let stored: HashMap<String, String> = self
            .repo
            .get_all()
            .await?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();

        let defaults = self.defaults.clone();
        let text = |key: &str, default: String| stored.get(key).cloned().unwrap_or(default);

        let settings = SiteSettings {
            site_name: text(keys::SITE_NAME, defaults.site_name),
            site_description: text(keys::SITE_DESCRIPTION, defaults.site_description),
            site_url: text(keys::SITE_URL, defaults.site_url),
            author_name: text(keys::AUTHOR_NAME, defaults.author_name),
            comment_moderation: stored
                .get(keys::COMMENT_MODERATION)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.comment_moderation),
            posts_per_page: stored
                .get(keys::POSTS_PER_PAGE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.posts_per_page),
        };

        let _ = self
            .cache
            .set(
                SETTINGS_CACHE_KEY,
                &settings,
                Duration::from_secs(SETTINGS_CACHE_TTL_SECS),
            )
            .await;

        Ok(settings)
    }

    /// Apply a partial update and return the resulting settings
    pub async fn update_site_settings(
        &self,
        input: UpdateSettingsInput,
    ) -> Result<SiteSettings, SettingsServiceError> {
        let mut settings = self.get_site_settings().await?;

        if let Some(name) = input.site_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(SettingsServiceError::ValidationError(
                    "Site name cannot be empty".to_string(),
                ));
            }
            settings.site_name = name;
        }
        if let Some(description) = input.site_description {
            settings.site_description = description;
        }
        if let Some(url) = input.site_url {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(SettingsServiceError::ValidationError(
                    "Site URL must start with http:// or https://".to_string(),
                ));
            }
            settings.site_url = url;
        }
        if let Some(author) = input.author_name {
            settings.author_name = author;
        }
        if let Some(moderation) = input.comment_moderation {
            settings.comment_moderation = moderation;
        }
        if let Some(per_page) = input.posts_per_page {
            if !(1..=100).contains(&per_page) {
                return Err(SettingsServiceError::ValidationError(
                    "Posts per page must be between 1 and 100".to_string(),
                ));
            }
            settings.posts_per_page = per_page;
        }

        self.repo.set_many(&settings.to_map()).await?;
        let _ = self.cache.delete(SETTINGS_CACHE_KEY).await;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::SqlxSettingsRepository;

    async fn setup_service() -> SettingsService {
        let pool = setup_pool().await;
        let cache = create_cache(&CacheConfig::default()).unwrap();
        let site = SiteConfig {
            name: "Field Notes".to_string(),
            url: "https://notes.example/".to_string(),
            ..Default::default()
        };
        SettingsService::new(SqlxSettingsRepository::boxed(pool), cache, &site)
    }

    #[tokio::test]
    async fn test_defaults_come_from_config() {
        let service = setup_service().await;
        let settings = service.get_site_settings().await.unwrap();
        assert_eq!(settings.site_name, "Field Notes");
        assert_eq!(settings.site_url, "https://notes.example");
        assert!(settings.comment_moderation);
        assert_eq!(settings.posts_per_page, 10);
        assert_eq!(settings.absolute_url("/feed.xml"), "https://notes.example/feed.xml");
    }

    #[tokio::test]
    async fn test_update_persists_and_invalidates_cache() {
        let service = setup_service().await;
        service.get_site_settings().await.unwrap();

        let updated = service
            .update_site_settings(UpdateSettingsInput {
                comment_moderation: Some(false),
                posts_per_page: Some(25),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!updated.comment_moderation);

        let reloaded = service.get_site_settings().await.unwrap();
        assert_eq!(reloaded, updated);
        assert_eq!(reloaded.site_name, "Field Notes");
    }

    #[tokio::test]
    async fn test_update_validation() {
        let service = setup_service().await;
        for input in [
            UpdateSettingsInput {
                site_name: Some("  ".to_string()),
                ..Default::default()
            },
            UpdateSettingsInput {
                site_url: Some("notes.example".to_string()),
                ..Default::default()
            },
            UpdateSettingsInput {
                posts_per_page: Some(0),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                service.update_site_settings(input).await,
                Err(SettingsServiceError::ValidationError(_))
            ));
        }
    }
}
