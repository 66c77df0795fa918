//! SEO metadata and crawler documents
//!
//! Page metadata (Open Graph, Twitter card, JSON-LD) is built by pure
//! functions from a record and the site settings. `SeoService` renders the
//! sitemap, RSS feed and robots.txt, which need the database.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{BookRepository, PostRepository, SeriesRepository, TagRepository};
use crate::models::{Book, ListParams, Post, Series, Tag};
use crate::services::markdown::html_escape;
use crate::services::settings::{SettingsService, SettingsServiceError, SiteSettings};
use crate::services::text::excerpt;

const META_DESCRIPTION_CHARS: usize = 160;
const FEED_ITEMS: i64 = 20;
const SITEMAP_MAX_ENTRIES: u32 = 5000;
const SITEMAP_CACHE_KEY: &str = "seo:sitemap";
const FEED_CACHE_KEY: &str = "seo:feed";
const DOCUMENT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum SeoServiceError {
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SettingsServiceError> for SeoServiceError {
    fn from(e: SettingsServiceError) -> Self {
        SeoServiceError::InternalError(anyhow::anyhow!(e.to_string()))
    }
}

/// Metadata for one public page
#[derive(Debug, Clone, Serialize)]
pub struct SeoMeta {
    pub title: String,
    pub description: String,
    pub canonical_url: String,
    pub open_graph: OpenGraph,
    pub twitter: TwitterCard,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<ArticleMeta>,
    pub json_ld: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenGraph {
    #[serde(rename = "type")]
    pub og_type: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub site_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TwitterCard {
    pub card: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleMeta {
    pub published_time: Option<DateTime<Utc>>,
    pub modified_time: DateTime<Utc>,
    pub author: String,
    pub tags: Vec<String>,
}

pub fn post_path(post: &Post) -> String {
    format!("/posts/{}", post.slug)
}

pub fn book_path(book: &Book) -> String {
    format!("/books/{}", book.slug)
}

pub fn series_path(series: &Series) -> String {
    format!("/series/{}", series.slug)
}

pub fn tag_path(tag: &Tag) -> String {
    format!("/tags/{}", tag.slug)
}

pub fn post_meta(post: &Post, tags: &[Tag], site: &SiteSettings) -> SeoMeta {
    let title = post
        .meta_title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("{} | {}", post.display_title(), site.site_name));
    let description = describe(post.meta_description.as_deref(), &post.excerpt, site);
    let canonical_url = post
        .canonical_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| site.absolute_url(&post_path(post)));
    let image = post.cover_image.as_deref().map(|i| absolute_image(i, site));
    let tag_names: Vec<String> = tags.iter().map(|t| t.name.clone()).collect();

    let mut json_ld = json!({
        "@context": "https://schema.org",
        "@type": "BlogPosting",
        "headline": post.display_title(),
        "description": description,
        "url": canonical_url,
        "mainEntityOfPage": canonical_url,
        "dateModified": rfc3339(&post.updated_at),
        "author": { "@type": "Person", "name": site.author_name },
        "publisher": { "@type": "Organization", "name": site.site_name, "url": site.site_url },
    });
    if let Some(published_at) = post.published_at {
        json_ld["datePublished"] = json!(rfc3339(&published_at));
    }
    if let Some(image) = &image {
        json_ld["image"] = json!(image);
    }
    if !tag_names.is_empty() {
        json_ld["keywords"] = json!(tag_names.join(", "));
    }

    SeoMeta {
        open_graph: OpenGraph {
            og_type: "article".to_string(),
            title: post.display_title().to_string(),
            description: description.clone(),
            url: canonical_url.clone(),
            site_name: site.site_name.clone(),
            image: image.clone(),
        },
        twitter: twitter_card(post.display_title(), &description, image),
        article: Some(ArticleMeta {
            published_time: post.published_at,
            modified_time: post.updated_at,
            author: site.author_name.clone(),
            tags: tag_names,
        }),
        title,
        description,
        canonical_url,
        json_ld,
    }
}

pub fn book_meta(book: &Book, site: &SiteSettings) -> SeoMeta {
    let heading = if book.author.is_empty() {
        book.title.clone()
    } else {
        format!("{} by {}", book.title, book.author)
    };
    let plain_notes = crate::services::text::strip_markdown(&book.notes);
    let description = describe(None, &plain_notes, site);
    let canonical_url = site.absolute_url(&book_path(book));
    let image = book.cover_image.as_deref().map(|i| absolute_image(i, site));

    let mut item = json!({ "@type": "Book", "name": book.title });
    if !book.author.is_empty() {
        item["author"] = json!({ "@type": "Person", "name": book.author });
    }
    if let Some(isbn) = &book.isbn {
        item["isbn"] = json!(isbn);
    }
    let mut json_ld = json!({
        "@context": "https://schema.org",
        "@type": "Review",
        "url": canonical_url,
        "itemReviewed": item,
        "author": { "@type": "Person", "name": site.author_name },
        "reviewBody": description,
    });
    if let Some(rating) = book.rating {
        json_ld["reviewRating"] = json!({
            "@type": "Rating",
            "ratingValue": rating,
            "bestRating": 5,
            "worstRating": 1,
        });
    }

    SeoMeta {
        title: format!("{} | {}", heading, site.site_name),
        open_graph: OpenGraph {
            og_type: "book".to_string(),
            title: heading.clone(),
            description: description.clone(),
            url: canonical_url.clone(),
            site_name: site.site_name.clone(),
            image: image.clone(),
        },
        twitter: twitter_card(&heading, &description, image),
        article: None,
        description,
        canonical_url,
        json_ld,
    }
}

pub fn series_meta(series: &Series, posts: &[Post], site: &SiteSettings) -> SeoMeta {
    let description = describe(None, &series.description, site);
    let canonical_url = site.absolute_url(&series_path(series));
    let image = series.cover_image.as_deref().map(|i| absolute_image(i, site));
    let parts: Vec<serde_json::Value> = posts
        .iter()
        .map(|p| {
            json!({
                "@type": "BlogPosting",
                "headline": p.display_title(),
                "url": site.absolute_url(&post_path(p)),
            })
        })
        .collect();

    SeoMeta {
        title: format!("{} | {}", series.title, site.site_name),
        open_graph: OpenGraph {
            og_type: "website".to_string(),
            title: series.title.clone(),
            description: description.clone(),
            url: canonical_url.clone(),
            site_name: site.site_name.clone(),
            image: image.clone(),
        },
        twitter: twitter_card(&series.title, &description, image),
        article: None,
        json_ld: json!({
            "@context": "https://schema.org",
            "@type": "CreativeWorkSeries",
            "name": series.title,
            "description": description,
            "url": canonical_url,
            "hasPart": parts,
        }),
        description,
        canonical_url,
    }
}

fn describe(explicit: Option<&str>, fallback: &str, site: &SiteSettings) -> String {
    let text = explicit
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| fallback.trim());
    if text.is_empty() {
        return site.site_description.clone();
    }
    excerpt(&text.split_whitespace().collect::<Vec<_>>().join(" "), META_DESCRIPTION_CHARS)
}

fn twitter_card(title: &str, description: &str, image: Option<String>) -> TwitterCard {
    TwitterCard {
        card: if image.is_some() {
            "summary_large_image"
        } else {
            "summary"
        }
        .to_string(),
        title: title.to_string(),
        description: description.to_string(),
        image,
    }
}

fn absolute_image(image: &str, site: &SiteSettings) -> String {
    if image.starts_with("http://") || image.starts_with("https://") {
        image.to_string()
    } else {
        site.absolute_url(image)
    }
}

fn rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub struct SeoService {
    posts: Arc<dyn PostRepository>,
    tags: Arc<dyn TagRepository>,
    series: Arc<dyn SeriesRepository>,
    books: Arc<dyn BookRepository>,
    settings: Arc<SettingsService>,
    cache: Arc<Cache>,
}

impl SeoService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        tags: Arc<dyn TagRepository>,
        series: Arc<dyn SeriesRepository>,
        books: Arc<dyn BookRepository>,
        settings: Arc<SettingsService>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            posts,
            tags,
            series,
            books,
            settings,
            cache,
        }
    }

    /// sitemaps.org urlset: home, posts, series, public books and tags
    pub async fn sitemap_xml(&self) -> Result<String, SeoServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<String>(SITEMAP_CACHE_KEY).await {
            return Ok(cached);
        }

        let site = self.settings.get_site_settings().await?;
        let posts = self.posts.recent_published(SITEMAP_MAX_ENTRIES as i64).await?;
        let series = self.series.list_with_counts().await?;
        let everything = ListParams {
            page: 1,
            per_page: SITEMAP_MAX_ENTRIES,
        };
        let (books, _) = self.books.list(&everything, None, true).await?;
        let tags = self.tags.list_with_counts().await?;

        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );
        push_url(&mut xml, &site.absolute_url("/"), posts.first().map(|p| p.updated_at), "daily");
        for post in &posts {
            let loc = post
                .canonical_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| site.absolute_url(&post_path(post)));
            push_url(&mut xml, &loc, Some(post.updated_at), "weekly");
        }
        for entry in series.iter().filter(|s| s.post_count > 0) {
            let loc = site.absolute_url(&series_path(&entry.series));
            push_url(&mut xml, &loc, Some(entry.series.updated_at), "weekly");
        }
        for book in &books {
            push_url(&mut xml, &site.absolute_url(&book_path(book)), Some(book.updated_at), "monthly");
        }
        for entry in tags.iter().filter(|t| t.post_count > 0) {
            push_url(&mut xml, &site.absolute_url(&tag_path(&entry.tag)), None, "weekly");
        }
        xml.push_str("</urlset>\n");

        let _ = self
            .cache
            .set(SITEMAP_CACHE_KEY, &xml, Duration::from_secs(DOCUMENT_CACHE_TTL_SECS))
            .await;
        Ok(xml)
    }

    /// RSS 2.0 feed of the latest published posts
    pub async fn rss_xml(&self) -> Result<String, SeoServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<String>(FEED_CACHE_KEY).await {
            return Ok(cached);
        }

        let site = self.settings.get_site_settings().await?;
        let posts = self.posts.recent_published(FEED_ITEMS).await?;
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        let tags = self.tags.get_for_posts(&ids).await?;

        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n<channel>\n",
        );
        let _ = writeln!(xml, "<title>{}</title>", html_escape(&site.site_name));
        let _ = writeln!(xml, "<link>{}</link>", html_escape(&site.absolute_url("/")));
        let _ = writeln!(
            xml,
            "<description>{}</description>",
            html_escape(&site.site_description)
        );
        let _ = writeln!(
            xml,
            "<atom:link href=\"{}\" rel=\"self\" type=\"application/rss+xml\"/>",
            html_escape(&site.absolute_url("/feed.xml"))
        );
        if let Some(latest) = posts.first().and_then(|p| p.published_at) {
            let _ = writeln!(xml, "<lastBuildDate>{}</lastBuildDate>", latest.to_rfc2822());
        }

        for post in &posts {
            let link = site.absolute_url(&post_path(post));
            xml.push_str("<item>\n");
            let _ = writeln!(xml, "<title>{}</title>", html_escape(post.display_title()));
            let _ = writeln!(xml, "<link>{}</link>", html_escape(&link));
            let _ = writeln!(xml, "<guid isPermaLink=\"true\">{}</guid>", html_escape(&link));
            let _ = writeln!(xml, "<description>{}</description>", html_escape(&post.excerpt));
            if let Some(published_at) = post.published_at {
                let _ = writeln!(xml, "<pubDate>{}</pubDate>", published_at.to_rfc2822());
            }
            for tag in tags.get(&post.id).into_iter().flatten() {
                let _ = writeln!(xml, "<category>{}</category>", html_escape(&tag.name));
            }
            xml.push_str("</item>\n");
        }
        xml.push_str("</channel>\n</rss>\n");

        let _ = self
            .cache
            .set(FEED_CACHE_KEY, &xml, Duration::from_secs(DOCUMENT_CACHE_TTL_SECS))
            .await;
        Ok(xml)
    }

    pub async fn robots_txt(&self) -> Result<String, SeoServiceError> {
        let site = self.settings.get_site_settings().await?;
        Ok(format!(
            "User-agent: *\nAllow: /\nDisallow: /api/admin/\n\nSitemap: {}\n",
            site.absolute_url("/sitemap.xml")
        ))
    }

    /// Drop cached crawler documents after content changes
    pub async fn invalidate(&self) {
        if let Err(e) = self.cache.delete_pattern("seo:*").await {
            tracing::warn!("Failed to invalidate SEO cache: {}", e);
        }
    }
}

fn push_url(xml: &mut String, loc: &str, lastmod: Option<DateTime<Utc>>, changefreq: &str) {
    xml.push_str("<url>");
    let _ = write!(xml, "<loc>{}</loc>", html_escape(loc));
    if let Some(lastmod) = lastmod {
        let _ = write!(xml, "<lastmod>{}</lastmod>", lastmod.format("%Y-%m-%d"));
    }
    let _ = write!(xml, "<changefreq>{}</changefreq>", changefreq);
    xml.push_str("</url>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::{CacheConfig, SiteConfig};
    use crate::db::repositories::test_support::{insert_post, setup_pool};
    use crate::db::repositories::{
        SqlxBookRepository, SqlxPostRepository, SqlxSeriesRepository, SqlxSettingsRepository,
        SqlxTagRepository,
    };
    use crate::models::{PostKind, PostStatus, ReadingStatus};

    fn site() -> SiteSettings {
        SiteSettings::from_config(&SiteConfig {
            name: "Field Notes".to_string(),
            description: "A personal blog".to_string(),
            url: "https://notes.example.com/".to_string(),
            author: "Sam".to_string(),
        })
    }

    fn sample_post() -> Post {
        let now = Utc::now();
        Post {
            id: 1,
            slug: "borrowing".to_string(),
            kind: PostKind::Article,
            title: "On Borrowing".to_string(),
            content: "Body".to_string(),
            content_html: "<p>Body</p>".to_string(),
            excerpt: "Why the borrow checker is your friend".to_string(),
            cover_image: Some("/uploads/cover.png".to_string()),
            meta_title: None,
            meta_description: None,
            canonical_url: None,
            status: PostStatus::Published,
            author_id: None,
            series_id: None,
            series_order: 0,
            reading_time_minutes: 1,
            view_count: 0,
            comment_count: 0,
            published_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_post_meta_defaults() {
        let tags = vec![Tag::new("rust".to_string(), "Rust".to_string())];
        let meta = post_meta(&sample_post(), &tags, &site());
        assert_eq!(meta.title, "On Borrowing | Field Notes");
        assert_eq!(meta.description, "Why the borrow checker is your friend");
        assert_eq!(meta.canonical_url, "https://notes.example.com/posts/borrowing");
        assert_eq!(
            meta.open_graph.image.as_deref(),
            Some("https://notes.example.com/uploads/cover.png")
        );
        assert_eq!(meta.twitter.card, "summary_large_image");
        assert_eq!(meta.json_ld["@type"], "BlogPosting");
        assert_eq!(meta.json_ld["keywords"], "Rust");
        assert_eq!(meta.article.unwrap().tags, vec!["Rust"]);
    }

    #[test]
    fn test_post_meta_overrides() {
        let post = Post {
            meta_title: Some("Custom title".to_string()),
            meta_description: Some("Custom description".to_string()),
            canonical_url: Some("https://elsewhere.example.com/x".to_string()),
            cover_image: None,
            ..sample_post()
        };
        let meta = post_meta(&post, &[], &site());
        assert_eq!(meta.title, "Custom title");
        assert_eq!(meta.description, "Custom description");
        assert_eq!(meta.canonical_url, "https://elsewhere.example.com/x");
        assert_eq!(meta.twitter.card, "summary");
        assert!(meta.json_ld.get("keywords").is_none());
    }

    #[test]
    fn test_book_meta() {
        let now = Utc::now();
        let book = Book {
            id: 1,
            slug: "dune".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: None,
            cover_image: None,
            rating: Some(5),
            status: ReadingStatus::Finished,
            notes: String::new(),
            notes_html: String::new(),
            is_public: true,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        };
        let meta = book_meta(&book, &site());
        assert_eq!(meta.title, "Dune by Frank Herbert | Field Notes");
        // Empty notes fall back to the site description
        assert_eq!(meta.description, "A personal blog");
        assert_eq!(meta.json_ld["reviewRating"]["ratingValue"], 5);
    }

    async fn setup_service() -> (SeoService, crate::db::DynDatabasePool) {
        let pool = setup_pool().await;
        let cache = create_cache(&CacheConfig::default()).unwrap();
        let settings = Arc::new(SettingsService::new(
            SqlxSettingsRepository::boxed(pool.clone()),
            cache.clone(),
            &SiteConfig {
                url: "https://notes.example.com".to_string(),
                ..Default::default()
            },
        ));
        let service = SeoService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool.clone()),
            SqlxSeriesRepository::boxed(pool.clone()),
            SqlxBookRepository::boxed(pool.clone()),
            settings,
            cache,
        );
        (service, pool)
    }

    #[tokio::test]
    async fn test_sitemap_lists_published_posts_only() {
        let (service, pool) = setup_service().await;
        insert_post(&pool, "live-post", PostStatus::Published).await;
        insert_post(&pool, "secret-draft", PostStatus::Draft).await;

        let xml = service.sitemap_xml().await.unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<loc>https://notes.example.com/</loc>"));
        assert!(xml.contains("<loc>https://notes.example.com/posts/live-post</loc>"));
        assert!(!xml.contains("secret-draft"));
    }

    #[tokio::test]
    async fn test_feed_and_robots() {
        let (service, pool) = setup_service().await;
        insert_post(&pool, "fish-and-chips", PostStatus::Published).await;

        let feed = service.rss_xml().await.unwrap();
        assert!(feed.contains("<rss version=\"2.0\""));
        assert!(feed.contains("<link>https://notes.example.com/posts/fish-and-chips</link>"));
        assert_eq!(feed.matches("<item>").count(), 1);

        let robots = service.robots_txt().await.unwrap();
        assert!(robots.contains("Disallow: /api/admin/"));
        assert!(robots.contains("Sitemap: https://notes.example.com/sitemap.xml"));
    }
}
