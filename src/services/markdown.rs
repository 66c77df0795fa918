//! Markdown rendering service
//!
//! Markdown to HTML conversion for posts and book notes. pulldown-cmark parses,
//! syntect highlights fenced code blocks, and headings get stable anchor IDs
//! so a table of contents can link to them.
//!
//! # Example
//!
//! ```
//! use folio::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("# Hello World\n\nThis is **bold** text.");
//! assert!(html.contains("<h1 id=\"hello-world\">"));
//! assert!(html.contains("<strong>"));
//! ```

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use super::text::generate_slug;

const DEFAULT_THEME: &str = "base16-ocean.dark";

/// One heading in a rendered document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// 1..=6
    pub level: u8,
    pub text: String,
    /// Anchor ID, unique within the document
    pub id: String,
}

/// A thread-safe Markdown renderer with syntax highlighting.
///
/// Supports tables, strikethrough, task lists and smart punctuation on top of
/// CommonMark.
#[derive(Clone)]
pub struct MarkdownRenderer {
    syntax_set: Arc<SyntaxSet>,
    theme_set: Arc<ThemeSet>,
    theme_name: String,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    /// Renderer with the "base16-ocean.dark" highlighting theme
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Renderer with a specific syntect theme, falling back to the default
    /// when the theme is unknown.
    pub fn with_theme(theme_name: &str) -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();

        let validated_theme = if theme_set.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else {
            DEFAULT_THEME.to_string()
        };

        Self {
            syntax_set: Arc::new(syntax_set),
            theme_set: Arc::new(theme_set),
            theme_name: validated_theme,
        }
    }

    /// Render Markdown to HTML
    pub fn render(&self, markdown: &str) -> String {
        self.render_with_toc(markdown).0
    }

    /// Render Markdown to HTML and collect the headings
    pub fn render_with_toc(&self, markdown: &str) -> (String, Vec<TocEntry>) {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);

        let parser = Parser::new_ext(markdown, options);
        let (events, toc) = self.process_events(parser);

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());
        (html_output, toc)
    }

    /// Highlight code blocks and give headings anchor IDs.
    fn process_events<'a>(&self, parser: Parser<'a>) -> (Vec<Event<'a>>, Vec<TocEntry>) {
        let mut events = Vec::new();
        let mut toc = Vec::new();
        let mut used_ids: HashMap<String, usize> = HashMap::new();

        let mut in_code_block = false;
        let mut code_lang: Option<String> = None;
        let mut code_content = String::new();

        // Open heading: level, explicit id, buffered inner events, plain text
        let mut heading: Option<(HeadingLevel, Option<CowStr<'a>>, Vec<Event<'a>>, String)> = None;

        for event in parser {
            if let Some((level, explicit_id, inner, text)) = heading.as_mut() {
                match event {
                    Event::End(TagEnd::Heading(_)) => {
                        let level = *level;
                        let base = explicit_id
                            .take()
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| generate_slug(text));
                        let id = dedupe_id(&mut used_ids, base);
                        toc.push(TocEntry {
                            level: heading_level_number(level),
                            text: text.trim().to_string(),
                            id: id.clone(),
                        });

                        events.push(Event::Start(Tag::Heading {
                            level,
                            id: Some(id.into()),
                            classes: Vec::new(),
                            attrs: Vec::new(),
                        }));
                        events.append(inner);
                        events.push(Event::End(TagEnd::Heading(level)));
                        heading = None;
                    }
                    Event::Text(ref t) | Event::Code(ref t) => {
                        text.push_str(t);
                        inner.push(event);
                    }
                    other => inner.push(other),
                }
                continue;
            }

            match event {
                Event::Start(Tag::Heading { level, id, .. }) => {
                    heading = Some((level, id, Vec::new(), String::new()));
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    in_code_block = true;
                    code_content.clear();
                    code_lang = match kind {
                        CodeBlockKind::Fenced(lang) => {
                            let lang = lang.split_whitespace().next().unwrap_or("").to_string();
                            (!lang.is_empty()).then_some(lang)
                        }
                        CodeBlockKind::Indented => None,
                    };
                }
                Event::End(TagEnd::CodeBlock) => {
                    in_code_block = false;
                    let highlighted = match code_lang.take() {
                        Some(lang) => self.highlight_code(&code_content, &lang),
                        None => plain_code_block(&code_content, None),
                    };
                    events.push(Event::Html(highlighted.into()));
                }
                Event::Text(text) if in_code_block => {
                    code_content.push_str(&text);
                }
                _ => events.push(event),
            }
        }

        (events, toc)
    }

    /// Syntax-highlight a code block; unknown languages render plain with a
    /// `language-*` class.
    fn highlight_code(&self, code: &str, lang: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang));

        match (syntax, self.theme_set.themes.get(&self.theme_name)) {
            (Some(syntax), Some(theme)) => {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
                    .unwrap_or_else(|_| plain_code_block(code, Some(lang)))
            }
            _ => plain_code_block(code, Some(lang)),
        }
    }
}

fn heading_level_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Make an anchor ID unique within a document (`intro`, `intro-1`, ...)
fn dedupe_id(used: &mut HashMap<String, usize>, base: String) -> String {
    let base = if base.is_empty() {
        "section".to_string()
    } else {
        base
    };
    let count = used.entry(base.clone()).or_insert(0);
    let id = if *count == 0 {
        base
    } else {
        format!("{}-{}", base, count)
    };
    *count += 1;
    id
}

fn plain_code_block(code: &str, lang: Option<&str>) -> String {
    match lang {
        Some(lang) => format!(
            "<pre><code class=\"language-{}\">{}</code></pre>",
            html_escape(lang),
            html_escape(code)
        ),
        None => format!("<pre><code>{}</code></pre>", html_escape(code)),
    }
}

/// Escapes HTML special characters in a string.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
