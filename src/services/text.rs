//! Text utilities shared by the content services
//!
//! Plain-text extraction from markdown, excerpts, reading-time estimates and
//! slug generation. Everything here works on characters, never on bytes.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;

/// Reading speed used for estimates, in words per minute
pub const WORDS_PER_MINUTE: usize = 200;

/// Slugs are cut to this many characters so a `-N` suffix still fits the column
pub const MAX_SLUG_CHARS: usize = 180;

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)(```|~~~).*?(```|~~~)").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]*)`").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+").unwrap());
static BLOCKQUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(>[ \t]?)+").unwrap());
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*([-*+]|\d+[.)])[ \t]+").unwrap());
static RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*([-*_][ \t]*){3,}$").unwrap());
static STRONG_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{1,3}([^*\n]+?)\*{1,3}").unwrap());
static STRONG_UNDERSCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^\w])_{1,3}([^_\n]+?)_{1,3}([^\w]|$)").unwrap());
static STRIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~([^~\n]+?)~~").unwrap());

/// Reduce markdown to plain text with collapsed whitespace.
///
/// Code blocks and images are dropped, links keep their text, and heading,
/// emphasis, quote and list markers are removed.
pub fn strip_markdown(markdown: &str) -> String {
    let text = FENCED_CODE.replace_all(markdown, " ");
    let text = IMAGE.replace_all(&text, " ");
    let text = LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = HTML_TAG.replace_all(&text, " ");
    let text = RULE.replace_all(&text, " ");
    let text = HEADING.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = LIST_MARKER.replace_all(&text, "");
    let text = STRONG_STAR.replace_all(&text, "$1");
    let text = STRONG_UNDERSCORE.replace_all(&text, "$1$2$3");
    let text = STRIKE.replace_all(&text, "$1");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_trailing_punctuation(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ';' | ':' | '.' | '-' | '(' | '[' | '{' | '，' | '、' | '。')
}

/// Shorten text to at most `max_chars` characters plus a `...` suffix.
///
/// Text that fits is returned as is. Otherwise the cut moves back to the
/// last whitespace if that still keeps at least 80% of `max_chars`, and
/// stays a hard cut if not. Without the suffix the result is always a
/// prefix of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let Some((cut, next_char)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let hard = &text[..cut];
    let end = if next_char.is_whitespace() {
        cut
    } else {
        match hard.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
            Some((idx, _)) if hard[..idx].chars().count() * 5 >= max_chars * 4 => idx,
            _ => cut,
        }
    };

    let kept = hard[..end].trim_end_matches(is_trailing_punctuation);
    format!("{}...", kept)
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'     // kana
        | '\u{3400}'..='\u{4DBF}'   // CJK extension A
        | '\u{4E00}'..='\u{9FFF}'   // CJK unified ideographs
        | '\u{AC00}'..='\u{D7AF}'   // hangul
        | '\u{F900}'..='\u{FAFF}')
}

/// Count words in plain text. Each CJK character counts as one word.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .map(|token| {
            let cjk = token.chars().filter(|c| is_cjk(*c)).count();
            let has_other = token.chars().any(|c| !is_cjk(c) && c.is_alphanumeric());
            cjk + usize::from(has_other)
        })
        .sum()
}

/// Estimated reading time of a markdown document, at least one minute
pub fn reading_time_minutes(markdown: &str) -> i32 {
    let words = word_count(&strip_markdown(markdown));
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    i32::try_from(minutes).unwrap_or(i32::MAX)
}

/// Turn arbitrary text into a URL slug.
///
/// Lowercases, keeps alphanumerics (including non-ASCII letters), turns
/// everything else into single hyphens and trims hyphens from both ends.
/// Applying it twice gives the same result as applying it once.
pub fn generate_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    let mut count = 0;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                if count + 1 >= MAX_SLUG_CHARS {
                    break;
                }
                slug.push('-');
                count += 1;
            }
            pending_hyphen = false;
            if count >= MAX_SLUG_CHARS {
                break;
            }
            slug.push(c);
            count += 1;
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Find a free slug: `base` itself, else `base-2`, `base-3`, ...
///
/// `exists` answers whether a candidate is taken. An empty `base` is
/// replaced by `fallback`.
pub async fn unique_slug<F, Fut>(base: &str, fallback: &str, mut exists: F) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let base = if base.is_empty() { fallback } else { base };

    if !exists(base.to_string()).await? {
        return Ok(base.to_string());
    }

    let mut n: u64 = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_strip_markdown() {
        let md = "# Title\n\nSome **bold** and _italic_ text with a [link](https://x.y).\n\n\
                  ```rust\nfn main() {}\n```\n\n> quoted\n- item one\n1. item two\n\
                  ![alt](img.png) `code` ~~gone~~";
        assert_eq!(
            strip_markdown(md),
            "Title Some bold and italic text with a link. quoted item one item two code gone"
        );
    }

    #[test]
    fn test_strip_markdown_keeps_snake_case() {
        assert_eq!(strip_markdown("call my_func_name now"), "call my_func_name now");
    }

    #[test]
    fn test_excerpt_short_text_unchanged() {
        assert_eq!(excerpt("short text", 50), "short text");
        assert_eq!(excerpt("", 10), "");
    }

    #[test]
    fn test_excerpt_breaks_at_word_when_late_enough() {
        // Last space before the 20-char cut is at 18 (>= 16, the 80% mark)
        let text = "aaaa bbbb cccc ddd eeeeeeeeee";
        assert_eq!(excerpt(text, 20), "aaaa bbbb cccc ddd...");
    }

    #[test]
    fn test_excerpt_hard_cut_when_space_too_early() {
        // Only space is at 3, far below 80% of 20
        let text = "abc defghijklmnopqrstuvwxyz";
        assert_eq!(excerpt(text, 20), "abc defghijklmnopqrs...");
    }

    #[test]
    fn test_excerpt_cut_exactly_at_boundary() {
        assert_eq!(excerpt("hello world again", 11), "hello world...");
    }

    #[test]
    fn test_excerpt_trims_punctuation() {
        assert_eq!(excerpt("one two three, four five", 14), "one two three...");
    }

    #[test]
    fn test_excerpt_multibyte() {
        let text = "这是一个很长的中文句子没有空格需要截断";
        let out = excerpt(text, 5);
        assert_eq!(out, "这是一个很...");
    }

    #[test]
    fn test_reading_time() {
        assert_eq!(reading_time_minutes(""), 1);
        assert_eq!(reading_time_minutes(&"word ".repeat(200)), 1);
        assert_eq!(reading_time_minutes(&"word ".repeat(201)), 2);
        assert_eq!(reading_time_minutes(&"字".repeat(450)), 3);
        assert_eq!(word_count("hello 世界 rust中文"), 1 + 2 + 3);
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Rust & Axum: 2024!  "), "rust-axum-2024");
        assert_eq!(generate_slug("snake_case--name"), "snake-case-name");
        assert_eq!(generate_slug("Café Crème"), "café-crème");
        assert_eq!(generate_slug("中文 标题"), "中文-标题");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_generate_slug_length_cap() {
        let slug = generate_slug(&"ab ".repeat(200));
        assert!(slug.chars().count() <= MAX_SLUG_CHARS);
        assert!(!slug.ends_with('-'));
    }

    #[tokio::test]
    async fn test_unique_slug_picks_smallest_free_suffix() {
        let taken: HashSet<String> = ["hello", "hello-2", "hello-4"]
            .into_iter()
            .map(String::from)
            .collect();
        let exists = |s: String| {
            let hit = taken.contains(&s);
            async move { Ok(hit) }
        };

        assert_eq!(unique_slug("hello", "post", exists).await.unwrap(), "hello-3");
        assert_eq!(unique_slug("fresh", "post", exists).await.unwrap(), "fresh");
        assert_eq!(unique_slug("", "post", exists).await.unwrap(), "post");
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn slug_is_idempotent(input in "[a-zA-Z0-9 _.,!?éüß中文-]{0,60}") {
                let once = generate_slug(&input);
                prop_assert_eq!(generate_slug(&once), once.clone());
                prop_assert!(!once.starts_with('-') && !once.ends_with('-'));
                prop_assert!(!once.contains("--"));
            }

            #[test]
            fn excerpt_is_prefix_and_bounded(
                input in "[a-z ]{0,120}",
                max in 1usize..80,
            ) {
                let out = excerpt(&input, max);
                let body = out.strip_suffix("...").unwrap_or(&out);
                prop_assert!(input.starts_with(body));
                prop_assert!(body.chars().count() <= max);
            }

            #[test]
            fn excerpt_keeps_at_least_80_percent_when_breaking_at_space(
                input in "[a-z]{1,12}( [a-z]{1,12}){5,20}",
                max in 10usize..60,
            ) {
                let out = excerpt(&input, max);
                if let Some(body) = out.strip_suffix("...") {
                    let next = input[body.len()..].chars().next();
                    // Either a word boundary or a hard cut at the limit
                    let at_boundary = next.map_or(true, |c| c == ' ');
                    let hard_cut = body.chars().count() == max;
                    prop_assert!(at_boundary || hard_cut);
                    if at_boundary && !hard_cut {
                        prop_assert!(body.chars().count() * 5 >= max * 4 - 5);
                    }
                }
            }

            #[test]
            fn reading_time_is_at_least_one(input in ".{0,300}") {
                prop_assert!(reading_time_minutes(&input) >= 1);
            }
        }
    }
}
