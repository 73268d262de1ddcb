//! Tweet body rendering.
//!
//! Turns a tweet's raw text plus its entity annotations into HTML:
//!
//! - Hashtags become links to a hashtag search
//! - URLs become links to the expanded URL, labelled with the display form
//! - Mentions become links to the user's profile
//! - Media markers are removed (attachments are rendered separately)
//!
//! Links to single tweets are either rendered like any other URL or removed
//! entirely, so that the quoted tweet can be embedded in full instead.
//!
//! Entity offsets are character (code point) offsets, not byte offsets.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::model::TextReplacement;
use crate::uri_is_tweet;

/// Render a tweet body as HTML.
///
/// `link_quotes` controls whether URLs pointing at single tweets are kept as
/// links (`true`) or stripped (`false`).
#[must_use]
pub fn render_html(text: &str, entities: &Value, link_quotes: bool) -> String {
    // Keyed by start offset; a later category overwrites an earlier one
    // that starts at the same offset.
    let mut replacements: BTreeMap<usize, TextReplacement> = BTreeMap::new();

    for tag in entity_list(entities, "hashtags") {
        let Some((start, end)) = span(tag) else { continue };
        let Some(hash) = tag["text"].as_str() else {
            warn!("Hashtag entity without text at offset {start}");
            continue;
        };
        let markup = format!(r#"<a href="https://twitter.com/hashtag/{hash}">#{hash}</a>"#);
        replacements.insert(start, TextReplacement::new(start, end, markup));
    }

    for url in entity_list(entities, "urls") {
        let Some((start, end)) = span(url) else { continue };
        let expanded = url["expanded_url"].as_str().unwrap_or_default();
        let display = url["display_url"].as_str().unwrap_or(expanded);
        let markup = if uri_is_tweet(expanded) && !link_quotes {
            String::new()
        } else {
            format!(r#"<a href="{expanded}">{display}</a>"#)
        };
        replacements.insert(start, TextReplacement::new(start, end, markup));
    }

    for mention in entity_list(entities, "user_mentions") {
        let Some((start, end)) = span(mention) else { continue };
        let Some(username) = mention["screen_name"].as_str() else {
            warn!("Mention entity without screen_name at offset {start}");
            continue;
        };
        let markup = format!(r#"<a href="https://twitter.com/{username}">@{username}</a>"#);
        replacements.insert(start, TextReplacement::new(start, end, markup));
    }

    for media in entity_list(entities, "media") {
        let Some((start, end)) = span(media) else { continue };
        replacements.insert(start, TextReplacement::new(start, end, ""));
    }

    apply_replacements(text, replacements.into_values()).replace('\n', "<br/>")
}

/// Splice replacements into `text`, highest start offset first.
///
/// Working from the end keeps every lower offset valid while earlier
/// splices change the text length. Offsets past the end of the text are
/// clamped to it.
#[must_use]
pub fn apply_replacements(
    text: &str,
    replacements: impl IntoIterator<Item = TextReplacement>,
) -> String {
    let mut ordered: Vec<TextReplacement> = replacements.into_iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut chars: Vec<char> = text.chars().collect();
    for r in ordered {
        let start = r.start.min(chars.len());
        let end = r.end.clamp(start, chars.len());
        chars.splice(start..end, r.replacement.chars());
    }
    chars.into_iter().collect()
}

fn entity_list<'a>(entities: &'a Value, key: &str) -> &'a [Value] {
    entities[key].as_array().map_or(&[][..], Vec::as_slice)
}

/// Read an entity's `[start, end]` pair.
///
/// Live API responses carry numbers, bulk exports carry numeric strings.
fn span(entity: &Value) -> Option<(usize, usize)> {
    let indices = entity["indices"].as_array()?;
    let index = |v: &Value| -> Option<usize> {
        v.as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    };
    match indices.as_slice() {
        [start, end] => Some((index(start)?, index(end)?)),
        _ => {
            warn!("Entity with malformed indices: {}", entity["indices"]);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mention_and_url_splice() {
        let text = "hello @bob check example.com";
        let entities = json!({
            "user_mentions": [{"screen_name": "bob", "indices": [6, 10]}],
            "urls": [{
                "expanded_url": "https://example.com/",
                "display_url": "example.com",
                "indices": [17, 28]
            }]
        });
        assert_eq!(
            render_html(text, &entities, false),
            r#"hello <a href="https://twitter.com/bob">@bob</a> check <a href="https://example.com/">example.com</a>"#
        );
    }

    #[test]
    fn test_splice_order_independent_of_input_order() {
        let text = "hello @bob check example.com";
        let spans = vec![
            TextReplacement::new(6, 10, "[M]"),
            TextReplacement::new(17, 28, "[URL]"),
            TextReplacement::new(0, 5, "[H]"),
        ];
        let mut reversed = spans.clone();
        reversed.reverse();
        let expected = "[H] [M] check [URL]";
        assert_eq!(apply_replacements(text, spans), expected);
        assert_eq!(apply_replacements(text, reversed), expected);
    }

    #[test]
    fn test_quote_links_stripped_or_rendered() {
        let text = "so true https://t.co/abc";
        let entities = json!({
            "urls": [{
                "expanded_url": "https://twitter.com/jack/status/20",
                "display_url": "twitter.com/jack/status/20",
                "indices": [8, 24]
            }]
        });
        assert_eq!(render_html(text, &entities, false), "so true ");
        assert_eq!(
            render_html(text, &entities, true),
            r#"so true <a href="https://twitter.com/jack/status/20">twitter.com/jack/status/20</a>"#
        );
    }

    #[test]
    fn test_hashtags_media_and_newlines() {
        let text = "#rust\nis great https://t.co/pic";
        let entities = json!({
            "hashtags": [{"text": "rust", "indices": ["0", "5"]}],
            "media": [{"indices": ["15", "31"]}]
        });
        assert_eq!(
            render_html(text, &entities, true),
            r#"<a href="https://twitter.com/hashtag/rust">#rust</a><br/>is great "#
        );
    }

    #[test]
    fn test_offsets_count_characters_not_bytes() {
        let text = "🦀 @crab hi";
        let entities = json!({
            "user_mentions": [{"screen_name": "crab", "indices": [2, 7]}]
        });
        assert_eq!(
            render_html(text, &entities, false),
            r#"🦀 <a href="https://twitter.com/crab">@crab</a> hi"#
        );
    }

    #[test]
    fn test_no_entities_is_identity_except_newlines() {
        assert_eq!(render_html("a\nb", &json!({}), false), "a<br/>b");
        assert_eq!(render_html("plain", &Value::Null, true), "plain");
    }

    #[test]
    fn test_out_of_range_offsets_clamp() {
        let out = apply_replacements("abc", vec![TextReplacement::new(2, 99, "Z")]);
        assert_eq!(out, "abZ");
    }
}
