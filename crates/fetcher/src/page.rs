//! Dated-container lookup in a published page.
//!
//! The source marks each day's content with an element whose class list holds
//! `js-comic-container-{YYYY-MM-DD}`; the title and image address are carried
//! as `data-title` / `data-image` attributes on that element:
//!
//! ```text
//! <div class="comic-item-container js-comic js-comic-container-2023-03-07"
//!      data-title="..." data-image="//assets.example.com/strip.png">
//! ```
//!
//! Attribute values are passed on as they appear in the page, entities
//! included.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use courier_common::types::{ContentDescriptor, DateKey, DescriptorError};

/// Class token prefix that marks a dated container.
pub const CONTAINER_CLASS_PREFIX: &str = "js-comic-container-";
pub const TITLE_ATTR: &str = "data-title";
pub const LOCATOR_ATTR: &str = "data-image";

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("invalid comment pattern"));

/// A start tag; group 1 holds its attribute list. Unquoted values run to the
/// next whitespace or `>`, so a stray quote inside one does not open a string.
static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<[a-zA-Z][a-zA-Z0-9-]*((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+))?)*)\s*/?>"#,
    )
    .expect("invalid start tag pattern")
});

/// One attribute: name, then a double-quoted, single-quoted or bare value.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+)))?"#)
        .expect("invalid attribute pattern")
});

/// The dated container exists but its content cannot be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("container for {date_key} has no {attribute} attribute")]
    MissingAttribute {
        date_key: DateKey,
        attribute: &'static str,
    },

    #[error("container for {date_key}: {source}")]
    Descriptor {
        date_key: DateKey,
        source: DescriptorError,
    },
}

/// Find the first container for `date_key` and build its descriptor.
///
/// `Ok(None)` means the page does not (yet) carry that date.
pub fn find_dated_content(
    html: &str,
    date_key: DateKey,
) -> Result<Option<ContentDescriptor>, ExtractError> {
    let marker = format!("{}{}", CONTAINER_CLASS_PREFIX, date_key);
    let html = COMMENT.replace_all(html, "");

    let Some(attributes) = START_TAG
        .captures_iter(&html)
        .map(|tag| attributes(tag.get(1).map_or("", |m| m.as_str())))
        .find(|attrs| has_class(attrs, &marker))
    else {
        return Ok(None);
    };

    let title = attribute(&attributes, TITLE_ATTR).ok_or(ExtractError::MissingAttribute {
        date_key,
        attribute: TITLE_ATTR,
    })?;
    let locator = attribute(&attributes, LOCATOR_ATTR).ok_or(ExtractError::MissingAttribute {
        date_key,
        attribute: LOCATOR_ATTR,
    })?;

    ContentDescriptor::new(title, locator)
        .map(Some)
        .map_err(|source| ExtractError::Descriptor { date_key, source })
}

fn attributes(list: &str) -> Vec<(&str, &str)> {
    ATTRIBUTE
        .captures_iter(list)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let value = (2..=4)
                .find_map(|i| caps.get(i))
                .map_or("", |m| m.as_str());
            Some((name, value))
        })
        .collect()
}

fn attribute<'a>(attributes: &[(&'a str, &'a str)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| *v)
}

fn has_class(attributes: &[(&str, &str)], class: &str) -> bool {
    attributes
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case("class"))
        .any(|(_, v)| v.split_ascii_whitespace().any(|token| token == class))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> DateKey {
        s.parse().unwrap()
    }

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<!-- <div class="js-comic-container-2023-03-07" data-title="old" data-image="//a/old.png"> -->
<div class="comic-item-container js-comic js-comic-container-2023-03-07"
     data-id="2023-03-07" data-title="Dogbert&#39;s &quot;Plan&quot;"
     data-image="//assets.example.com/strips/a1b2c3.png"
     data-url="https://example.com/strip/2023-03-07">
  <img src="x.png" alt="a > b">
</div>
<div class="comic-item-container js-comic js-comic-container-2023-03-06"
     data-title="Yesterday" data-image="https://assets.example.com/strips/prev.png">
</div>
</body></html>"#;

    #[test]
    fn test_finds_todays_container() {
        let content = find_dated_content(PAGE, key("2023-03-07")).unwrap().unwrap();
        assert_eq!(content.title, "Dogbert&#39;s &quot;Plan&quot;");
        assert_eq!(content.locator, "https://assets.example.com/strips/a1b2c3.png");
    }

    #[test]
    fn test_complete_locator_is_kept() {
        let content = find_dated_content(PAGE, key("2023-03-06")).unwrap().unwrap();
        assert_eq!(content.title, "Yesterday");
        assert_eq!(content.locator, "https://assets.example.com/strips/prev.png");
    }

    #[test]
    fn test_missing_date_is_none() {
        assert_eq!(find_dated_content(PAGE, key("2023-03-08")).unwrap(), None);
        assert_eq!(find_dated_content("", key("2023-03-08")).unwrap(), None);
    }

    #[test]
    fn test_class_must_match_whole_token() {
        let html = r#"<div class="js-comic-container-2023-03-07x" data-title="t" data-image="//a/b">"#;
        assert_eq!(find_dated_content(html, key("2023-03-07")).unwrap(), None);
    }

    #[test]
    fn test_apostrophe_in_bare_value_does_not_hide_container() {
        let html = r#"<a title=it's href=/x>back</a>
<div class="js-comic-container-2023-03-07" data-title="Monday" data-image="//a/1.png"></div>"#;
        let content = find_dated_content(html, key("2023-03-07")).unwrap().unwrap();
        assert_eq!(content.title, "Monday");
    }

    #[test]
    fn test_escaped_title_is_passed_through() {
        let html = r#"<div class="js-comic-container-2023-03-07" data-title="Q&amp;A &lt;3" data-image="//a/1.png">"#;
        let content = find_dated_content(html, key("2023-03-07")).unwrap().unwrap();
        assert_eq!(content.title, "Q&amp;A &lt;3");
    }

    #[test]
    fn test_container_without_image_is_shape_error() {
        let html = r#"<div class='js-comic-container-2023-03-07' data-title=plain>"#;
        let err = find_dated_content(html, key("2023-03-07")).unwrap_err();
        assert_eq!(
            err,
            ExtractError::MissingAttribute {
                date_key: key("2023-03-07"),
                attribute: LOCATOR_ATTR,
            }
        );
    }

    #[test]
    fn test_empty_image_is_shape_error() {
        let html = r#"<div class="js-comic-container-2023-03-07" data-title="t" data-image="">"#;
        assert!(matches!(
            find_dated_content(html, key("2023-03-07")),
            Err(ExtractError::Descriptor { .. })
        ));
    }

    #[test]
    fn test_first_container_wins() {
        let html = r#"
<div class="js-comic-container-2023-03-07" data-title="first" data-image="//a/1.png"></div>
<div class="js-comic-container-2023-03-07" data-title="second" data-image="//a/2.png"></div>"#;
        let content = find_dated_content(html, key("2023-03-07")).unwrap().unwrap();
        assert_eq!(content.title, "first");
    }
}
