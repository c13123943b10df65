//! The item type shared by feed-style sources.
//!
//! `FeedItem` represents a single entry from a feed (RSS, Atom, a status
//! list rendered as a feed, ...).  Feed sources convert their native format
//! into `FeedItem`s so the sinks can stay format-agnostic.
//!
//! ## For contributors
//!
//! If you are adding a feed-like source you do **not** need to modify this
//! file unless your source requires extra fields.  Sources with their own
//! item shape should define a type and implement [`Chronological`] instead.

use chrono::{DateTime, Utc};

use super::Chronological;

/// A single feed entry, normalised from any feed format.
///
/// ## Ordering
///
/// The chronological key is the publication date.  Undated entries get the
/// earliest representable instant; feed sources such as [`RssSource`] drop
/// them while parsing, so an undated entry is never announced.
///
/// [`RssSource`]: super::RssSource
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeedItem {
    /// Human-readable headline.
    pub title: String,

    /// Author as given by the feed, if any.
    pub author: Option<String>,

    /// URL to the full content.
    pub link: Option<String>,

    /// Publication timestamp.
    pub published: Option<DateTime<Utc>>,

    /// Label of the feed this came from (e.g. "BBC News").
    pub source_name: String,
}

impl FeedItem {
    /// Who to show as the sender: the item's author, else the feed label.
    pub fn display_author(&self) -> &str {
        self.author
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.source_name)
    }

    /// Title followed by the link, the default announcement body.
    pub fn display_body(&self) -> String {
        match &self.link {
            Some(link) => format!("{} {link}", self.title),
            None => self.title.clone(),
        }
    }
}

impl Chronological for FeedItem {
    type Key = DateTime<Utc>;

    fn key(&self) -> DateTime<Utc> {
        self.published.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Shorthand constructor for tests.
    fn make_item(title: &str, published: Option<DateTime<Utc>>) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            author: None,
            link: None,
            published,
            source_name: "test".to_string(),
        }
    }

    #[test]
    fn key_follows_publication_date() {
        let old = make_item("Old", Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let new = make_item("New", Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));

        let mut items = vec![new, old];
        items.sort_by_key(|i| i.key());

        assert_eq!(items[0].title, "Old", "oldest first");
        assert_eq!(items[1].title, "New");
    }

    #[test]
    fn undated_items_key_before_dated() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let dated = make_item("Dated", Some(at));
        let undated = make_item("Undated", None);
        assert!(undated.key() < dated.key());
        assert_eq!(undated.key(), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn author_falls_back_to_feed_label() {
        let mut item = make_item("T", None);
        assert_eq!(item.display_author(), "test");
        item.author = Some(String::new());
        assert_eq!(item.display_author(), "test");
        item.author = Some("alice".into());
        assert_eq!(item.display_author(), "alice");
    }

    #[test]
    fn body_appends_link_when_present() {
        let mut item = make_item("Headline", None);
        assert_eq!(item.display_body(), "Headline");
        item.link = Some("https://example.com/1".into());
        assert_eq!(item.display_body(), "Headline https://example.com/1");
    }
}
