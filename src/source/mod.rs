//! Data source abstraction layer.
//!
//! This module defines the [`DataSource`] and [`Chronological`] traits that
//! every poll target implements, plus the common [`FeedItem`] type.  Concrete
//! source implementations live in sub-modules (currently only [`RssSource`]).
//!
//! ## Adding a new source
//!
//! 1. Create a new file in this directory (e.g. `memo.rs`).
//! 2. Define an item type and implement [`Chronological`] for it, picking
//!    a timestamp or a monotonically increasing id as the key.
//! 3. Define a struct holding the source's configuration and implement
//!    [`DataSource`] for it.
//! 4. Add `mod memo;` below and re-export your types in the `pub use` block.
//!
//! The scheduler, gate, de-duplication and ordering are all source-agnostic.

mod feed_item;
mod rss;

pub use feed_item::FeedItem;
pub use self::rss::RssSource;

use anyhow::Result;

use crate::watermark::Key;

/// An item that can be placed on a timeline.
pub trait Chronological {
    type Key: Key;

    /// The ordering key: a timestamp or a strictly increasing id.
    fn key(&self) -> Self::Key;
}

/// Key type produced by a source's items.
pub type KeyOf<S> = <<S as DataSource>::Item as Chronological>::Key;

/// Trait that every poll target must implement.
///
/// [`fetch()`](DataSource::fetch) runs on a blocking worker thread, once per
/// admitted cycle, so implementations must be [`Send`] and [`Sync`] and may
/// perform synchronous I/O.
///
/// ## Implementing a new source
///
/// ```ignore
/// pub struct MemoSource { /* config fields */ }
///
/// impl DataSource for MemoSource {
///     type Item = Memo;
///
///     fn kind(&self) -> &str { "Memo" }
///     fn name(&self) -> &str { &self.username }
///
///     fn fetch(&self, since: Option<&DateTime<Utc>>) -> Result<Vec<Memo>> {
///         // Perform HTTP / IO, then convert into Memo values.
///         todo!()
///     }
/// }
/// ```
pub trait DataSource: Send + Sync + 'static {
    type Item: Chronological + Send + 'static;

    /// Short type label, e.g. `"Feed"` or `"Lists"`.
    fn kind(&self) -> &str;

    /// What is being polled: a URL, a list path, a query.
    fn name(&self) -> &str;

    /// Whether enough configuration is present to be worth scheduling.
    ///
    /// Checked on every reconciliation; an invalid source simply stays
    /// stopped.
    fn is_valid(&self) -> bool {
        true
    }

    /// Fetch the latest batch of items, in any order.
    ///
    /// `since` is the key of the newest item already announced, if any.
    /// APIs that support it (`since_id` and friends) can use it to trim the
    /// response; items at or below it are filtered out regardless.
    fn fetch(&self, since: Option<&<Self::Item as Chronological>::Key>) -> Result<Vec<Self::Item>>;
}
