//! Per-source chronological cursor.
//!
//! A [`Watermark`] remembers the key of the newest item a source has already
//! announced.  Anything at or below it is filtered out of later fetches, so an
//! item is relayed at most once no matter how much the upstream re-returns.
//!
//! Keys are either wall-clock timestamps (feeds, timelines, memos) or strictly
//! increasing numeric ids (list and search statuses).  Both are expressed
//! through the [`Key`] trait.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A totally ordered chronological key.
///
/// `Margin` is the unit of the optional post-advance offset some upstreams
/// need (an API that keeps re-returning the entry stamped with the exact
/// `since` value).  [`widen`](Key::widen) must never move a key backwards
/// for a non-negative margin.
pub trait Key: Ord + Clone + Debug + Send + Sync + 'static {
    type Margin: Copy + Debug + Send + Sync + 'static;

    /// Return this key pushed forward by `margin`, saturating at the
    /// type's upper bound.
    fn widen(&self, margin: Self::Margin) -> Self;
}

impl Key for DateTime<Utc> {
    type Margin = chrono::Duration;

    fn widen(&self, margin: Self::Margin) -> Self {
        self.checked_add_signed(margin).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Key for u64 {
    type Margin = u64;

    fn widen(&self, margin: Self::Margin) -> Self {
        self.saturating_add(margin)
    }
}

impl Key for i64 {
    type Margin = i64;

    fn widen(&self, margin: Self::Margin) -> Self {
        self.saturating_add(margin)
    }
}

/// Last announced key of one source.
///
/// An unset watermark admits everything.  Once set it only ever moves
/// forward, except through an explicit [`reset`](Watermark::reset).
///
/// The value is serialisable so a host can persist it next to the source's
/// configuration and restore it after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark<K> {
    last: Option<K>,
}

impl<K> Default for Watermark<K> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<K: Key> Watermark<K> {
    /// An unset watermark.
    pub fn new() -> Self {
        Self::default()
    }

    /// A watermark already positioned at `key`.
    pub fn at(key: K) -> Self {
        Self { last: Some(key) }
    }

    /// The stored key, or `None` if nothing has been announced yet.
    pub fn last(&self) -> Option<&K> {
        self.last.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.last.is_some()
    }

    /// `true` iff `key` is strictly newer than the stored key.
    pub fn should_announce(&self, key: &K) -> bool {
        self.last.as_ref().map_or(true, |last| key > last)
    }

    /// Move the watermark to `max(current, key)`.
    pub fn advance(&mut self, key: K) {
        match &self.last {
            Some(last) if *last >= key => {}
            _ => self.last = Some(key),
        }
    }

    /// Forget the stored key so the next cycle replays the full backlog.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
