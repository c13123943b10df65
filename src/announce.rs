//! Filtering, ordering and emission of one fetched batch.
//!
//! [`AnnounceSequencer`] owns a source's [`Watermark`] and [`FirstRun`] flag
//! and turns a raw, unordered batch into an oldest-first stream of sink calls.
//! State only changes after the whole batch has been delivered: a failure
//! part-way through leaves everything as it was, so the next cycle offers the
//! same items again.  A duplicate announcement is preferred over a lost one.

use tracing::debug;

use crate::error::CycleError;
use crate::first_run::{FirstRun, FirstRunMode};
use crate::source::Chronological;
use crate::watermark::{Key, Watermark};

#[derive(Debug, Clone)]
pub struct AnnounceSequencer<K: Key> {
    watermark: Watermark<K>,
    first_run: FirstRun,
    margin: Option<K::Margin>,
}

impl<K: Key> Default for AnnounceSequencer<K> {
    fn default() -> Self {
        Self::new(FirstRunMode::default())
    }
}

impl<K: Key> AnnounceSequencer<K> {
    pub fn new(mode: FirstRunMode) -> Self {
        Self {
            watermark: Watermark::new(),
            first_run: FirstRun::new(mode),
            margin: None,
        }
    }

    /// Push the watermark this far past the newest announced key.
    ///
    /// For upstreams that keep returning the entry stamped exactly at the
    /// `since` value.  Items inside the margin are never announced.
    pub fn with_margin(mut self, margin: K::Margin) -> Self {
        self.margin = Some(margin);
        self
    }

    /// Resume from a persisted watermark.
    pub fn with_watermark(mut self, watermark: Watermark<K>) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn watermark(&self) -> &Watermark<K> {
        &self.watermark
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run.is_first_run()
    }

    /// Forget the watermark and re-arm first-run, so the next cycle replays
    /// the full backlog as if the source were new.
    pub fn reset(&mut self) {
        self.watermark.reset();
        self.first_run.reset();
    }

    /// Run one cycle.
    ///
    /// `fetch` receives the current watermark key as a `since` hint.  Items
    /// not strictly newer than the watermark are dropped, the rest are
    /// stable-sorted by key and handed to `sink` one at a time.  Returns the
    /// number of items announced.
    pub fn run<I, F, S>(&mut self, fetch: F, mut sink: S) -> Result<usize, CycleError>
    where
        I: Chronological<Key = K>,
        F: FnOnce(Option<&K>) -> anyhow::Result<Vec<I>>,
        S: FnMut(&I, bool) -> anyhow::Result<()>,
    {
        let batch = fetch(self.watermark.last()).map_err(CycleError::Fetch)?;
        let fetched = batch.len();

        let mut fresh: Vec<(K, I)> = batch
            .into_iter()
            .filter_map(|item| {
                let key = item.key();
                self.watermark.should_announce(&key).then_some((key, item))
            })
            .collect();

        if fresh.is_empty() {
            debug!(fetched, "nothing new");
            self.first_run.settle(0);
            return Ok(0);
        }

        // Oldest first, so the channel reads top to bottom.
        fresh.sort_by(|(a, _), (b, _)| a.cmp(b));

        let first_run = self.first_run.is_first_run();
        for (delivered, (_, item)) in fresh.iter().enumerate() {
            sink(item, first_run).map_err(|source| CycleError::Sink { delivered, source })?;
        }

        let count = fresh.len();
        if let Some((newest, _)) = fresh.pop() {
            let target = match self.margin {
                Some(margin) => newest.widen(margin),
                None => newest,
            };
            self.watermark.advance(target);
        }
        self.first_run.settle(count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use chrono::{DateTime, TimeZone, Utc};

    #[derive(Debug, Clone, PartialEq)]
    struct Post {
        id: u64,
        body: &'static str,
    }

    impl Chronological for Post {
        type Key = u64;

        fn key(&self) -> u64 {
            self.id
        }
    }

    fn posts(ids: &[u64]) -> Vec<Post> {
        ids.iter().map(|&id| Post { id, body: "" }).collect()
    }

    /// Run a cycle and collect `(id, first_run)` for every sink call.
    fn run_ids(seq: &mut AnnounceSequencer<u64>, ids: &[u64]) -> Vec<(u64, bool)> {
        let mut seen = Vec::new();
        let batch = posts(ids);
        seq.run(
            |_| Ok(batch),
            |post: &Post, first| {
                seen.push((post.id, first));
                Ok(())
            },
        )
        .unwrap();
        seen
    }

    #[test]
    fn emits_in_chronological_order() {
        let mut seq = AnnounceSequencer::default();
        let seen = run_ids(&mut seq, &[1, 3, 2]);
        assert_eq!(seen.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(seq.watermark().last(), Some(&3));
    }

    #[test]
    fn equal_keys_keep_fetch_order() {
        let mut seq = AnnounceSequencer::<u64>::default();
        let batch = vec![
            Post { id: 5, body: "b" },
            Post { id: 4, body: "a" },
            Post { id: 5, body: "c" },
        ];
        let mut bodies = Vec::new();
        seq.run(
            |_| Ok(batch),
            |post: &Post, _| {
                bodies.push(post.body);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(bodies, vec!["a", "b", "c"]);
    }

    #[test]
    fn overlapping_windows_announce_each_key_once() {
        let mut seq = AnnounceSequencer::default();
        let mut all = Vec::new();
        let windows: [&[u64]; 4] = [&[1, 2, 3], &[2, 3, 4, 5], &[5], &[4, 6, 5]];
        for window in windows {
            all.extend(run_ids(&mut seq, window).into_iter().map(|(id, _)| id));
        }
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn watermark_is_monotonic_across_runs() {
        let mut seq = AnnounceSequencer::default();
        let mut previous = None;
        let windows: [&[u64]; 5] = [&[10, 20], &[5], &[15, 25], &[], &[1, 2, 3]];
        for window in windows {
            run_ids(&mut seq, window);
            let now = seq.watermark().last().copied();
            assert!(now >= previous, "{now:?} regressed below {previous:?}");
            previous = now;
        }
        assert_eq!(previous, Some(25));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut seq = AnnounceSequencer::default();
        run_ids(&mut seq, &[7]);
        let mut seq_first = AnnounceSequencer::<u64>::default();

        for s in [&mut seq, &mut seq_first] {
            let before_wm = s.watermark().clone();
            let before_fr = s.is_first_run();
            let mut calls = 0;
            let n = s
                .run(|_| Ok(posts(&[])), |_: &Post, _| {
                    calls += 1;
                    Ok(())
                })
                .unwrap();
            assert_eq!(n, 0);
            assert_eq!(calls, 0);
            assert_eq!(s.watermark(), &before_wm);
            assert_eq!(s.is_first_run(), before_fr);
        }

        // Everything already seen filters down to empty as well.
        assert!(run_ids(&mut seq, &[3, 7]).is_empty());
        assert_eq!(seq.watermark().last(), Some(&7));
    }

    #[test]
    fn first_run_is_constant_for_the_batch_then_clears() {
        let mut seq = AnnounceSequencer::default();
        assert!(seq.is_first_run());

        let seen = run_ids(&mut seq, &[1, 2, 3]);
        assert_eq!(seen, vec![(1, true), (2, true), (3, true)]);
        assert!(!seq.is_first_run());

        assert_eq!(run_ids(&mut seq, &[4]), vec![(4, false)]);
    }

    #[test]
    fn clear_on_cycle_mode_clears_on_empty_batch() {
        let mut seq = AnnounceSequencer::<u64>::new(FirstRunMode::ClearOnCycle);
        assert!(run_ids(&mut seq, &[]).is_empty());
        assert!(!seq.is_first_run());
        assert_eq!(run_ids(&mut seq, &[1]), vec![(1, false)]);
    }

    #[test]
    fn reset_reopens_backlog() {
        let mut seq = AnnounceSequencer::default().with_watermark(Watermark::at(100u64));
        run_ids(&mut seq, &[101]);
        assert!(!seq.is_first_run());

        seq.reset();
        let seen = run_ids(&mut seq, &[50, 100, 150]);
        assert_eq!(seen, vec![(50, true), (100, true), (150, true)]);
        assert_eq!(seq.watermark().last(), Some(&150));
    }

    #[test]
    fn fetch_receives_watermark_as_since_hint() {
        let mut seq = AnnounceSequencer::default();
        let mut hints = Vec::new();
        let batches: [&[u64]; 2] = [&[3, 9], &[12]];
        for ids in batches {
            seq.run(
                |since: Option<&u64>| {
                    hints.push(since.copied());
                    Ok(posts(ids))
                },
                |_: &Post, _| Ok(()),
            )
            .unwrap();
        }
        assert_eq!(hints, vec![None, Some(9)]);
    }

    #[test]
    fn fetch_failure_leaves_state_untouched() {
        let mut seq = AnnounceSequencer::default();
        run_ids(&mut seq, &[1]);
        seq.reset();
        let err = seq
            .run(|_| -> Result<Vec<Post>> { Err(anyhow!("503")) }, |_: &Post, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, CycleError::Fetch(_)));
        assert!(seq.is_first_run());
        assert!(!seq.watermark().is_set());
    }

    #[test]
    fn sink_failure_mid_batch_retries_whole_batch() {
        let mut seq = AnnounceSequencer::default();
        let mut sent = Vec::new();
        let err = seq
            .run(
                |_| Ok(posts(&[1, 2, 3])),
                |post: &Post, _| {
                    if post.id == 2 {
                        return Err(anyhow!("connection reset"));
                    }
                    sent.push(post.id);
                    Ok(())
                },
            )
            .unwrap_err();

        assert!(matches!(err, CycleError::Sink { delivered: 1, .. }));
        assert_eq!(sent, vec![1]);
        assert!(!seq.watermark().is_set());
        assert!(seq.is_first_run());

        // Next cycle re-announces the batch, item 1 included.
        assert_eq!(run_ids(&mut seq, &[1, 2, 3]), vec![(1, true), (2, true), (3, true)]);
    }

    #[test]
    fn margin_skips_entries_sharing_the_last_timestamp_window() {
        #[derive(Debug)]
        struct Memo(DateTime<Utc>);
        impl Chronological for Memo {
            type Key = DateTime<Utc>;
            fn key(&self) -> DateTime<Utc> {
                self.0
            }
        }

        let t = |m: u32, s: u32| Utc.with_ymd_and_hms(2009, 5, 1, 9, m, s).unwrap();
        let mut seq = AnnounceSequencer::default().with_margin(chrono::Duration::minutes(1));

        let mut announced = Vec::new();
        for batch in [vec![Memo(t(0, 0))], vec![Memo(t(0, 0)), Memo(t(0, 30)), Memo(t(1, 5))]] {
            seq.run(
                |_| Ok(batch),
                |memo: &Memo, _| {
                    announced.push(memo.0);
                    Ok(())
                },
            )
            .unwrap();
        }

        assert_eq!(announced, vec![t(0, 0), t(1, 5)]);
        assert_eq!(seq.watermark().last(), Some(&t(2, 5)));
    }
}
