//! Outbound collaborators.
//!
//! A [`Sink`] turns one announced item into chat output; an [`ErrorSink`]
//! receives human-readable failure messages.  Both are supplied by the host.
//! The helpers here cover the formatting every node of the plugin shares.

use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, TimeZone};

use crate::error::CycleError;
use crate::source::FeedItem;

/// Sender used for notices the plugin emits on its own behalf.
pub const DEFAULT_SENDER: &str = "$Bind";

/// Delivers one item.  Called sequentially, oldest item first.
///
/// `first_run` is constant for a whole batch.
pub trait Sink<I>: Send + Sync {
    fn deliver(&self, item: &I, first_run: bool) -> Result<()>;
}

impl<I, F> Sink<I> for F
where
    F: Fn(&I, bool) -> Result<()> + Send + Sync,
{
    fn deliver(&self, item: &I, first_run: bool) -> Result<()> {
        self(item, first_run)
    }
}

/// Receives user-visible cycle failures.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> ErrorSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Error sink plus the deployment's ignore-errors policy.
#[derive(Clone)]
pub struct Reporter {
    sink: Option<Arc<dyn ErrorSink>>,
    ignore_errors: bool,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("has_sink", &self.sink.is_some())
            .field("ignore_errors", &self.ignore_errors)
            .finish()
    }
}

impl Reporter {
    pub fn new(sink: Arc<dyn ErrorSink>, ignore_errors: bool) -> Self {
        Self {
            sink: Some(sink),
            ignore_errors,
        }
    }

    /// A reporter that drops everything.
    pub fn silent() -> Self {
        Self {
            sink: None,
            ignore_errors: true,
        }
    }

    /// Forward a cycle failure unless errors are being ignored.
    ///
    /// Returns whether anything was sent.
    pub fn report(&self, node: &str, err: &CycleError) -> bool {
        match &self.sink {
            Some(sink) if !self.ignore_errors => {
                sink.report(&collapse_line_breaks(&format!("{node}: {}", err.chain())));
                true
            }
            _ => false,
        }
    }
}

/// How an item is framed in the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Backlog replay; clients typically render it muted and never answer it.
    Notice,
    /// Live traffic.
    Message,
}

impl Framing {
    pub fn for_first_run(first_run: bool) -> Self {
        if first_run {
            Framing::Notice
        } else {
            Framing::Message
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Notice => "notice",
            Framing::Message => "message",
        }
    }
}

/// Prefix `text` with `HH:MM ` when replaying backlog.
pub fn prefix_time<Tz>(text: &str, at: &DateTime<Tz>, first_run: bool) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if first_run {
        format!("{} {text}", at.format("%H:%M"))
    } else {
        text.to_string()
    }
}

/// Non-empty lines of `text`, for sinks that send one line per message.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
}

/// Join the lines of `text` with single spaces.
pub fn collapse_line_breaks(text: &str) -> String {
    split_lines(text).map(str::trim).collect::<Vec<_>>().join(" ")
}

/// Writes feed items to any [`Write`] as `"<framing> <channel> <sender>: <line>"`.
///
/// Sleeps `message_wait` after each item so a downstream rate limit is never
/// tripped by a large batch.
pub struct ConsoleSink<W> {
    channel: String,
    message_wait: Duration,
    out: Mutex<W>,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout(channel: impl Into<String>, message_wait: Duration) -> Self {
        Self::new(channel, std::io::stdout(), message_wait)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(channel: impl Into<String>, out: W, message_wait: Duration) -> Self {
        Self {
            channel: channel.into(),
            message_wait,
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_lines(&self, framing: Framing, sender: &str, text: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("console writer poisoned"))?;
        for line in split_lines(text) {
            writeln!(out, "{} {} {sender}: {line}", framing.as_str(), self.channel)?;
        }
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Sink<FeedItem> for ConsoleSink<W> {
    fn deliver(&self, item: &FeedItem, first_run: bool) -> Result<()> {
        let body = match item.published {
            Some(at) => prefix_time(&item.display_body(), &at.with_timezone(&Local), first_run),
            None => item.display_body(),
        };
        self.write_lines(Framing::for_first_run(first_run), item.display_author(), &body)?;
        if !self.message_wait.is_zero() {
            thread::sleep(self.message_wait);
        }
        Ok(())
    }
}

impl<W: Write + Send> ErrorSink for ConsoleSink<W> {
    fn report(&self, message: &str) {
        if let Err(err) = self.write_lines(Framing::Notice, DEFAULT_SENDER, message) {
            tracing::warn!(error = %err, "could not write error notice");
        }
    }
}
