//! bind-relay: relay RSS feeds to the terminal the way the plugin relays
//! them into chat channels.
//!
//! ```text
//! bind-relay [FEED_URL]...
//! ```
//!
//! Every URL becomes one feed node, polled hourly.  The first batch per
//! feed is printed as notices with a time prefix, later items as plain
//! messages.  Logs go to stderr and are
//! filtered by `RUST_LOG` (default `bind_relay=info`).

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::runtime::Handle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bind_relay::sink::ConsoleSink;
use bind_relay::{
    BindConfig, ErrorSink, FeedItem, Node, NodeRegistry, Reporter, RssSource, Sink, SourceConfig,
};

const DEFAULT_FEED: &str = "https://feeds.bbci.co.uk/news/rss.xml";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bind_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = BindConfig::try_from_env()?;

    // -- parse arguments -----------------------------------------------------
    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls.push(DEFAULT_FEED.into());
    }

    // -- configure nodes -----------------------------------------------------
    let console = Arc::new(ConsoleSink::stdout("#Feed", config.message_wait));
    let errors: Arc<dyn ErrorSink> = console.clone();
    let mut registry = NodeRegistry::new();

    for url in &urls {
        let reporter = Reporter::new(Arc::clone(&errors), config.ignore_errors);
        let node = feed_node(url, Arc::clone(&console), reporter)?;
        registry.add(Box::new(node));
    }

    for line in registry.list() {
        tracing::info!("{line}");
    }

    // -- run until interrupted -------------------------------------------------
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    registry.stop_all();
    Ok(())
}

/// One feed node relaying into `console`.  Feeds keep their hourly preset;
/// `BIND_POLL_INTERVAL_SECS` only covers sources without one.
fn feed_node<W: Write + Send + 'static>(
    url: &str,
    console: Arc<ConsoleSink<W>>,
    reporter: Reporter,
) -> Result<Node<RssSource>> {
    let sink = move |item: &FeedItem, first_run: bool| console.deliver(item, first_run);
    let node = Node::builder(SourceConfig::feed(url), RssSource::new(url, "Feed"))
        .reporter(reporter)
        .build(sink, Handle::current())?;
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bind_relay::config::FEED_INTERVAL_SECS;

    #[tokio::test(start_paused = true)]
    async fn feed_nodes_poll_hourly_whatever_the_default_interval() {
        let config = BindConfig {
            default_interval: Duration::from_secs(120),
            ..BindConfig::default()
        };
        let console = Arc::new(ConsoleSink::new("#Feed", Vec::new(), config.message_wait));

        let node = feed_node("http://example.com/rss", console, Reporter::silent()).unwrap();

        assert_eq!(node.interval(), Duration::from_secs(FEED_INTERVAL_SECS));
        assert_eq!(config.source("memo").interval_secs, 120);
    }
}
