//! bind-relay polls feeds and web services and relays new items into chat
//! channels, oldest first, each item exactly once.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐  tick   ┌──────────┐ admitted ┌─────────────┐  items  ┌──────────┐
//! │ poll.rs  │ ──────► │ gate.rs  │ ───────► │ announce.rs │ ──────► │ sink.rs  │
//! │ (timer)  │         │ (busy?)  │          │ (filter,    │         │ (format, │
//! └──────────┘         └──────────┘          │  sort, emit)│         │  send)   │
//!       ▲                                    └─────────────┘         └──────────┘
//!       │ update() / force()                        │ fetch(since)
//! ┌───────────┐   ┌──────────┐               ┌─────────────┐
//! │registry.rs│ ─►│ node.rs  │               │  source/    │
//! └───────────┘   └──────────┘               └─────────────┘
//! ```
//!
//! * **`source/`**: the `DataSource` and `Chronological` traits and concrete
//!   implementations (currently RSS only).
//! * **`watermark`**: the per-source "last announced" cursor.
//! * **`gate`**: drop-if-busy admission, one cycle per source at a time.
//! * **`first_run`**: whether the next batch is backlog replay.
//! * **`announce`**: filter, order and emit one batch; advance the cursor.
//! * **`poll`**: jittered recurring timers on a shared tokio runtime.
//! * **`node`**: a source wired to all of the above.
//! * **`registry`**: the configured node list and its management operations.
//! * **`sink`**: outbound collaborator traits and shared formatting.
//! * **`config`** / **`error`**: settings and error types.

pub mod announce;
pub mod config;
pub mod error;
pub mod first_run;
pub mod gate;
pub mod node;
pub mod poll;
pub mod registry;
pub mod sink;
pub mod source;
pub mod watermark;

pub use announce::AnnounceSequencer;
pub use config::{BindConfig, SourceConfig};
pub use error::{ConfigError, CycleError, RegistryError};
pub use first_run::{FirstRun, FirstRunMode};
pub use gate::{FetchGate, GateGuard};
pub use node::{CycleOutcome, ManagedNode, Node, NodeBuilder};
pub use poll::{Jitter, PollScheduler, SchedulerState};
pub use registry::NodeRegistry;
pub use sink::{ErrorSink, Reporter, Sink};
pub use source::{Chronological, DataSource, FeedItem, RssSource};
pub use watermark::{Key, Watermark};
