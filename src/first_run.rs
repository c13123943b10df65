//! First-run tracking.
//!
//! The first batch a source announces after a (re)start is usually backlog.
//! Sinks use the flag to frame that batch differently (notices instead of
//! messages, a time prefix on each line) so it reads as history rather than
//! live traffic.

use serde::{Deserialize, Serialize};

/// When the first-run flag is cleared.
///
/// A source must stick to one mode for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstRunMode {
    /// Clear on the first cycle that announces at least one item.
    #[default]
    ClearOnEmit,
    /// Clear on the first successful cycle, even an empty one.  Suits
    /// sources without a backlog concern.
    ClearOnCycle,
}

#[derive(Debug, Clone)]
pub struct FirstRun {
    mode: FirstRunMode,
    armed: bool,
}

impl Default for FirstRun {
    fn default() -> Self {
        Self::new(FirstRunMode::default())
    }
}

impl FirstRun {
    pub fn new(mode: FirstRunMode) -> Self {
        Self { mode, armed: true }
    }

    pub fn mode(&self) -> FirstRunMode {
        self.mode
    }

    pub fn is_first_run(&self) -> bool {
        self.armed
    }

    /// Record a successful cycle that announced `emitted` items.
    pub fn settle(&mut self, emitted: usize) {
        match self.mode {
            FirstRunMode::ClearOnEmit if emitted == 0 => {}
            _ => self.armed = false,
        }
    }

    /// Re-arm the flag; pair with a watermark reset.
    pub fn reset(&mut self) {
        self.armed = true;
    }
}
