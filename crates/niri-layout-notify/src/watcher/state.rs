//! Keyboard layout tracking state machine
//!
//! The event stream goes through three phases:
//!
//! 1. `AwaitingAck`: niri acknowledges the `EventStream` request with `{"Ok":...}`
//! 2. `AwaitingSnapshot`: niri sends the full layout list once
//!    (`KeyboardLayoutsChanged`)
//! 3. `Tracking`: every `KeyboardLayoutSwitched` event is compared against the
//!    current layout
//!
//! Messages that do not fit the current phase are skipped without changing
//! state. The machine performs no I/O; `SessionState::handle_line` reports
//! what happened and the caller decides whether to notify.

use tracing::{debug, warn};

use super::message::{KeyboardLayouts, Message};

/// Which message the state machine expects next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    AwaitingAck,
    AwaitingSnapshot,
    Tracking,
}

/// Ordered layout names with the currently active index
///
/// Layouts are identified by position; duplicate names are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutTable {
    names: Vec<String>,
    current: Option<usize>,
}

impl LayoutTable {
    /// Replace the table contents with a snapshot
    ///
    /// `initial_index` is only kept if it points inside `names`.
    pub fn set(&mut self, names: Vec<String>, initial_index: Option<usize>) {
        self.current = initial_index.filter(|idx| *idx < names.len());
        self.names = names;
    }

    /// Make `index` the current layout
    ///
    /// Returns the layout name if `index` is in bounds and differs from the
    /// current index. Otherwise the table is left untouched.
    pub fn switch_to(&mut self, index: usize) -> Option<&str> {
        if index >= self.names.len() || self.current == Some(index) {
            return None;
        }
        self.current = Some(index);
        Some(&self.names[index])
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Name of the current layout
    pub fn current(&self) -> Option<&str> {
        self.current.map(|idx| self.names[idx].as_str())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Result of feeding one line to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The subscription was acknowledged
    Acknowledged,
    /// The layout snapshot was applied
    SnapshotApplied { layouts: usize },
    /// The active layout changed; the caller should notify
    Switched { layout: String },
    /// niri replied with an error; the caller logs it
    CompositorError(String),
    /// The line was valid JSON but not relevant in this phase
    Ignored,
    /// The line was not valid JSON
    Malformed,
}

/// Per-connection protocol state
#[derive(Debug, Default)]
pub struct SessionState {
    phase: Phase,
    layouts: LayoutTable,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn layouts(&self) -> &LayoutTable {
        &self.layouts
    }

    /// Decode and apply one line of the event stream
    ///
    /// Invalid JSON is logged and skipped; it never ends the session.
    pub fn handle_line(&mut self, line: &str) -> Outcome {
        match Message::parse(line) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                warn!(error = %e, line = %line, "Invalid JSON on niri event stream");
                Outcome::Malformed
            }
        }
    }

    /// Apply an already-decoded message
    pub fn handle_message(&mut self, message: Message) -> Outcome {
        // Errors are reported in any phase and never move the machine
        if let Message::Err(reason) = message {
            return Outcome::CompositorError(reason);
        }

        match (self.phase, message) {
            (Phase::AwaitingAck, Message::Ok) => {
                debug!("Event stream subscription acknowledged");
                self.phase = Phase::AwaitingSnapshot;
                Outcome::Acknowledged
            }
            (Phase::AwaitingSnapshot, Message::LayoutsChanged(snapshot)) => {
                self.apply_snapshot(snapshot)
            }
            (Phase::Tracking, Message::LayoutSwitched { idx }) => {
                let switched = idx.and_then(|idx| self.layouts.switch_to(idx));
                match switched {
                    Some(layout) => Outcome::Switched {
                        layout: layout.to_string(),
                    },
                    None => {
                        debug!(
                            idx = ?idx,
                            current = ?self.layouts.current_index(),
                            layouts = self.layouts.len(),
                            "Layout switch ignored"
                        );
                        Outcome::Ignored
                    }
                }
            }
            (phase, message) => {
                debug!(phase = ?phase, message = ?message, "Skipping message");
                Outcome::Ignored
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: KeyboardLayouts) -> Outcome {
        let KeyboardLayouts { names, current_idx } = snapshot;
        let count = names.len();

        self.layouts.set(names, current_idx);
        self.phase = Phase::Tracking;

        if current_idx.is_some() && self.layouts.current_index().is_none() {
            warn!(
                current_idx = ?current_idx,
                layouts = count,
                "Snapshot current_idx out of range, current layout unknown"
            );
        }

        debug!(
            layouts = ?self.layouts.names(),
            current = ?self.layouts.current(),
            "Layout snapshot applied"
        );

        Outcome::SnapshotApplied { layouts: count }
    }
}
