//! Keyboard layout watcher for the niri event stream
//!
//! This module follows niri's keyboard layout over its IPC socket and reports
//! every switch so the daemon can raise a desktop notification.
//!
//! ## Architecture
//!
//! - `LineBuffer`: reassembles newline-delimited messages from socket reads
//! - `Message`: classifies one JSON line into the shapes the watcher uses
//! - `SessionState`: the handshake/snapshot/tracking state machine and its
//!   `LayoutTable`
//! - `EventStream`: owns the socket and drives the pieces above
//!
//! ## Protocol
//!
//! After `"EventStream"` is sent, niri replies `{"Ok":"Handled"}`, then sends a
//! `KeyboardLayoutsChanged` snapshot and a stream of events, one JSON object
//! per line. Only `KeyboardLayoutSwitched` events matter after the snapshot.

mod error;
mod line_buffer;
mod message;
mod session;
mod state;

pub use error::WatchError;
pub use session::EventStream;
