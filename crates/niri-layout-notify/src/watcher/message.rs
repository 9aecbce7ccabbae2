//! Decoding of niri event stream lines
//!
//! Only the handful of shapes the watcher reacts to are recognised. Anything
//! else is classified as `Message::Other` so the state machine can skip it;
//! niri interleaves many event types on the same stream.

use serde_json::Value;

/// A decoded event stream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `{"Ok": ...}` reply to the subscription request
    Ok,

    /// `{"Err": "..."}` reply from niri
    Err(String),

    /// `{"KeyboardLayoutsChanged": {"keyboard_layouts": {...}}}`
    LayoutsChanged(KeyboardLayouts),

    /// `{"KeyboardLayoutSwitched": {"idx": N}}`
    ///
    /// `idx` is `None` when the field is missing, negative or not an integer.
    LayoutSwitched { idx: Option<usize> },

    /// Valid JSON of any other shape
    Other,
}

/// Snapshot of the configured keyboard layouts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardLayouts {
    /// Layout names in configured order; non-string entries are dropped
    pub names: Vec<String>,
    /// Index of the active layout, if present and a non-negative integer
    pub current_idx: Option<usize>,
}

impl Message {
    /// Decode one line of the event stream
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the line is not valid JSON. An empty
    /// line is reported the same way.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        Ok(Self::from_value(&value))
    }

    /// Classify an already-decoded JSON value
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Message::Other;
        };

        if object.contains_key("Ok") {
            return Message::Ok;
        }

        if let Some(err) = object.get("Err") {
            let message = match err {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Message::Err(message);
        }

        if let Some(changed) = object.get("KeyboardLayoutsChanged") {
            return Message::LayoutsChanged(KeyboardLayouts::from_value(
                changed.get("keyboard_layouts"),
            ));
        }

        if let Some(switched) = object.get("KeyboardLayoutSwitched") {
            return Message::LayoutSwitched {
                idx: switched.get("idx").and_then(as_index),
            };
        }

        Message::Other
    }
}

impl KeyboardLayouts {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };

        let names = value
            .get("names")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            names,
            current_idx: value.get("current_idx").and_then(as_index),
        }
    }
}

fn as_index(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|idx| usize::try_from(idx).ok())
}
