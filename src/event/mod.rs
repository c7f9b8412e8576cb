//! Events exchanged with the shell and their dispatch machinery.
//!
//! An [`Event`] is a tagged container: a required `name` discriminator plus
//! an open map of extra fields that listeners interpret by convention. The
//! [`Dispatcher`] delivers events to registered [`Listener`]s one at a time,
//! in the order they were dispatched.

mod dispatcher;
mod listener;

pub use dispatcher::Dispatcher;
pub use listener::{FnListener, Listener};

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known event names.
pub mod names {
    /// Sent by the shell once it has connected and finished starting up.
    pub const APP_READY: &str = "app.ready";
    /// Synthesized locally when the session begins shutting down.
    pub const APP_SHUTDOWN: &str = "app.shutdown";
}

/// A single event, identified by name for routing purposes.
///
/// Any fields beyond `name` ride along in `payload` untouched by the
/// dispatch machinery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event: {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_extra_fields_into_payload() {
        let event: Event = serde_json::from_str(r#"{"name":"window.resized","w":800,"h":600}"#)
            .expect("valid event");
        assert_eq!(event.name, "window.resized");
        assert_eq!(event.field("w"), Some(&Value::from(800)));
        assert_eq!(event.field("h"), Some(&Value::from(600)));
    }

    #[test]
    fn serializes_payload_at_top_level() {
        let event = Event::new("menu.selected").with_field("id", "file.open");
        let json = serde_json::to_string(&event).expect("serializable");
        assert!(json.contains(r#""name":"menu.selected""#));
        assert!(json.contains(r#""id":"file.open""#));
    }

    #[test]
    fn display_shows_name() {
        assert_eq!(Event::new("app.ready").to_string(), "Event: app.ready");
    }
}
