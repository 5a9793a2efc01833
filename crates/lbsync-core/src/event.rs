//! Application lifecycle events.
//!
//! One event arrives per message from the routing-info stream. Events carry
//! just enough to derive pool, route, and monitor names; gear events also
//! carry the public endpoint of the gear.

use serde::{Deserialize, Deserializer, Serialize};

/// An inbound application lifecycle event, tagged by its `action` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LifecycleEvent {
    CreateApplication {
        app_name: String,
        namespace: String,
    },
    DeleteApplication {
        app_name: String,
        namespace: String,
    },
    AddGear {
        app_name: String,
        namespace: String,
        public_address: String,
        #[serde(deserialize_with = "port_from_number_or_string")]
        public_port: u16,
    },
    DeleteGear {
        app_name: String,
        namespace: String,
        public_address: String,
        #[serde(deserialize_with = "port_from_number_or_string")]
        public_port: u16,
    },
}

impl LifecycleEvent {
    /// Parse one JSON-encoded event.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// The wire name of this event's action.
    pub fn action(&self) -> &'static str {
        match self {
            LifecycleEvent::CreateApplication { .. } => "create_application",
            LifecycleEvent::DeleteApplication { .. } => "delete_application",
            LifecycleEvent::AddGear { .. } => "add_gear",
            LifecycleEvent::DeleteGear { .. } => "delete_gear",
        }
    }

    pub fn app_name(&self) -> &str {
        match self {
            LifecycleEvent::CreateApplication { app_name, .. }
            | LifecycleEvent::DeleteApplication { app_name, .. }
            | LifecycleEvent::AddGear { app_name, .. }
            | LifecycleEvent::DeleteGear { app_name, .. } => app_name,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            LifecycleEvent::CreateApplication { namespace, .. }
            | LifecycleEvent::DeleteApplication { namespace, .. }
            | LifecycleEvent::AddGear { namespace, .. }
            | LifecycleEvent::DeleteGear { namespace, .. } => namespace,
        }
    }
}

/// Publishers send the gear port either as a JSON number or as a string.
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse::<u16>()
            .map_err(|e| serde::de::Error::custom(format!("invalid port `{text}`: {e}"))),
    }
}
