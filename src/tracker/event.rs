// src/tracker/event.rs — Wire format of collector events
//
// One JSON object per event, discriminated by `type`. Field names are
// camelCase on the wire.

use serde::{Deserialize, Serialize};

/// Which termination signal closed a page view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitType {
    /// Client-side route change.
    Navigate,
    /// `pagehide`: tab closing or navigating away.
    Pagehide,
    /// `beforeunload` / `unload`.
    Unload,
    /// Tracker torn down by its owner.
    End,
}

impl ExitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Pagehide => "pagehide",
            Self::Unload => "unload",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for ExitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEvent {
    pub session_id: String,
    pub page_view_id: String,
    pub path: String,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEvent {
    pub session_id: String,
    pub page_view_id: String,
    pub path: String,
    pub active_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndEvent {
    pub session_id: String,
    pub page_view_id: String,
    pub path: String,
    pub active_ms: u64,
    pub exit_type: ExitType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Start(StartEvent),
    Heartbeat(HeartbeatEvent),
    End(EndEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Heartbeat(_) => "heartbeat",
            Self::End(_) => "end",
        }
    }

    pub fn page_view_id(&self) -> &str {
        match self {
            Self::Start(e) => &e.page_view_id,
            Self::Heartbeat(e) => &e.page_view_id,
            Self::End(e) => &e.page_view_id,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Start(e) => &e.path,
            Self::Heartbeat(e) => &e.path,
            Self::End(e) => &e.path,
        }
    }

    /// `None` for `start`, which carries no active time.
    pub fn active_ms(&self) -> Option<u64> {
        match self {
            Self::Start(_) => None,
            Self::Heartbeat(e) => Some(e.active_ms),
            Self::End(e) => Some(e.active_ms),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
