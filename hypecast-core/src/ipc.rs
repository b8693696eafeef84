use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{ContentAngle, Platform};
pub use crate::pipeline::RegenerateTarget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HypecastRequest {
    Ping,
    Health,
    ListEvents {
        #[serde(default)]
        refresh: bool,
        limit: Option<usize>,
    },
    ClearCache,
    Generate {
        event_ids: Vec<String>,
        #[serde(default)]
        platforms: Vec<Platform>,
        /// Per-event pinned angle, keyed by event id.
        #[serde(default)]
        angles: HashMap<String, ContentAngle>,
        /// Per-angle template overrides for this session.
        #[serde(default)]
        templates: HashMap<ContentAngle, String>,
    },
    Regenerate {
        #[serde(default)]
        targets: Vec<RegenerateTarget>,
    },
    Results,
    Reset,
    Export {
        output_dir: Option<String>,
    },
    Schedule {
        posts_per_day: usize,
        min_priority: Option<u8>,
    },
    Webhook {
        max_items: Option<usize>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HypecastResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// HTTP status the error maps to; `None` on success.
    pub code: Option<u16>,
    pub version: String,
}

impl HypecastResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            code: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Internal error (500).
    pub fn err(msg: impl Into<String>) -> Self {
        Self::err_code(500, msg)
    }

    pub fn err_code(code: u16, msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            code: Some(code),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
