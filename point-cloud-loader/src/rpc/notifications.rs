use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
use web_sys::window;

use crate::engine::loading::PipelineEvent;

/// JSON-RPC 2.0 notification structure for one-way communication.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl RpcNotification {
    pub fn new(method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

impl From<&PipelineEvent> for RpcNotification {
    fn from(event: &PipelineEvent) -> Self {
        match event {
            PipelineEvent::Started { token } => {
                Self::new("load_started", serde_json::json!({ "token": token }))
            }
            PipelineEvent::Progress {
                token,
                received,
                total,
            } => {
                let percent = if *total > 0 {
                    (*received as f64 / *total as f64 * 100.0).min(100.0)
                } else {
                    0.0
                };
                Self::new(
                    "load_progress",
                    serde_json::json!({
                        "token": token,
                        "received": received,
                        "total": total,
                        "percent": percent
                    }),
                )
            }
            PipelineEvent::Loaded { token, stats } => Self::new(
                "load_stats",
                serde_json::json!({
                    "token": token,
                    "decodeMs": stats.decode_ms,
                    "decodedPoints": stats.decoded_points,
                    "displayedPoints": stats.displayed_points,
                    "hasColor": stats.has_color
                }),
            ),
            PipelineEvent::Failed {
                token,
                message,
                code,
            } => Self::new(
                "load_error",
                serde_json::json!({
                    "token": token,
                    "message": message,
                    "code": code
                }),
            ),
        }
    }
}

/// Queue of notifications waiting to be delivered.
#[derive(Debug, Default)]
pub struct NotificationOutbox {
    outgoing_notifications: Vec<RpcNotification>,
}

impl NotificationOutbox {
    /// Queue a notification.
    pub fn send_notification(&mut self, method: &str, params: serde_json::Value) {
        self.outgoing_notifications
            .push(RpcNotification::new(method, params));
    }

    /// Queue the notification matching a pipeline event.
    pub fn push_event(&mut self, event: &PipelineEvent) {
        self.outgoing_notifications.push(event.into());
    }

    pub fn len(&self) -> usize {
        self.outgoing_notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing_notifications.is_empty()
    }

    /// Take every queued notification in send order.
    pub fn drain(&mut self) -> Vec<RpcNotification> {
        std::mem::take(&mut self.outgoing_notifications)
    }

    /// Post queued notifications to the parent window. Returns how many were
    /// handed over; native builds keep the queue for [`Self::drain`].
    pub fn flush(&mut self) -> usize {
        if !cfg!(target_arch = "wasm32") {
            return 0;
        }
        let notifications = self.drain();
        for notification in &notifications {
            send_message_to_parent(notification);
        }
        notifications.len()
    }
}

/// Send serialised message to the parent window (frontend).
fn send_message_to_parent<T: Serialize>(message: &T) {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialise message: {}", e);
            return;
        }
    };

    #[cfg(target_arch = "wasm32")]
    {
        if let Some(window) = window() {
            if let Some(parent) = window.parent().ok().flatten() {
                if let Err(e) = parent.post_message(&JsValue::from_str(&json), "*") {
                    error!("Failed to send message to parent: {:?}", e);
                }
            } else {
                warn!("No parent window available for message transmission");
            }
        } else {
            error!("Window object not available");
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        warn!("No parent window on this target; dropped {} bytes", json.len());
    }
}
