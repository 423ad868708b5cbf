//! JSON shapes exchanged with the generation service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stagewatch_core::{Channel, RawEvent, ReportedStatus};
use stagewatch_logging::sw_debug;

#[derive(Debug, Serialize)]
pub(crate) struct SubmitRequest<'a> {
    pub prompt: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsResponse {
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// One agent log line, as stored by the service and streamed over the push channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LogEntry {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
}

impl LogEntry {
    pub fn into_event(self, channel: Channel) -> RawEvent {
        let mut event = RawEvent::new(channel, self.message.unwrap_or_default());
        if let Some(status) = self.status.as_deref().and_then(ReportedStatus::parse) {
            event = event.with_status(status);
        }
        if let (Some(agent), Some(progress)) = (self.agent.as_deref(), self.progress) {
            event = event.with_progress(agent, clamp_percent(progress));
        }
        if let Some(agent) = self.agent {
            event = event.with_agent(agent);
        }
        if let Some(timestamp) = self.timestamp {
            event = event.with_timestamp(timestamp);
        }
        event
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    ProgressUpdate {
        #[serde(default)]
        progress: BTreeMap<String, f64>,
    },
    LogsBatch {
        #[serde(default)]
        logs: Vec<LogEntry>,
    },
    Pong,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ClientFrame {
    Ping,
    RequestLogs,
}

impl ClientFrame {
    pub fn to_text(&self) -> String {
        match self {
            ClientFrame::Ping => r#"{"type":"ping"}"#.to_string(),
            ClientFrame::RequestLogs => r#"{"type":"request_logs"}"#.to_string(),
        }
    }
}

/// Decodes one text frame from the push channel into raw events.
///
/// Frames that are not JSON still reach the display log as plain messages.
pub fn decode_push_frame(text: &str) -> Vec<RawEvent> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => return vec![RawEvent::new(Channel::Push, text.trim())],
    };

    if value.get("type").is_some() {
        match serde_json::from_value::<ServerFrame>(value.clone()) {
            Ok(ServerFrame::ProgressUpdate { progress }) => {
                let event = progress
                    .into_iter()
                    .fold(RawEvent::new(Channel::Push, ""), |event, (key, value)| {
                        event.with_progress(key, clamp_percent(value))
                    });
                return vec![event];
            }
            Ok(ServerFrame::LogsBatch { logs }) => {
                return logs.into_iter().map(|entry| entry.into_event(Channel::Push)).collect();
            }
            Ok(ServerFrame::Pong) => return Vec::new(),
            Ok(ServerFrame::Error { message }) => {
                let message = message.unwrap_or_else(|| "unspecified".to_string());
                return vec![RawEvent::new(Channel::Push, format!("service reported: {message}"))];
            }
            Err(err) => sw_debug!("unknown push frame type, treating as log entry: {}", err),
        }
    }

    match serde_json::from_value::<LogEntry>(value) {
        Ok(entry) => vec![entry.into_event(Channel::Push)],
        Err(_) => vec![RawEvent::new(Channel::Push, text.trim())],
    }
}

fn clamp_percent(value: f64) -> u32 {
    if value.is_finite() {
        value.round().clamp(0.0, 100.0) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_frames_keep_agent_status_and_progress() {
        let events = decode_push_frame(
            r#"{"timestamp":"2026-10-16T09:00:01Z","agent":"Backend Engineer","message":"Executing task","status":"running","progress":45.4}"#,
        );
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.agent.as_deref(), Some("Backend Engineer"));
        assert_eq!(event.status, Some(ReportedStatus::Running));
        assert_eq!(event.progress.get("Backend Engineer"), Some(&45));
        assert_eq!(event.timestamp.as_deref(), Some("2026-10-16T09:00:01Z"));
    }

    #[test]
    fn typed_frames_decode_by_tag() {
        let events = decode_push_frame(r#"{"type":"progress_update","progress":{"planner":100,"backend":30}}"#);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].progress.get("planner"), Some(&100));
        assert_eq!(events[0].message, "");

        let batch = decode_push_frame(r#"{"type":"logs_batch","logs":[{"message":"a"},{"message":"b"}]}"#);
        assert_eq!(batch.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(decode_push_frame(r#"{"type":"pong"}"#).is_empty());
        assert_eq!(
            decode_push_frame(r#"{"type":"error","message":"Job not found"}"#)[0].message,
            "service reported: Job not found"
        );
    }

    #[test]
    fn plain_text_frames_are_display_only() {
        let events = decode_push_frame("🚀 Crew: crew\n");
        assert_eq!(events[0].message, "🚀 Crew: crew");
        assert_eq!(events[0].agent, None);
    }

    #[test]
    fn client_frames_match_service_protocol() {
        assert_eq!(ClientFrame::Ping.to_text(), serde_json::to_string(&ClientFrame::Ping).unwrap());
        assert_eq!(
            ClientFrame::RequestLogs.to_text(),
            serde_json::to_string(&ClientFrame::RequestLogs).unwrap()
        );
    }
}
