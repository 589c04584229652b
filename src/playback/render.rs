//! Plain-text rendering for terminals.

use chrono::{DateTime, Local, Utc};

use super::view::{PlaybackView, StampedLog};
use crate::conversation::Message;

/// `HH:MM:SS` in local time.
pub fn clock(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// `[HH:MM:SS] > message (details)`
pub fn log_line(log: &StampedLog) -> String {
    match &log.entry.details {
        Some(details) => format!(
            "[{}] > {} ({details})",
            clock(log.timestamp),
            log.entry.message
        ),
        None => format!("[{}] > {}", clock(log.timestamp), log.entry.message),
    }
}

/// `[HH:MM:SS] Agents\Name >  content`
pub fn message_line(message: &Message) -> String {
    format!(
        "[{}] Agents\\{} >  {}",
        clock(message.timestamp),
        message.agent_name,
        message.content
    )
}

/// One-line status bar.
pub fn status_bar(view: &PlaybackView) -> String {
    let status = view.connection_status;
    format!(
        "AGENTS: {} | MESSAGES: {} | WS: {} | API: {} | AI: {} | STATUS: {}",
        view.active_agents(),
        view.visible_messages.len(),
        if status.websocket { "CONNECTED" } else { "CONNECTING" },
        if status.api { "READY" } else { "CONNECTING" },
        if status.model { "AUTHENTICATED" } else { "CONNECTING" },
        view.processing_label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{LogEntry, LogLevel};

    #[test]
    fn test_log_line_shape() {
        let log = StampedLog {
            entry: LogEntry::new(LogLevel::Info, "Memory", Some("4096MB".into())),
            timestamp: Utc::now(),
        };
        let line = log_line(&log);
        assert!(line.starts_with('['));
        assert_eq!(&line[9..], "] > Memory (4096MB)");

        let bare = StampedLog {
            entry: LogEntry::new(LogLevel::Info, "Connecting to API endpoint...", None),
            timestamp: Utc::now(),
        };
        assert!(log_line(&bare).ends_with("] > Connecting to API endpoint..."));
    }

    #[test]
    fn test_message_line_shape() {
        let line = message_line(&Message::new("Ada", "Hello, world.", Utc::now()));
        assert!(line.ends_with("] Agents\\Ada >  Hello, world."));
    }

    #[test]
    fn test_status_bar_initial() {
        let bar = status_bar(&PlaybackView::new());
        assert_eq!(
            bar,
            "AGENTS: 0 | MESSAGES: 0 | WS: CONNECTING | API: CONNECTING | AI: CONNECTING | STATUS: READY"
        );
    }
}
