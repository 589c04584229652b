//! Playback state machine.
//!
//! The engine is a pure iterator of [`Step`]s: each step is one event plus
//! the pause that follows it. It owns no timers; a driver (see
//! [`super::PlaybackDriver`]) sleeps between steps, and a test can walk the
//! steps synchronously.
//!
//! ```text
//! Idle ──► Diagnosing ──► Streaming(i) ──► … ──► Done
//!   └───────────── cancel() from any state ──► Cancelled
//! ```

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pacing::Pacing;
use super::view::{LogEntry, LogLevel};
use crate::conversation::{strip_agent_prefix, Message};

/// How the transcript is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Newly created session: word-by-word reveal
    Fresh,
    /// Session loaded from the archive: whole messages, no animation
    Restored,
}

/// Simulated service shown in the connection indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// Websocket channel
    Websocket,
    /// API channel
    Api,
    /// Model service
    Model,
}

/// Something the view should apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// Append a diagnostic line
    Log(LogEntry),
    /// One service came up
    ServiceConnected(Service),
    /// Every service came up at once
    AllServicesConnected,
    /// A fresh message begins; its visible content starts empty
    MessageStarted {
        /// Transcript index
        index: usize,
        /// Speaker
        agent_name: String,
        /// Message timestamp
        timestamp: DateTime<Utc>,
    },
    /// Visible content of message `index` is now `text`
    Reveal {
        /// Transcript index
        index: usize,
        /// Words revealed so far, space-joined
        text: String,
    },
    /// A restored message, shown whole
    MessageShown {
        /// Transcript index
        index: usize,
        /// Display copy with cleaned content
        message: Message,
    },
    /// Message `index` is fully visible
    MessageCompleted {
        /// Transcript index
        index: usize,
    },
    /// The transcript is exhausted; emitted exactly once
    Completed {
        /// Number of messages consumed
        index: usize,
        /// Always true
        is_complete: bool,
    },
}

/// One event and the pause after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Event to apply
    pub event: PlaybackEvent,
    /// Pause before the next step
    pub delay: Duration,
}

/// Where a fresh message is in its reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reveal {
    Start,
    Word(usize),
    Finish,
    Processed,
}

/// Engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing emitted yet
    Idle,
    /// Emitting diagnostic step `next`
    Diagnosing {
        /// Next diagnostic step
        next: usize,
    },
    /// Emitting message `index`
    Streaming {
        /// Transcript index
        index: usize,
    },
    /// Completion reported
    Done,
    /// Torn down
    Cancelled,
}

/// Explicit finite-state machine for transcript playback.
#[derive(Debug, Clone)]
pub struct PlaybackEngine {
    mode: PlaybackMode,
    messages: Vec<Message>,
    diagnostics: Vec<Step>,
    pacing: Pacing,
    phase: Phase,
    reveal: Reveal,
    words: Vec<String>,
    shown: HashSet<(String, DateTime<Utc>)>,
}

/// Content with echoed speaker labels removed.
pub fn clean_content(message: &Message) -> String {
    strip_agent_prefix(&message.content, &message.agent_name)
}

impl PlaybackEngine {
    /// Engine over `messages`, preceded by `diagnostics`.
    pub fn new(
        mode: PlaybackMode,
        messages: Vec<Message>,
        diagnostics: Vec<Step>,
        pacing: Pacing,
    ) -> Self {
        Self {
            mode,
            messages,
            diagnostics,
            pacing,
            phase: Phase::Idle,
            reveal: Reveal::Start,
            words: Vec::new(),
            shown: HashSet::new(),
        }
    }

    /// Treat these messages as already on screen; they are skipped.
    pub fn with_shown<'a>(mut self, shown: impl IntoIterator<Item = &'a Message>) -> Self {
        self.shown
            .extend(shown.into_iter().map(|m| (m.agent_name.clone(), m.timestamp)));
        self
    }

    /// Presentation mode.
    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True once completion was reported or the engine was cancelled.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Cancelled)
    }

    /// Stop; no further steps are produced.
    pub fn cancel(&mut self) {
        if self.phase != Phase::Done {
            self.phase = Phase::Cancelled;
        }
    }

    /// Advance one step.
    pub fn next_step(&mut self) -> Option<Step> {
        loop {
            match self.phase {
                Phase::Idle => self.phase = Phase::Diagnosing { next: 0 },
                Phase::Diagnosing { next } => {
                    if let Some(step) = self.diagnostics.get(next).cloned() {
                        self.phase = Phase::Diagnosing { next: next + 1 };
                        return Some(step);
                    }
                    self.enter_message(0);
                },
                Phase::Streaming { index } => {
                    if let Some(step) = self.stream(index) {
                        return Some(step);
                    }
                },
                Phase::Done | Phase::Cancelled => return None,
            }
        }
    }

    /// Position on message `index`, skipping any already shown.
    fn enter_message(&mut self, mut index: usize) {
        while let Some(message) = self.messages.get(index) {
            if !self
                .shown
                .contains(&(message.agent_name.clone(), message.timestamp))
            {
                break;
            }
            index += 1;
        }
        self.phase = Phase::Streaming { index };
        self.reveal = Reveal::Start;
    }

    fn stream(&mut self, index: usize) -> Option<Step> {
        let Some(message) = self.messages.get(index) else {
            self.phase = Phase::Done;
            return Some(Step {
                event: PlaybackEvent::Completed {
                    index,
                    is_complete: true,
                },
                delay: Duration::ZERO,
            });
        };

        match self.mode {
            PlaybackMode::Restored => {
                let mut copy = message.clone();
                copy.content = clean_content(message);
                copy.metadata = None;
                self.shown
                    .insert((message.agent_name.clone(), message.timestamp));
                self.enter_message(index + 1);
                Some(Step {
                    event: PlaybackEvent::MessageShown {
                        index,
                        message: copy,
                    },
                    delay: Duration::ZERO,
                })
            },
            PlaybackMode::Fresh => self.stream_fresh(index),
        }
    }

    fn stream_fresh(&mut self, index: usize) -> Option<Step> {
        let message = &self.messages[index];
        match self.reveal {
            Reveal::Start => {
                let cleaned = clean_content(message);
                self.words = cleaned.split_whitespace().map(str::to_string).collect();
                self.shown
                    .insert((message.agent_name.clone(), message.timestamp));
                let event = PlaybackEvent::MessageStarted {
                    index,
                    agent_name: message.agent_name.clone(),
                    timestamp: message.timestamp,
                };
                self.reveal = if self.words.is_empty() {
                    Reveal::Finish
                } else {
                    Reveal::Word(0)
                };
                Some(Step {
                    event,
                    delay: Duration::ZERO,
                })
            },
            Reveal::Word(w) => {
                let text = self.words[..=w].join(" ");
                let delay = self.pacing.word_delay(&self.words[w]);
                self.reveal = if w + 1 < self.words.len() {
                    Reveal::Word(w + 1)
                } else {
                    Reveal::Finish
                };
                Some(Step {
                    event: PlaybackEvent::Reveal { index, text },
                    delay,
                })
            },
            Reveal::Finish => {
                self.reveal = Reveal::Processed;
                Some(Step {
                    event: PlaybackEvent::MessageCompleted { index },
                    delay: Duration::ZERO,
                })
            },
            Reveal::Processed => {
                let chars = self.words.join(" ").chars().count();
                let entry = LogEntry::new(
                    LogLevel::Info,
                    &format!("Message processed from {}", message.agent_name),
                    Some(format!(
                        "Length: {chars} chars | Tokens: ~{}",
                        chars.div_ceil(4)
                    )),
                );
                self.enter_message(index + 1);
                Some(Step {
                    event: PlaybackEvent::Log(entry),
                    delay: self.pacing.message_gap(),
                })
            },
        }
    }
}

impl Iterator for PlaybackEngine {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        self.next_step()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn transcript() -> Vec<Message> {
        vec![
            Message::new("Ada", "Ada: Hello, world.", at(0)),
            Message::new("Grace", "Hi Ada", at(1)),
        ]
    }

    fn reveals(steps: &[Step]) -> Vec<(String, Duration)> {
        steps
            .iter()
            .filter_map(|s| match &s.event {
                PlaybackEvent::Reveal { text, .. } => Some((text.clone(), s.delay)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fresh_reveal_sequence() {
        let engine = PlaybackEngine::new(PlaybackMode::Fresh, transcript(), vec![], Pacing::default());
        let steps: Vec<Step> = engine.collect();
        let r = reveals(&steps);

        assert_eq!(r[0].0, "Hello,");
        assert_eq!(r[1].0, "Hello, world.");
        assert!(r[0].1 >= Pacing::default().word_delay("plain"));
        assert!(r[1].1 > r[0].1);
        assert_eq!(r[2].0, "Hi");
        assert_eq!(r[3].0, "Hi Ada");

        let processed: Vec<&LogEntry> = steps
            .iter()
            .filter_map(|s| match &s.event {
                PlaybackEvent::Log(e) => Some(e),
                _ => None,
            })
            .collect();
        assert_eq!(processed[0].message, "Message processed from Ada");
        assert_eq!(processed[0].details.as_deref(), Some("Length: 13 chars | Tokens: ~4"));
    }

    #[test]
    fn test_completion_reported_once() {
        let mut engine =
            PlaybackEngine::new(PlaybackMode::Restored, transcript(), vec![], Pacing::default());
        let steps: Vec<Step> = engine.by_ref().collect();
        let completions = steps
            .iter()
            .filter(|s| matches!(s.event, PlaybackEvent::Completed { .. }))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(
            steps.last().map(|s| &s.event),
            Some(&PlaybackEvent::Completed {
                index: 2,
                is_complete: true
            })
        );
        assert!(engine.next_step().is_none());
        assert_eq!(engine.phase(), Phase::Done);
    }

    #[test]
    fn test_restored_messages_are_whole_and_cleaned() {
        let engine = PlaybackEngine::new(PlaybackMode::Restored, transcript(), vec![], Pacing::default());
        let shown: Vec<String> = engine
            .filter_map(|s| match s.event {
                PlaybackEvent::MessageShown { message, .. } => Some(message.content),
                _ => None,
            })
            .collect();
        assert_eq!(shown, vec!["Hello, world.", "Hi Ada"]);
    }

    #[test]
    fn test_already_shown_messages_are_skipped() {
        let messages = transcript();
        let engine = PlaybackEngine::new(PlaybackMode::Fresh, messages.clone(), vec![], Pacing::default())
            .with_shown(&messages[..1]);
        let started: Vec<usize> = engine
            .filter_map(|s| match s.event {
                PlaybackEvent::MessageStarted { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![1]);
    }

    #[test]
    fn test_empty_transcript_completes_at_zero() {
        let mut engine = PlaybackEngine::new(PlaybackMode::Fresh, vec![], vec![], Pacing::default());
        let step = engine.next_step().unwrap();
        assert_eq!(
            step.event,
            PlaybackEvent::Completed {
                index: 0,
                is_complete: true
            }
        );
        assert!(engine.next_step().is_none());
    }

    #[test]
    fn test_cancel_stops_immediately() {
        let mut engine = PlaybackEngine::new(PlaybackMode::Fresh, transcript(), vec![], Pacing::default());
        engine.next_step();
        engine.cancel();
        assert!(engine.next_step().is_none());
        assert_eq!(engine.phase(), Phase::Cancelled);
    }

    #[test]
    fn test_diagnostics_precede_messages() {
        let diag = vec![Step {
            event: PlaybackEvent::AllServicesConnected,
            delay: Duration::from_millis(5),
        }];
        let mut engine = PlaybackEngine::new(PlaybackMode::Restored, transcript(), diag, Pacing::default());
        assert_eq!(
            engine.next_step().map(|s| s.event),
            Some(PlaybackEvent::AllServicesConnected)
        );
        assert!(matches!(
            engine.next_step().map(|s| s.event),
            Some(PlaybackEvent::MessageShown { index: 0, .. })
        ));
    }
}
