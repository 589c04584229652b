//! Reveal and diagnostic delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay policy for playback. All values in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// After a word ending in `.`
    pub sentence_end_ms: u64,
    /// After a word ending in `,`
    pub clause_end_ms: u64,
    /// After a word longer than `long_word_chars`
    pub long_word_ms: u64,
    /// After any other word
    pub word_ms: u64,
    /// Words with more characters than this are "long"
    pub long_word_chars: usize,
    /// Between the end of one message and the start of the next
    pub message_gap_ms: u64,
    /// Between ordinary diagnostic lines
    pub log_line_ms: u64,
    /// After a diagnostic section
    pub section_ms: u64,
    /// Simulated connection handshake
    pub connect_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            sentence_end_ms: 150,
            clause_end_ms: 100,
            long_word_ms: 80,
            word_ms: 50,
            long_word_chars: 8,
            message_gap_ms: 800,
            log_line_ms: 100,
            section_ms: 200,
            connect_ms: 300,
        }
    }
}

impl Pacing {
    /// No delays at all.
    pub fn instant() -> Self {
        Self {
            sentence_end_ms: 0,
            clause_end_ms: 0,
            long_word_ms: 0,
            word_ms: 0,
            message_gap_ms: 0,
            log_line_ms: 0,
            section_ms: 0,
            connect_ms: 0,
            ..Self::default()
        }
    }

    /// Pause after revealing `word`.
    pub fn word_delay(&self, word: &str) -> Duration {
        let ms = if word.ends_with('.') {
            self.sentence_end_ms
        } else if word.ends_with(',') {
            self.clause_end_ms
        } else if word.chars().count() > self.long_word_chars {
            self.long_word_ms
        } else {
            self.word_ms
        };
        Duration::from_millis(ms)
    }

    pub(crate) fn message_gap(&self) -> Duration {
        Duration::from_millis(self.message_gap_ms)
    }

    pub(crate) fn line(&self) -> Duration {
        Duration::from_millis(self.log_line_ms)
    }

    pub(crate) fn section(&self) -> Duration {
        Duration::from_millis(self.section_ms)
    }

    pub(crate) fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_delays() {
        let p = Pacing::default();
        assert_eq!(p.word_delay("end."), Duration::from_millis(150));
        assert_eq!(p.word_delay("pause,"), Duration::from_millis(100));
        assert_eq!(p.word_delay("extraordinary"), Duration::from_millis(80));
        assert_eq!(p.word_delay("plain"), Duration::from_millis(50));
        // Punctuation wins over length.
        assert_eq!(p.word_delay("extraordinary."), Duration::from_millis(150));
    }

    #[test]
    fn test_instant_has_no_delays() {
        let p = Pacing::instant();
        assert!(p.word_delay("end.").is_zero());
        assert!(p.message_gap().is_zero());
    }
}
