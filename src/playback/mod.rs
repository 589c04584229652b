//! Paced replay of a transcript.
//!
//! Playback has two phases. First a diagnostic log simulating environment
//! and connection setup; then the transcript itself.
//!
//! - **Fresh** sessions (just created) get the full diagnostic sequence and a
//!   word-by-word reveal of every message.
//! - **Restored** sessions (loaded from the archive) get a compressed replay
//!   of the stored run metadata, all services connected at once, then every
//!   message shown whole.
//!
//! [`PlaybackEngine`] is a synchronous state machine yielding [`Step`]s.
//! [`PlaybackDriver`] runs it on a tokio task with one pending sleep at a
//! time and delivers events over a channel; [`PlaybackView`] applies events
//! to local display state and [`render`] turns that state into text.

mod diagnostics;
mod driver;
mod engine;
mod pacing;
pub mod render;
mod view;

pub use diagnostics::{fresh_script, restored_script, FreshFacts};
pub use driver::{PlaybackDriver, PlaybackHandle, PlaybackOutcome};
pub use engine::{clean_content, Phase, PlaybackEngine, PlaybackEvent, PlaybackMode, Service, Step};
pub use pacing::Pacing;
pub use view::{ConnectionStatus, LogEntry, LogLevel, PlaybackView, StampedLog};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::conversation::{ClientInfo, Session};
use crate::llm::ModelParams;

impl PlaybackEngine {
    /// Fresh playback of a session that was just created.
    ///
    /// Diagnostic facts come from the session's run metadata; when it has
    /// none, synthetic facts are drawn from `seed`.
    pub fn for_fresh_session(session: &Session, pacing: Pacing, seed: u64) -> Self {
        let facts = match session.metadata() {
            Some(meta) => FreshFacts::from_metadata(meta),
            None => {
                let mut rng = StdRng::seed_from_u64(seed);
                FreshFacts::synthetic(ClientInfo::local(), ModelParams::default(), &mut rng)
            },
        };
        let diagnostics = fresh_script(&facts, session.active_agents(), &pacing);
        Self::new(PlaybackMode::Fresh, session.messages.clone(), diagnostics, pacing)
    }

    /// Restored playback of an archived session.
    pub fn for_restored_session(session: &Session, pacing: Pacing) -> Self {
        let diagnostics = restored_script(
            &session.id,
            session.metadata(),
            session.messages.len(),
            session.active_agents(),
            &pacing,
        );
        Self::new(PlaybackMode::Restored, session.messages.clone(), diagnostics, pacing)
    }
}
