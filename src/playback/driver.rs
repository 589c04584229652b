//! Timer loop that feeds engine steps to a view.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::engine::{PlaybackEngine, PlaybackEvent};

/// How a playback task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every step was delivered
    Completed,
    /// Torn down via the handle
    Cancelled,
    /// The event receiver went away
    ReceiverDropped,
}

/// Spawns playback tasks.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackDriver {
    buffer: usize,
}

impl Default for PlaybackDriver {
    fn default() -> Self {
        Self { buffer: 64 }
    }
}

/// Owner of a running playback task.
#[derive(Debug)]
pub struct PlaybackHandle {
    cancel: CancellationToken,
    join: JoinHandle<PlaybackOutcome>,
}

impl PlaybackHandle {
    /// Request teardown without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the task to exit. Once this returns no further
    /// events are sent.
    pub async fn teardown(self) -> PlaybackOutcome {
        self.cancel.cancel();
        self.join.await.unwrap_or(PlaybackOutcome::Cancelled)
    }

    /// Wait for playback to end on its own.
    pub async fn finished(self) -> PlaybackOutcome {
        self.join.await.unwrap_or(PlaybackOutcome::Cancelled)
    }
}

impl PlaybackDriver {
    /// Driver with an event buffer of `buffer` steps.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }

    /// Run `engine` on a tokio task. At most one sleep is pending at a time.
    pub fn spawn(
        &self,
        engine: PlaybackEngine,
    ) -> (PlaybackHandle, mpsc::Receiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run(engine, tx, cancel.clone()));
        (PlaybackHandle { cancel, join }, rx)
    }
}

async fn run(
    mut engine: PlaybackEngine,
    tx: mpsc::Sender<PlaybackEvent>,
    cancel: CancellationToken,
) -> PlaybackOutcome {
    loop {
        if cancel.is_cancelled() {
            engine.cancel();
            return PlaybackOutcome::Cancelled;
        }
        let Some(step) = engine.next_step() else {
            tracing::debug!("playback completed");
            return PlaybackOutcome::Completed;
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                engine.cancel();
                return PlaybackOutcome::Cancelled;
            }
            sent = tx.send(step.event) => {
                if sent.is_err() {
                    engine.cancel();
                    tracing::debug!("playback receiver dropped");
                    return PlaybackOutcome::ReceiverDropped;
                }
            }
        }

        if !step.delay.is_zero() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    engine.cancel();
                    return PlaybackOutcome::Cancelled;
                }
                () = tokio::time::sleep(step.delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use crate::playback::{Pacing, PlaybackMode};
    use chrono::Utc;
    use std::time::Duration;

    fn engine() -> PlaybackEngine {
        PlaybackEngine::new(
            PlaybackMode::Fresh,
            vec![Message::new("Ada", "one two three four five", Utc::now())],
            vec![],
            Pacing::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_to_completion() {
        let (handle, mut rx) = PlaybackDriver::default().spawn(engine());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(handle.finished().await, PlaybackOutcome::Completed);
        assert!(matches!(
            events.last(),
            Some(PlaybackEvent::Completed { index: 1, is_complete: true })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_events() {
        let (handle, mut rx) = PlaybackDriver::default().spawn(engine());
        // MessageStarted, then the first word.
        assert!(matches!(rx.recv().await, Some(PlaybackEvent::MessageStarted { .. })));
        assert!(matches!(rx.recv().await, Some(PlaybackEvent::Reveal { .. })));

        assert_eq!(handle.teardown().await, PlaybackOutcome::Cancelled);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_ends_task() {
        let (handle, rx) = PlaybackDriver::default().spawn(engine());
        drop(rx);
        assert_eq!(handle.finished().await, PlaybackOutcome::ReceiverDropped);
    }
}
