//! Spoken announcements: immediate messages and timed routine reminders.

use super::tts::{text_utils, SpeechSynth};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Speech collaborator driven by the scheduler.
pub trait Announcer: Send + Sync {
    /// Speak a message right away.
    fn announce_now(&self, message: &str);

    /// Speak `count` reminders, one every `interval_minutes`.
    fn schedule_routine_announcements(&self, count: u32, interval_minutes: u32);

    /// Drop any reminders still pending.
    fn cancel(&self) {}
}

/// Announcer that speaks through a synthesizer and runs reminders on a
/// tokio task. Scheduling again replaces the pending reminders.
pub struct ScheduledAnnouncer<S: SpeechSynth + 'static> {
    synth: Arc<S>,
    enabled: bool,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<S: SpeechSynth + 'static> ScheduledAnnouncer<S> {
    pub fn new(synth: Arc<S>, enabled: bool) -> Self {
        Self {
            synth,
            enabled,
            pending: Mutex::new(None),
        }
    }

    pub fn synth(&self) -> &Arc<S> {
        &self.synth
    }

    /// Whether reminders are still waiting to be spoken.
    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl<S: SpeechSynth + 'static> Announcer for ScheduledAnnouncer<S> {
    fn announce_now(&self, message: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.synth.speak(message) {
            tracing::warn!("Announcement failed: {}", e);
        }
    }

    fn schedule_routine_announcements(&self, count: u32, interval_minutes: u32) {
        self.cancel();
        if !self.enabled || count == 0 {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime, routine announcements skipped");
            return;
        };

        tracing::info!(
            "Scheduling {} announcements every {}",
            count,
            text_utils::format_minutes(interval_minutes)
        );

        let synth = self.synth.clone();
        let interval = Duration::from_secs(u64::from(interval_minutes) * 60);
        let task = runtime.spawn(async move {
            for index in 1..=count {
                tokio::time::sleep(interval).await;
                if let Err(e) = synth.speak(&text_utils::reminder(index, count)) {
                    tracing::warn!("Reminder {} failed: {}", index, e);
                }
            }
        });
        *self.pending.lock() = Some(task);
    }

    fn cancel(&self) {
        if let Some(task) = self.pending.lock().take() {
            if !task.is_finished() {
                task.abort();
                self.synth.stop();
            }
        }
    }
}
