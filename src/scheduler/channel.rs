//! Per-layer channel records.

use crate::audio::ChannelHandle;
use crate::routines::ResourceRef;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The three concurrently mixed layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Continuous noise bed
    Background,
    /// Rotating ambience loop
    AlternateBackground,
    /// Sequenced routine cues
    Foreground,
}

impl Layer {
    pub const ALL: [Layer; 3] = [
        Layer::Background,
        Layer::AlternateBackground,
        Layer::Foreground,
    ];
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Background => write!(f, "background"),
            Layer::AlternateBackground => write!(f, "alternate background"),
            Layer::Foreground => write!(f, "foreground"),
        }
    }
}

/// Mutable state of one layer: the loaded channel, the stop token of the
/// task driving it and that task's handle.
///
/// Every task gets a fresh token when it is armed. Cancelling sets the old
/// token, so a task that is still running observes the stop at its next
/// suspension point even after a successor was armed.
#[derive(Debug)]
pub struct ChannelState {
    pub(crate) handle: Option<ChannelHandle>,
    pub(crate) resource: Option<ResourceRef>,
    stopped: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            handle: None,
            resource: None,
            stopped: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

impl ChannelState {
    /// Loaded channel handle, `None` when the layer is silent.
    pub fn handle(&self) -> Option<ChannelHandle> {
        self.handle
    }

    /// Resource loaded into the channel.
    pub fn resource(&self) -> Option<&ResourceRef> {
        self.resource.as_ref()
    }

    /// Whether the owning task is still running.
    pub fn is_active(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Signal and abort the current task. A finished task is just dropped.
    pub(crate) fn cancel_task(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                task.abort();
            }
        }
        self.stopped = Arc::new(AtomicBool::new(false));
    }

    /// Cancel the current task and hand out the token for its successor.
    pub(crate) fn arm(&mut self) -> Arc<AtomicBool> {
        self.cancel_task();
        self.stopped.clone()
    }

    pub(crate) fn set_task(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    /// Cancel the task and take the channel out of the record.
    pub(crate) fn reset(&mut self) -> Option<ChannelHandle> {
        self.cancel_task();
        self.resource = None;
        self.handle.take()
    }
}
