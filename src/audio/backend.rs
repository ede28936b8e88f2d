//! Audio Backend
//!
//! Channel-handle based playback primitive the scheduler drives: load a
//! resource into a channel, play it (optionally looping), change its volume,
//! stop and unload it. Loading completes asynchronously; callers poll
//! [`AudioBackend::load_state`] until the channel is ready or failed.

use super::{clamp_volume, AudioError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// Handle to a loaded channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(pub u32);

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Load progress of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Decoding still in progress
    Pending,
    /// Ready to play
    Ready,
    /// Decoder or IO error
    Failed(String),
    /// Handle was never loaded or already unloaded
    Unknown,
}

/// Loop count that repeats until stopped.
pub const LOOP_FOREVER: i32 = -1;

/// Trait for playback backends
pub trait AudioBackend: Send + Sync {
    /// Start loading a file into a new channel.
    fn load(&self, path: &Path) -> Result<ChannelHandle, AudioError>;

    /// Current load state of a channel.
    fn load_state(&self, handle: ChannelHandle) -> LoadState;

    /// Play a loaded channel. `loop_count` of [`LOOP_FOREVER`] loops until
    /// stopped, 0 plays once.
    fn play(
        &self,
        handle: ChannelHandle,
        left: f32,
        right: f32,
        loop_count: i32,
        rate: f32,
    ) -> Result<(), AudioError>;

    /// Load and play a file once without waiting for the caller to poll.
    fn play_once(
        &self,
        path: &Path,
        left: f32,
        right: f32,
        rate: f32,
    ) -> Result<ChannelHandle, AudioError>;

    /// Set channel volume (0.0 - 1.0 per side)
    fn set_volume(&self, handle: ChannelHandle, left: f32, right: f32);

    /// Stop playback on a channel
    fn stop(&self, handle: ChannelHandle);

    /// Release a channel
    fn unload(&self, handle: ChannelHandle);

    /// Whether a channel is currently producing sound
    fn is_playing(&self, handle: ChannelHandle) -> bool;
}

/// Operation recorded by [`SimulatedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOp {
    Load {
        handle: ChannelHandle,
        path: PathBuf,
    },
    Play {
        handle: ChannelHandle,
        volume: f32,
        looping: bool,
    },
    SetVolume {
        handle: ChannelHandle,
        volume: f32,
    },
    Stop(ChannelHandle),
    Unload(ChannelHandle),
}

#[derive(Debug)]
struct SimChannel {
    path: PathBuf,
    loaded_at: Instant,
    fails: bool,
    volume: f32,
    started_at: Option<Instant>,
    looping: bool,
    stopped: bool,
}

#[derive(Debug, Default)]
struct SimState {
    next_handle: u32,
    channels: HashMap<ChannelHandle, SimChannel>,
    durations: HashMap<PathBuf, Duration>,
    failing: HashSet<PathBuf>,
    recording: bool,
    log: Vec<BackendOp>,
}

impl SimState {
    fn record(&mut self, op: BackendOp) {
        if self.recording {
            self.log.push(op);
        }
    }
}

/// Clock-driven backend that plays nothing.
///
/// Every sound lasts a configurable duration measured on the tokio clock, so
/// paused-time tests and the headless CLI see realistic timing. Calls are
/// recorded for inspection only after [`SimulatedBackend::with_recording`].
pub struct SimulatedBackend {
    state: Mutex<SimState>,
    default_duration: Duration,
    load_latency: Duration,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl SimulatedBackend {
    /// Create a backend where every sound lasts `default_duration`.
    pub fn new(default_duration: Duration) -> Self {
        Self {
            state: Mutex::new(SimState {
                next_handle: 1,
                ..Default::default()
            }),
            default_duration,
            load_latency: Duration::from_millis(50),
        }
    }

    /// Override the simulated decode time.
    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    /// Keep a log of every operation.
    pub fn with_recording(mut self) -> Self {
        self.state.get_mut().recording = true;
        self
    }

    /// Give one file its own duration.
    pub fn set_duration(&self, path: impl Into<PathBuf>, duration: Duration) {
        self.state.lock().durations.insert(path.into(), duration);
    }

    /// Make loads of `path` fail.
    pub fn fail_loads_for(&self, path: impl Into<PathBuf>) {
        self.state.lock().failing.insert(path.into());
    }

    /// All operations so far, empty unless recording.
    pub fn operations(&self) -> Vec<BackendOp> {
        self.state.lock().log.clone()
    }

    /// Files passed to `load`, in order.
    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|op| match op {
                BackendOp::Load { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of channels currently loaded.
    pub fn loaded_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Current volume of a channel.
    pub fn volume(&self, handle: ChannelHandle) -> Option<f32> {
        self.state.lock().channels.get(&handle).map(|c| c.volume)
    }

    /// File loaded into a channel.
    pub fn path_of(&self, handle: ChannelHandle) -> Option<PathBuf> {
        self.state
            .lock()
            .channels
            .get(&handle)
            .map(|c| c.path.clone())
    }

    fn duration_of(&self, state: &SimState, path: &Path) -> Duration {
        state
            .durations
            .get(path)
            .copied()
            .unwrap_or(self.default_duration)
    }
}

impl AudioBackend for SimulatedBackend {
    fn load(&self, path: &Path) -> Result<ChannelHandle, AudioError> {
        let mut state = self.state.lock();
        let handle = ChannelHandle(state.next_handle);
        state.next_handle += 1;

        let fails = state.failing.contains(path);
        state.channels.insert(
            handle,
            SimChannel {
                path: path.to_path_buf(),
                loaded_at: Instant::now() + self.load_latency,
                fails,
                volume: 0.0,
                started_at: None,
                looping: false,
                stopped: false,
            },
        );
        state.record(BackendOp::Load {
            handle,
            path: path.to_path_buf(),
        });
        Ok(handle)
    }

    fn load_state(&self, handle: ChannelHandle) -> LoadState {
        let state = self.state.lock();
        match state.channels.get(&handle) {
            None => LoadState::Unknown,
            Some(channel) if Instant::now() < channel.loaded_at => LoadState::Pending,
            Some(channel) if channel.fails => {
                LoadState::Failed(format!("cannot decode {}", channel.path.display()))
            }
            Some(_) => LoadState::Ready,
        }
    }

    fn play(
        &self,
        handle: ChannelHandle,
        left: f32,
        right: f32,
        loop_count: i32,
        _rate: f32,
    ) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(&handle)
            .ok_or(AudioError::UnknownHandle(handle))?;

        if channel.fails {
            return Err(AudioError::PlaybackFailed(channel.path.display().to_string()));
        }

        let volume = clamp_volume((left + right) / 2.0);
        channel.volume = volume;
        channel.started_at = Some(Instant::now());
        channel.looping = loop_count == LOOP_FOREVER;
        channel.stopped = false;
        let looping = channel.looping;

        state.record(BackendOp::Play {
            handle,
            volume,
            looping,
        });
        Ok(())
    }

    fn play_once(
        &self,
        path: &Path,
        left: f32,
        right: f32,
        rate: f32,
    ) -> Result<ChannelHandle, AudioError> {
        let handle = self.load(path)?;
        {
            let mut state = self.state.lock();
            if let Some(channel) = state.channels.get_mut(&handle) {
                channel.loaded_at = Instant::now();
            }
        }
        self.play(handle, left, right, 0, rate)?;
        Ok(handle)
    }

    fn set_volume(&self, handle: ChannelHandle, left: f32, right: f32) {
        let mut state = self.state.lock();
        let volume = clamp_volume((left + right) / 2.0);
        if let Some(channel) = state.channels.get_mut(&handle) {
            channel.volume = volume;
            state.record(BackendOp::SetVolume { handle, volume });
        }
    }

    fn stop(&self, handle: ChannelHandle) {
        let mut state = self.state.lock();
        if let Some(channel) = state.channels.get_mut(&handle) {
            channel.stopped = true;
            state.record(BackendOp::Stop(handle));
        }
    }

    fn unload(&self, handle: ChannelHandle) {
        let mut state = self.state.lock();
        if state.channels.remove(&handle).is_some() {
            state.record(BackendOp::Unload(handle));
        }
    }

    fn is_playing(&self, handle: ChannelHandle) -> bool {
        let state = self.state.lock();
        let Some(channel) = state.channels.get(&handle) else {
            return false;
        };
        let Some(started_at) = channel.started_at else {
            return false;
        };
        if channel.stopped {
            return false;
        }
        channel.looping || started_at.elapsed() < self.duration_of(&state, &channel.path)
    }
}
