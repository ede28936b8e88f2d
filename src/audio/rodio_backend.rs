//! Rodio playback backend.
//!
//! The output stream lives on a dedicated thread (it cannot move between
//! threads); channels are rodio sinks created from the shared stream handle.
//! Files are read and checked on a background thread so `load` returns at once.

use super::backend::{AudioBackend, ChannelHandle, LoadState, LOOP_FOREVER};
use super::{clamp_volume, AudioError};
use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Decoded-once file contents shared between plays.
#[derive(Clone)]
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

struct RodioChannel {
    path: PathBuf,
    state: LoadState,
    data: Option<SharedBytes>,
    sink: Option<Sink>,
}

/// Backend playing through the default output device.
pub struct RodioBackend {
    stream_handle: OutputStreamHandle,
    channels: Arc<Mutex<HashMap<ChannelHandle, RodioChannel>>>,
    next_handle: AtomicU32,
    shutdown: Sender<()>,
}

impl RodioBackend {
    /// Open the default output device.
    pub fn new() -> Result<Self, AudioError> {
        let (handle_tx, handle_rx) = bounded::<Result<OutputStreamHandle, String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        std::thread::Builder::new()
            .name("somnus-audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((_stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    // Keep the stream alive until the backend is dropped
                    let _ = shutdown_rx.recv();
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| AudioError::DeviceNotAvailable(e.to_string()))?;

        let stream_handle = handle_rx
            .recv()
            .map_err(|e| AudioError::DeviceNotAvailable(e.to_string()))?
            .map_err(AudioError::DeviceNotAvailable)?;

        tracing::info!("Audio output opened");

        Ok(Self {
            stream_handle,
            channels: Arc::new(Mutex::new(HashMap::new())),
            next_handle: AtomicU32::new(1),
            shutdown: shutdown_tx,
        })
    }

    fn read_and_check(path: &Path) -> Result<SharedBytes, String> {
        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
        let data = SharedBytes(Arc::new(bytes));
        Decoder::new(Cursor::new(data.clone())).map_err(|e| e.to_string())?;
        Ok(data)
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
    }
}

impl AudioBackend for RodioBackend {
    fn load(&self, path: &Path) -> Result<ChannelHandle, AudioError> {
        let handle = ChannelHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.channels.lock().insert(
            handle,
            RodioChannel {
                path: path.to_path_buf(),
                state: LoadState::Pending,
                data: None,
                sink: None,
            },
        );

        let channels = self.channels.clone();
        let path = path.to_path_buf();
        std::thread::Builder::new()
            .name("somnus-audio-load".to_string())
            .spawn(move || {
                let result = Self::read_and_check(&path);
                let mut channels = channels.lock();
                // Unloaded while decoding
                let Some(channel) = channels.get_mut(&handle) else {
                    return;
                };
                match result {
                    Ok(data) => {
                        channel.data = Some(data);
                        channel.state = LoadState::Ready;
                    }
                    Err(message) => {
                        tracing::warn!("Failed to load {}: {}", path.display(), message);
                        channel.state = LoadState::Failed(message);
                    }
                }
            })
            .map_err(|e| AudioError::LoadFailed(e.to_string()))?;

        Ok(handle)
    }

    fn load_state(&self, handle: ChannelHandle) -> LoadState {
        self.channels
            .lock()
            .get(&handle)
            .map(|c| c.state.clone())
            .unwrap_or(LoadState::Unknown)
    }

    fn play(
        &self,
        handle: ChannelHandle,
        left: f32,
        right: f32,
        loop_count: i32,
        rate: f32,
    ) -> Result<(), AudioError> {
        let mut channels = self.channels.lock();
        let channel = channels
            .get_mut(&handle)
            .ok_or(AudioError::UnknownHandle(handle))?;
        let data = channel
            .data
            .clone()
            .ok_or_else(|| AudioError::PlaybackFailed(format!("{} not loaded", channel.path.display())))?;

        let decoder = Decoder::new(Cursor::new(data))
            .map_err(|e| AudioError::PlaybackFailed(e.to_string()))?;
        let source: Box<dyn Source<Item = i16> + Send> = if loop_count == LOOP_FOREVER {
            Box::new(decoder.speed(rate).repeat_infinite())
        } else {
            Box::new(decoder.speed(rate))
        };

        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| AudioError::PlaybackFailed(e.to_string()))?;
        // Sinks are mono-gain; the two sides are averaged
        sink.set_volume(clamp_volume((left + right) / 2.0));
        sink.append(source);
        sink.play();

        if let Some(old) = channel.sink.replace(sink) {
            old.stop();
        }
        Ok(())
    }

    fn play_once(
        &self,
        path: &Path,
        left: f32,
        right: f32,
        rate: f32,
    ) -> Result<ChannelHandle, AudioError> {
        let data = Self::read_and_check(path).map_err(AudioError::LoadFailed)?;
        let handle = ChannelHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.channels.lock().insert(
            handle,
            RodioChannel {
                path: path.to_path_buf(),
                state: LoadState::Ready,
                data: Some(data),
                sink: None,
            },
        );
        self.play(handle, left, right, 0, rate)?;
        Ok(handle)
    }

    fn set_volume(&self, handle: ChannelHandle, left: f32, right: f32) {
        if let Some(sink) = self.channels.lock().get(&handle).and_then(|c| c.sink.as_ref()) {
            sink.set_volume(clamp_volume((left + right) / 2.0));
        }
    }

    fn stop(&self, handle: ChannelHandle) {
        if let Some(sink) = self.channels.lock().get(&handle).and_then(|c| c.sink.as_ref()) {
            sink.stop();
        }
    }

    fn unload(&self, handle: ChannelHandle) {
        if let Some(channel) = self.channels.lock().remove(&handle) {
            if let Some(sink) = channel.sink {
                sink.stop();
            }
        }
    }

    fn is_playing(&self, handle: ChannelHandle) -> bool {
        self.channels
            .lock()
            .get(&handle)
            .and_then(|c| c.sink.as_ref())
            .map(|sink| !sink.empty() && !sink.is_paused())
            .unwrap_or(false)
    }
}
