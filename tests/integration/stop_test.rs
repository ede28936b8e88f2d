//! Stopping while the sequencer is blocked inside a backend call.
//!
//! Runs on real time with two workers so `stop_all` lands while the
//! sequencer thread is still in the middle of a volume change.

use crate::support::{manager_over, media_tree};
use somnus::audio::{
    AudioBackend, AudioError, ChannelHandle, LoadState, LogSynth, ScheduledAnnouncer,
    SimulatedBackend,
};
use somnus::scheduler::{EngineSettings, Layer, PlayRequest};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Backend that blocks the first volume change after [`StallingBackend::arm`].
struct StallingBackend {
    inner: Arc<SimulatedBackend>,
    stall: Duration,
    armed: AtomicBool,
    entered: AtomicBool,
}

impl StallingBackend {
    fn new(inner: Arc<SimulatedBackend>, stall: Duration) -> Self {
        Self {
            inner,
            stall,
            armed: AtomicBool::new(false),
            entered: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    fn entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

impl AudioBackend for StallingBackend {
    fn load(&self, path: &Path) -> Result<ChannelHandle, AudioError> {
        self.inner.load(path)
    }

    fn load_state(&self, handle: ChannelHandle) -> LoadState {
        self.inner.load_state(handle)
    }

    fn play(
        &self,
        handle: ChannelHandle,
        left: f32,
        right: f32,
        loop_count: i32,
        rate: f32,
    ) -> Result<(), AudioError> {
        self.inner.play(handle, left, right, loop_count, rate)
    }

    fn play_once(
        &self,
        path: &Path,
        left: f32,
        right: f32,
        rate: f32,
    ) -> Result<ChannelHandle, AudioError> {
        self.inner.play_once(path, left, right, rate)
    }

    fn set_volume(&self, handle: ChannelHandle, left: f32, right: f32) {
        if self.armed.swap(false, Ordering::AcqRel) {
            self.entered.store(true, Ordering::Release);
            std::thread::sleep(self.stall);
        }
        self.inner.set_volume(handle, left, right);
    }

    fn stop(&self, handle: ChannelHandle) {
        self.inner.stop(handle);
    }

    fn unload(&self, handle: ChannelHandle) {
        self.inner.unload(handle);
    }

    fn is_playing(&self, handle: ChannelHandle) -> bool {
        self.inner.is_playing(handle)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_all_during_background_resume_starts_no_ambience() {
    let media = media_tree();
    let sim = Arc::new(SimulatedBackend::new(Duration::from_secs(1)));
    let backend = Arc::new(StallingBackend::new(
        sim.clone(),
        Duration::from_millis(300),
    ));
    let announcer = Arc::new(ScheduledAnnouncer::new(Arc::new(LogSynth::new()), true));
    let settings = EngineSettings {
        settle_delay: Duration::from_millis(10),
        ..EngineSettings::default()
    };
    let manager = manager_over(media.path(), backend.clone(), announcer, settings).await;

    // WILD resumes the bed right before its ambience loop starts
    backend.arm();
    manager.play_routines(PlayRequest::new(["wild"]));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !backend.entered() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "sequencer never changed the bed volume"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    manager.stop_all();
    tokio::time::sleep(Duration::from_millis(800)).await;

    for layer in Layer::ALL {
        assert!(manager.handle(layer).is_none(), "{} still loaded", layer);
        assert!(!manager.is_active(layer), "{} still running", layer);
    }
    assert_eq!(sim.loaded_count(), 0);
}
