//! Sound pool manager.
//!
//! Owns the three channel records and the shared volume state. The
//! foreground sequencer, the ambience looper and background fades run as
//! separate tokio tasks; each is started through its layer's
//! [`ChannelState`], which cancels the previous owner first.

use super::channel::{ChannelState, Layer};
use super::events::{PlayOutcome, PlayRequest, PlaybackEvent};
use super::volume::{plan_cue, CueAdjustment, VolumeState};
use super::EngineSettings;
use crate::audio::backend::LOOP_FOREVER;
use crate::audio::{clamp_volume, fade, Announcer, AudioBackend, ChannelHandle, FadeSpec, LoadState};
use crate::library::FileSelector;
use crate::routines::{
    AmbientBackground, Cue, DuckProfile, LayerStartup, ResourceRef, RestorePolicy, Routine,
    RoutineKind, RoutineParams, VolumeProfile,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Longest single sleep between stop-token checks.
const PAUSE_SLICE: Duration = Duration::from_millis(250);

const EVENT_CAPACITY: usize = 100;

/// How a single sound on a layer ended.
#[derive(Debug, PartialEq)]
enum CueOutcome {
    Played,
    /// No file behind the resource
    Missing,
    /// Load or play error, already reported
    Failed,
    Cancelled,
}

enum LoadWait {
    Ready,
    TimedOut,
    Failed(String),
    Cancelled,
}

/// One routine with its random draws fixed for this pass.
#[derive(Debug, Clone)]
struct RoutineRun {
    kind: RoutineKind,
    label: String,
    cues: Vec<Cue>,
    startup: Vec<ResourceRef>,
    ambience: Vec<ResourceRef>,
    nominal: VolumeProfile,
    background: ResourceRef,
    end_background: ResourceRef,
    end_background_label: Option<String>,
    overrides_background: bool,
    duck: DuckProfile,
    duck_time_limit: Option<Duration>,
    settle_iterations: u32,
    startup_mode: LayerStartup,
    restore: RestorePolicy,
    speech_trigger: Option<usize>,
    speech_count: u32,
    speech_interval_minutes: u32,
}

impl RoutineRun {
    fn new(routine: &Routine, library: &dyn FileSelector, rng: &mut dyn RngCore) -> Self {
        let spec = routine.spec();
        let meta = spec.meta();
        let label = if meta.event_label.is_empty() {
            meta.foreground_label.clone()
        } else {
            format!("{}: {}", meta.event_label, meta.foreground_label)
        };

        Self {
            kind: spec.kind(),
            label,
            cues: spec.cue_sequence(library, rng),
            startup: spec.startup_cues(library),
            ambience: spec.alternate_background_cues(library),
            nominal: meta.volumes().clamped(),
            background: meta.background.clone(),
            end_background: meta.end_background.clone(),
            end_background_label: meta.end_background_label.clone(),
            overrides_background: spec.overrides_background(),
            duck: spec.duck_profile(),
            duck_time_limit: spec.duck_time_limit(),
            settle_iterations: spec.settle_iterations(),
            startup_mode: spec.layer_startup(),
            restore: spec.restore_policy(),
            speech_trigger: spec.speech_trigger_cue_index(),
            speech_count: spec.speech_event_count(),
            speech_interval_minutes: spec.speech_event_interval_minutes(),
        }
    }
}

/// Sleep for `duration`, waking regularly to check `token`.
///
/// Returns `false` when the token was set before the time ran out.
async fn pause(duration: Duration, token: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if token.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(PAUSE_SLICE)).await;
    }
}

struct Inner {
    backend: Arc<dyn AudioBackend>,
    library: Arc<dyn FileSelector>,
    announcer: Arc<dyn Announcer>,
    settings: EngineSettings,
    background: Mutex<ChannelState>,
    alternate: Mutex<ChannelState>,
    foreground: Mutex<ChannelState>,
    volumes: Mutex<VolumeState>,
    ambient: Mutex<AmbientBackground>,
    status: Mutex<Option<String>>,
    /// Pending fade-up after a duck time limit, with its stop token
    duck_timer: Mutex<Option<(JoinHandle<()>, Arc<AtomicBool>)>>,
    rng: Mutex<StdRng>,
    events: broadcast::Sender<PlaybackEvent>,
}

/// Three-layer playback scheduler.
///
/// Cheap to clone; clones share the same layers. Operations that start tasks
/// must be called from within a tokio runtime.
#[derive(Clone)]
pub struct SoundPoolManager {
    inner: Arc<Inner>,
}

impl SoundPoolManager {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        library: Arc<dyn FileSelector>,
        announcer: Arc<dyn Announcer>,
        settings: EngineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                backend,
                library,
                announcer,
                settings,
                background: Mutex::new(ChannelState::default()),
                alternate: Mutex::new(ChannelState::default()),
                foreground: Mutex::new(ChannelState::default()),
                volumes: Mutex::new(VolumeState::default()),
                ambient: Mutex::new(AmbientBackground::default()),
                status: Mutex::new(None),
                duck_timer: Mutex::new(None),
                rng: Mutex::new(StdRng::from_entropy()),
                events,
            }),
        }
    }

    /// Make clip draws reproducible.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        *self.inner.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Subscribe to playback events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.subscribe()
    }

    /// Label of what is currently playing.
    pub fn status(&self) -> Option<String> {
        self.inner.status.lock().clone()
    }

    pub fn ambient(&self) -> AmbientBackground {
        self.inner.ambient.lock().clone()
    }

    /// Snapshot of the mix levels.
    pub fn volumes(&self) -> VolumeState {
        *self.inner.volumes.lock()
    }

    /// Channel handle loaded on a layer.
    pub fn handle(&self, layer: Layer) -> Option<ChannelHandle> {
        self.inner.channel(layer).lock().handle()
    }

    /// Resource loaded on a layer.
    pub fn resource(&self, layer: Layer) -> Option<ResourceRef> {
        self.inner.channel(layer).lock().resource().cloned()
    }

    /// Whether the task owning a layer is still running.
    pub fn is_active(&self, layer: Layer) -> bool {
        self.inner.channel(layer).lock().is_active()
    }

    /// Whether a layer's channel is producing sound.
    pub fn is_playing(&self, layer: Layer) -> bool {
        let handle = self.handle(layer);
        handle
            .map(|h| self.inner.backend.is_playing(h))
            .unwrap_or(false)
    }

    pub fn is_foreground_active(&self) -> bool {
        self.is_active(Layer::Foreground)
    }

    /// Resolve the tags into routines and start the foreground sequence.
    ///
    /// A request made while a sequence runs is dropped. Anything else left on
    /// the foreground layer (a preview) is stopped first.
    pub fn play_routines(&self, request: PlayRequest) -> PlayOutcome {
        if self.is_foreground_active() {
            tracing::info!("Routine sequence already running, request ignored");
            return PlayOutcome::AlreadyRunning;
        }

        let routines = self.inner.resolve(&request);
        if routines.is_empty() {
            tracing::warn!("No playable routine in {:?}", request.tags);
            return PlayOutcome::NothingToPlay;
        }

        let lingering = {
            let mut channel = self.inner.foreground.lock();
            if channel.is_active() {
                return PlayOutcome::AlreadyRunning;
            }
            let lingering = channel.handle.take();
            channel.resource = None;
            let token = channel.arm();
            let inner = self.inner.clone();
            channel.set_task(tokio::spawn(async move {
                inner.run_sequence(routines, token).await;
            }));
            lingering
        };
        if let Some(handle) = lingering {
            self.inner.release(handle);
        }

        PlayOutcome::Started
    }

    /// Play one resource once on the foreground layer.
    ///
    /// Ignored while a routine sequence runs.
    pub fn preview(&self, resource: &ResourceRef) -> bool {
        let Some(path) = self.inner.library.resolve_path(resource) else {
            tracing::warn!("Preview of {} skipped: file not found", resource);
            return false;
        };
        let volume = self
            .inner
            .settings
            .volumes
            .profile(self.ambient().noise)
            .foreground;

        let mut channel = self.inner.foreground.lock();
        if channel.is_active() {
            tracing::info!("Preview ignored while a routine is playing");
            return false;
        }
        let stale = channel.handle.take();
        let started = match self.inner.backend.play_once(&path, volume, volume, 1.0) {
            Ok(handle) => {
                channel.handle = Some(handle);
                channel.resource = Some(resource.clone());
                tracing::debug!("Previewing {} on {}", resource, handle);
                true
            }
            Err(e) => {
                channel.resource = None;
                tracing::warn!("Preview of {} failed: {}", resource, e);
                false
            }
        };
        drop(channel);

        if let Some(handle) = stale {
            self.inner.release(handle);
        }
        started
    }

    /// Select the noise bed. A bed already playing switches over.
    pub async fn set_background(&self, ambient: AmbientBackground) {
        let switch = {
            let channel = self.inner.background.lock();
            channel.handle.is_some() && channel.resource.as_ref() != Some(&ambient.resource)
        };
        tracing::info!("Background set to {}", ambient.label);
        *self.inner.ambient.lock() = ambient;

        if switch {
            self.start_background().await;
        }
    }

    /// Start the noise bed at its nominal volume without any routine.
    pub async fn start_background(&self) -> bool {
        let ambient = self.ambient();
        let volume = self.inner.settings.volumes.profile(ambient.noise).background;
        let token = AtomicBool::new(false);

        let started = self.inner.start_bed(&ambient.resource, volume, &token).await;
        if started && !self.is_foreground_active() {
            self.inner.set_status(ambient.label);
        }
        started
    }

    /// Bring the bed back from silence after an interruption.
    pub async fn restore_after_interruption(&self) -> bool {
        let ambient = self.ambient();
        let nominal = self.inner.settings.volumes.profile(ambient.noise).background;

        if self.is_playing(Layer::Background) {
            self.inner.set_background_now(0.0);
        } else {
            let token = AtomicBool::new(false);
            if !self.inner.start_bed(&ambient.resource, 0.0, &token).await {
                return false;
            }
        }

        tracing::info!("Restoring background after interruption");
        let token = AtomicBool::new(false);
        drop(
            self.inner
                .spawn_background_fade(nominal, self.inner.settings.restore_fade, &token),
        );
        true
    }

    pub fn stop_foreground(&self) {
        self.inner.stop_layer(Layer::Foreground);
    }

    pub fn stop_background(&self) {
        self.inner.cancel_duck_timer();
        self.inner.stop_layer(Layer::Background);
    }

    pub fn stop_alternate_background(&self) {
        self.inner.stop_layer(Layer::AlternateBackground);
    }

    /// Stop every layer, pending reminders included.
    ///
    /// The sequencer goes first so it cannot start a fade or an ambience loop
    /// on a layer that was already stopped.
    pub fn stop_all(&self) {
        self.inner.stop_layer(Layer::Foreground);
        self.inner.cancel_duck_timer();
        self.inner.stop_layer(Layer::AlternateBackground);
        self.inner.stop_layer(Layer::Background);
        self.inner.announcer.cancel();
        self.inner.clear_status();
        tracing::info!("All layers stopped");
    }
}

impl Inner {
    fn channel(&self, layer: Layer) -> &Mutex<ChannelState> {
        match layer {
            Layer::Background => &self.background,
            Layer::AlternateBackground => &self.alternate,
            Layer::Foreground => &self.foreground,
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_status(&self, label: String) {
        tracing::info!("Status: {}", label);
        *self.status.lock() = Some(label.clone());
        self.emit(PlaybackEvent::StatusChanged(label));
    }

    fn clear_status(&self) {
        *self.status.lock() = None;
        self.emit(PlaybackEvent::StatusCleared);
    }

    fn resolve(&self, request: &PlayRequest) -> Vec<Routine> {
        let ambient = self.ambient.lock().clone();
        let mut params = RoutineParams::new(ambient, &self.settings.volumes);
        params.end_background = request.end_background.clone();
        params.end_background_label = request.end_background_label.clone();
        params.event_label = request.event_label.clone();
        params.play_count = request.play_count;
        params.prompt_count = request.prompt_count;

        request
            .tags
            .iter()
            .filter_map(|tag| match Routine::from_tag(tag, &params) {
                Ok(routine) => Some(routine),
                Err(e) => {
                    tracing::warn!("Skipping routine tag '{}': {}", tag, e);
                    None
                }
            })
            .collect()
    }

    fn materialize(&self, routine: &Routine) -> RoutineRun {
        let mut rng = self.rng.lock();
        RoutineRun::new(routine, self.library.as_ref(), &mut *rng)
    }

    fn release(&self, handle: ChannelHandle) {
        self.backend.stop(handle);
        self.backend.unload(handle);
    }

    /// Cancel a layer's task and release its channel.
    fn stop_layer(&self, layer: Layer) {
        let handle = self.channel(layer).lock().reset();
        if let Some(handle) = handle {
            self.release(handle);
            tracing::info!("Stopped {} layer ({})", layer, handle);
        }
        self.volumes.lock().ducked_for_cue = false;
    }

    fn cancel_duck_timer(&self) {
        if let Some((timer, token)) = self.duck_timer.lock().take() {
            token.store(true, Ordering::Release);
            timer.abort();
        }
    }

    /// Record a freshly loaded channel on a layer, unless the owning task was
    /// stopped meanwhile; then the channel is released right away.
    fn install_handle(
        &self,
        layer: Layer,
        token: &AtomicBool,
        handle: ChannelHandle,
        resource: &ResourceRef,
    ) -> bool {
        let mut channel = self.channel(layer).lock();
        if token.load(Ordering::Acquire) {
            drop(channel);
            self.release(handle);
            return false;
        }
        let previous = channel.handle.replace(handle);
        channel.resource = Some(resource.clone());
        drop(channel);

        if let Some(previous) = previous {
            self.release(previous);
        }
        true
    }

    /// Release a channel and clear it from the layer if still recorded there.
    fn release_from(&self, layer: Layer, handle: ChannelHandle) {
        {
            let mut channel = self.channel(layer).lock();
            if channel.handle == Some(handle) {
                channel.handle = None;
                channel.resource = None;
            }
        }
        self.release(handle);
    }

    async fn wait_until_loaded(&self, handle: ChannelHandle, token: &AtomicBool) -> LoadWait {
        let retries = self.settings.load_poll_retries;
        for attempt in 0..=retries {
            match self.backend.load_state(handle) {
                LoadState::Ready => return LoadWait::Ready,
                LoadState::Failed(message) => return LoadWait::Failed(message),
                LoadState::Unknown => {
                    return LoadWait::Failed(format!("channel {} was released", handle))
                }
                LoadState::Pending => {}
            }
            if attempt == retries {
                break;
            }
            if !pause(self.settings.load_poll_interval, token).await {
                return LoadWait::Cancelled;
            }
        }
        tracing::warn!(
            "Channel {} still loading after {} polls, playing anyway",
            handle,
            retries
        );
        LoadWait::TimedOut
    }

    /// Load, play and wait out one sound on a layer.
    async fn play_on_layer<F>(
        &self,
        layer: Layer,
        resource: &ResourceRef,
        volume: f32,
        token: &AtomicBool,
        on_started: F,
    ) -> CueOutcome
    where
        F: FnOnce(),
    {
        if token.load(Ordering::Acquire) {
            return CueOutcome::Cancelled;
        }

        let Some(path) = self.library.resolve_path(resource) else {
            tracing::warn!("Missing file for {} on {} layer, skipped", resource, layer);
            return CueOutcome::Missing;
        };

        let handle = match self.backend.load(&path) {
            Ok(handle) => handle,
            Err(e) => {
                self.report_load_failure(resource, e.to_string());
                return CueOutcome::Failed;
            }
        };
        if !self.install_handle(layer, token, handle, resource) {
            return CueOutcome::Cancelled;
        }

        match self.wait_until_loaded(handle, token).await {
            LoadWait::Ready | LoadWait::TimedOut => {}
            LoadWait::Failed(message) => {
                self.release_from(layer, handle);
                self.report_load_failure(resource, message);
                return CueOutcome::Failed;
            }
            LoadWait::Cancelled => {
                self.release_from(layer, handle);
                return CueOutcome::Cancelled;
            }
        }

        let volume = clamp_volume(volume);
        if let Err(e) = self.backend.play(handle, volume, volume, 0, 1.0) {
            self.release_from(layer, handle);
            self.report_load_failure(resource, e.to_string());
            return CueOutcome::Failed;
        }
        on_started();

        while self.backend.is_playing(handle) {
            if !pause(self.settings.play_poll_interval, token).await {
                self.release_from(layer, handle);
                return CueOutcome::Cancelled;
            }
        }

        self.release_from(layer, handle);
        CueOutcome::Played
    }

    fn report_load_failure(&self, resource: &ResourceRef, message: String) {
        tracing::warn!("Failed to load {}: {}", resource, message);
        self.emit(PlaybackEvent::LoadFailed {
            resource: resource.clone(),
            message,
        });
    }

    /// Load the noise bed and loop it at `volume`, replacing any bed playing.
    async fn start_bed(&self, resource: &ResourceRef, volume: f32, token: &AtomicBool) -> bool {
        let stale = self.background.lock().reset();
        if let Some(handle) = stale {
            self.release(handle);
        }

        let Some(path) = self.library.resolve_path(resource) else {
            tracing::warn!("Background {} not found", resource);
            return false;
        };
        let handle = match self.backend.load(&path) {
            Ok(handle) => handle,
            Err(e) => {
                self.report_load_failure(resource, e.to_string());
                return false;
            }
        };
        if !self.install_handle(Layer::Background, token, handle, resource) {
            return false;
        }

        match self.wait_until_loaded(handle, token).await {
            LoadWait::Ready | LoadWait::TimedOut => {}
            LoadWait::Failed(message) => {
                self.release_from(Layer::Background, handle);
                self.report_load_failure(resource, message);
                return false;
            }
            LoadWait::Cancelled => {
                self.release_from(Layer::Background, handle);
                return false;
            }
        }

        let volume = clamp_volume(volume);
        if let Err(e) = self.backend.play(handle, volume, volume, LOOP_FOREVER, 1.0) {
            tracing::error!("Background {} failed to play: {}", resource, e);
            self.release_from(Layer::Background, handle);
            return false;
        }
        self.volumes.lock().background = volume;

        for _ in 0..self.settings.load_poll_retries {
            if self.backend.is_playing(handle) {
                tracing::info!("Background {} playing at {:.2}", resource, volume);
                return true;
            }
            if !pause(self.settings.load_poll_interval, token).await {
                return false;
            }
        }
        tracing::warn!("Background {} never reported playing, continuing", resource);
        true
    }

    /// Start the bed unless one is already playing.
    async fn ensure_background(&self, resource: &ResourceRef, volume: f32, token: &AtomicBool) {
        let handle = self.background.lock().handle();
        if let Some(handle) = handle {
            if self.backend.is_playing(handle) {
                return;
            }
        }
        self.start_bed(resource, volume, token).await;
    }

    /// Jump the bed to `volume`, superseding any running fade.
    fn set_background_now(&self, volume: f32) {
        let handle = {
            let mut channel = self.background.lock();
            channel.cancel_task();
            channel.handle()
        };
        let volume = clamp_volume(volume);
        if let Some(handle) = handle {
            self.backend.set_volume(handle, volume, volume);
        }
        self.volumes.lock().background = volume;
    }

    /// Fade the bed to `target` on a background task, superseding any fade
    /// in progress. The receiver yields the final volume, or errors when the
    /// fade was itself superseded or `owner` was already stopped.
    fn spawn_background_fade(
        self: &Arc<Self>,
        target: f32,
        spec: FadeSpec,
        owner: &AtomicBool,
    ) -> oneshot::Receiver<f32> {
        let (tx, rx) = oneshot::channel();
        let target = clamp_volume(target);

        let mut channel = self.background.lock();
        if owner.load(Ordering::Acquire) {
            return rx;
        }
        let Some(handle) = channel.handle() else {
            drop(channel);
            self.volumes.lock().background = target;
            let _ = tx.send(target);
            return rx;
        };

        let token = channel.arm();
        let start = self.volumes.lock().background;
        tracing::debug!(
            "Background fade {:.3} -> {:.3} over {} steps",
            start,
            target,
            spec.steps
        );

        let inner = self.clone();
        channel.set_task(tokio::spawn(async move {
            let last = fade(spec, start, target, &token, |volume| {
                inner.backend.set_volume(handle, volume, volume);
                inner.volumes.lock().background = volume;
            })
            .await;
            let _ = tx.send(last);
        }));
        rx
    }

    /// Restore the bed to `nominal` once `limit` has passed.
    fn arm_duck_timer(self: &Arc<Self>, limit: Duration, nominal: f32) {
        let inner = self.clone();
        let restore = self.settings.restore_fade;
        let token = Arc::new(AtomicBool::new(false));
        let owner = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            tracing::info!("Duck time limit of {:?} reached, restoring background", limit);
            drop(inner.spawn_background_fade(nominal, restore, &owner));
        });
        if let Some((previous, stale)) = self.duck_timer.lock().replace((timer, token)) {
            stale.store(true, Ordering::Release);
            previous.abort();
        }
    }

    /// Start the ambience loop: startup cues once, then the ambience cues
    /// round after round until stopped. Nothing starts once `owner` is stopped.
    fn start_alternate_loop(
        self: &Arc<Self>,
        startup: Vec<ResourceRef>,
        ambience: Vec<ResourceRef>,
        owner: &AtomicBool,
    ) {
        if startup.is_empty() && ambience.is_empty() {
            tracing::debug!("No ambience available, alternate background stays silent");
            return;
        }

        let stale = {
            let mut channel = self.alternate.lock();
            if owner.load(Ordering::Acquire) {
                return;
            }
            let stale = channel.reset();
            let token = channel.arm();
            let inner = self.clone();
            channel.set_task(tokio::spawn(async move {
                inner.run_alternate_loop(startup, ambience, token).await;
            }));
            stale
        };
        if let Some(handle) = stale {
            self.release(handle);
        }
    }

    async fn run_alternate_loop(
        &self,
        startup: Vec<ResourceRef>,
        ambience: Vec<ResourceRef>,
        token: Arc<AtomicBool>,
    ) {
        tracing::info!(
            "Alternate background loop started ({} startup, {} ambience cues)",
            startup.len(),
            ambience.len()
        );

        for resource in &startup {
            let volume = self.volumes.lock().alternate_background;
            let outcome = self
                .play_on_layer(Layer::AlternateBackground, resource, volume, &token, || {})
                .await;
            if outcome == CueOutcome::Cancelled {
                return;
            }
        }

        if ambience.is_empty() {
            return;
        }

        loop {
            let mut played_any = false;
            for resource in &ambience {
                let volume = self.volumes.lock().alternate_background;
                match self
                    .play_on_layer(Layer::AlternateBackground, resource, volume, &token, || {})
                    .await
                {
                    CueOutcome::Played => played_any = true,
                    CueOutcome::Cancelled => return,
                    CueOutcome::Missing | CueOutcome::Failed => {}
                }
            }
            if !played_any {
                tracing::warn!("No playable ambience, alternate background loop ends");
                return;
            }
        }
    }

    /// Apply the mix change a cue asks for and return its play volume.
    async fn adjust_for_cue(self: &Arc<Self>, cue: &Cue, run: &RoutineRun, token: &AtomicBool) -> f32 {
        let state = *self.volumes.lock();

        match plan_cue(cue, &state, &run.nominal, self.settings.duck_factor) {
            CueAdjustment::Scale {
                foreground,
                alternate_ceiling,
            } => {
                {
                    let mut volumes = self.volumes.lock();
                    volumes.alternate_background_ceiling = alternate_ceiling;
                    volumes.alternate_background = alternate_ceiling;
                }
                let alternate = self.alternate.lock().handle();
                if let Some(handle) = alternate {
                    self.backend
                        .set_volume(handle, alternate_ceiling, alternate_ceiling);
                }
                foreground
            }
            CueAdjustment::Duck { background } => {
                tracing::debug!("Ducking background to {:.3} for {}", background, cue.resource);
                self.stop_layer(Layer::AlternateBackground);
                let _ = self
                    .spawn_background_fade(background, self.settings.cue_duck, token)
                    .await;
                if token.load(Ordering::Acquire) {
                    return state.foreground;
                }
                self.volumes.lock().ducked_for_cue = true;
                pause(self.settings.cue_duck_hold, token).await;
                state.foreground
            }
            CueAdjustment::Restore {
                foreground,
                background,
            } => {
                tracing::debug!("Restoring background to {:.3}", background);
                self.volumes.lock().foreground = foreground;
                match run.restore {
                    RestorePolicy::SlowFade => {
                        drop(self.spawn_background_fade(
                            background,
                            self.settings.restore_fade,
                            token,
                        ));
                        self.start_alternate_loop(Vec::new(), run.ambience.clone(), token);
                    }
                    RestorePolicy::Immediate => self.set_background_now(background),
                }
                self.volumes.lock().ducked_for_cue = false;
                foreground
            }
            CueAdjustment::Keep => state.foreground,
        }
    }

    async fn run_sequence(self: &Arc<Self>, routines: Vec<Routine>, token: Arc<AtomicBool>) {
        tracing::info!("Starting sequence of {} routine(s)", routines.len());

        let mut last = None;
        for routine in &routines {
            if token.load(Ordering::Acquire) {
                return;
            }
            let run = self.materialize(routine);
            if !self.run_routine(&run, &token).await {
                tracing::info!("Routine {} interrupted", run.label);
                return;
            }
            last = Some(run);
        }

        if let Some(run) = last {
            self.finish_sequence(&run, &token).await;
        }
        self.emit(PlaybackEvent::SequenceFinished);
        tracing::info!("Routine sequence finished");
    }

    /// Play one routine. Returns `false` when stopped part way.
    async fn run_routine(self: &Arc<Self>, run: &RoutineRun, token: &AtomicBool) -> bool {
        tracing::info!("Routine {} started ({} cues)", run.label, run.cues.len());
        self.emit(PlaybackEvent::RoutineStarted {
            kind: run.kind,
            label: run.label.clone(),
        });
        self.set_status(run.label.clone());
        self.volumes.lock().begin_routine(&run.nominal);

        self.ensure_background(&run.background, run.nominal.background, token)
            .await;
        if token.load(Ordering::Acquire) {
            return false;
        }

        if run.overrides_background {
            let target = run.duck.target(run.nominal.background);
            tracing::debug!("Ducking background to {:.3} before {}", target, run.label);
            let duck = FadeSpec::new(run.duck.steps, run.duck.step_delay);
            // An error means another fade superseded the duck
            let _ = self.spawn_background_fade(target, duck, token).await;
            if let Some(limit) = run.duck_time_limit {
                self.arm_duck_timer(limit, run.nominal.background);
            }
        } else {
            self.stop_layer(Layer::AlternateBackground);
        }

        for _ in 0..run.settle_iterations {
            if !pause(self.settings.settle_delay, token).await {
                return false;
            }
        }

        match run.startup_mode {
            LayerStartup::ResumeBackground => self.set_background_now(run.nominal.background),
            LayerStartup::FadeUpBackground => {
                drop(self.spawn_background_fade(
                    run.nominal.background,
                    self.settings.restore_fade,
                    token,
                ));
            }
            LayerStartup::AlternateLoop => {
                self.set_background_now(run.nominal.background);
                self.start_alternate_loop(run.startup.clone(), run.ambience.clone(), token);
            }
            LayerStartup::HoldDuck => tracing::debug!("Background held ducked"),
        }

        for (index, cue) in run.cues.iter().enumerate() {
            if token.load(Ordering::Acquire) {
                return false;
            }
            let volume = self.adjust_for_cue(cue, run, token).await;
            tracing::debug!("Cue {} {} at {:.2}", index, cue.resource, volume);

            let resource = cue.resource.clone();
            let outcome = self
                .play_on_layer(Layer::Foreground, &cue.resource, volume, token, || {
                    self.emit(PlaybackEvent::CueStarted { index, resource })
                })
                .await;
            match outcome {
                CueOutcome::Cancelled => return false,
                CueOutcome::Missing => self.emit(PlaybackEvent::CueSkipped {
                    index,
                    resource: cue.resource.clone(),
                }),
                CueOutcome::Played | CueOutcome::Failed => {}
            }

            let delay = Duration::from_secs(u64::from(cue.post_delay_secs));
            if !pause(delay, token).await {
                return false;
            }

            if run.speech_trigger == Some(index) && !token.load(Ordering::Acquire) {
                tracing::info!(
                    "Scheduling {} announcements every {} min",
                    run.speech_count,
                    run.speech_interval_minutes
                );
                self.announcer
                    .schedule_routine_announcements(run.speech_count, run.speech_interval_minutes);
            }
        }

        self.stop_layer(Layer::AlternateBackground);
        self.cancel_duck_timer();
        self.emit(PlaybackEvent::RoutineFinished { kind: run.kind });
        tracing::info!("Routine {} finished", run.label);
        true
    }

    /// Leave the bed under its end label, or restore it and clear the status.
    async fn finish_sequence(self: &Arc<Self>, run: &RoutineRun, token: &AtomicBool) {
        match &run.end_background_label {
            Some(label) => {
                let current = self.background.lock().resource.clone();
                if current.as_ref() != Some(&run.end_background) {
                    tracing::info!("Switching background to {}", run.end_background);
                    self.start_bed(&run.end_background, run.nominal.background, token)
                        .await;
                } else {
                    self.set_background_now(run.nominal.background);
                }
                self.set_status(label.clone());
            }
            None => {
                self.set_background_now(run.nominal.background);
                self.clear_status();
            }
        }
    }
}
