// Playback engine
// One clip at a time: a feeder thread decodes into the output ring buffer
// while a poller thread samples the position and notifies subscribers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::audio::decoder::ClipDecoder;
use crate::audio::output::AudioOutput;
use crate::audio::resampler::Resampler;
use crate::error::{Error, Result};
use crate::events::{PlaybackEvent, SubscriberId, SubscriberRegistry};

/// Default cadence for position updates
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Positions this close to the clip duration count as finished
const END_TOLERANCE: Duration = Duration::from_millis(1);

/// Feeder nap when the ring buffer is full
const FEED_BACKOFF: Duration = Duration::from_millis(1);

/// Feeder nap while paused or waiting at end of stream
const FEED_IDLE: Duration = Duration::from_millis(10);

/// Current transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "Stopped"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Paused => write!(f, "Paused"),
        }
    }
}

/// Cancellation token with a condvar-backed interruptible sleep, so the
/// threads it governs wake immediately instead of finishing a full nap
struct CancelToken {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.condvar.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Sleep up to `timeout`; returns true if cancelled
    fn wait(&self, timeout: Duration) -> bool {
        let mut cancelled = self.cancelled.lock();
        if *cancelled {
            return true;
        }
        self.condvar.wait_for(&mut cancelled, timeout);
        *cancelled
    }
}

/// Control block shared between the transport and one clip's threads
struct ClipControl {
    /// Cancels the feeder (and the poller, as a backstop) for good
    cancel: CancelToken,
    /// Mirrors the output pause flag so the feeder stops decoding too
    paused: AtomicBool,
    /// Clip time corresponding to played-frame zero; moves on seeks
    base_us: AtomicU64,
    /// Seek target waiting for the feeder, which owns the decoder
    pending_seek: Mutex<Option<u64>>,
    /// The decoder reached end of stream
    decode_done: AtomicBool,
}

impl ClipControl {
    fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            paused: AtomicBool::new(false),
            base_us: AtomicU64::new(0),
            pending_seek: Mutex::new(None),
            decode_done: AtomicBool::new(false),
        }
    }
}

/// One loaded clip and its background threads
struct Clip {
    path: PathBuf,
    /// Zero when the container does not declare a duration
    duration: Duration,
    generation: u64,
    control: Arc<ClipControl>,
    /// Cancels only the current poller; replaced on every resume
    poll_cancel: Arc<CancelToken>,
    feeder: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

struct Transport {
    state: PlaybackState,
    clip: Option<Clip>,
    /// Position frozen while paused, resumed from on resume
    stored_position: Duration,
}

/// Single-track playback engine.
///
/// Owns the output stream, the current clip and its background threads.
/// All transport operations take `&self` and may be called from any thread;
/// an internal mutex serializes them.
pub struct PlaybackEngine {
    output: Arc<AudioOutput>,
    transport: Arc<Mutex<Transport>>,
    subscribers: Arc<SubscriberRegistry>,
    next_generation: AtomicU64,
    poll_interval: Duration,
}

impl PlaybackEngine {
    /// Create an engine on the default output device
    pub fn new() -> Result<Self> {
        Self::with_poll_interval(POLL_INTERVAL)
    }

    /// Create an engine with a custom position-update cadence
    pub fn with_poll_interval(poll_interval: Duration) -> Result<Self> {
        let output = Arc::new(AudioOutput::new()?);

        Ok(Self {
            output,
            transport: Arc::new(Mutex::new(Transport {
                state: PlaybackState::Stopped,
                clip: None,
                stored_position: Duration::ZERO,
            })),
            subscribers: Arc::new(SubscriberRegistry::new()),
            next_generation: AtomicU64::new(1),
            poll_interval: poll_interval.max(Duration::from_millis(10)),
        })
    }

    /// Load a clip and start playing it from the beginning.
    ///
    /// Any previously loaded clip is released first, whatever its state.
    /// On failure the engine is left stopped with nothing loaded and stays
    /// usable for further calls.
    pub fn play(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        self.release_current(false);

        let decoder = match ClipDecoder::open(path) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!("cannot play {}: {}", path.display(), e);
                return Err(e);
            }
        };

        let duration = Duration::from_micros(decoder.duration_us().unwrap_or(0));
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        let control = Arc::new(ClipControl::new());
        let poll_cancel = Arc::new(CancelToken::new());

        self.output.clear();
        self.output.reset_frames();
        self.output.set_paused(false);

        let feeder = {
            let control = control.clone();
            let output = self.output.clone();
            thread::Builder::new()
                .name("clip-feeder".to_string())
                .spawn(move || run_feeder(decoder, control, output))
                .map_err(|e| Error::Stream(format!("failed to spawn feeder thread: {}", e)))?
        };

        {
            let mut transport = self.transport.lock();
            transport.state = PlaybackState::Playing;
            transport.stored_position = Duration::ZERO;
            transport.clip = Some(Clip {
                path: path.to_path_buf(),
                duration,
                generation,
                control: control.clone(),
                poll_cancel: poll_cancel.clone(),
                feeder: Some(feeder),
                poller: None,
            });
        }

        info!("clip loaded: {}", path.display());
        self.subscribers.notify(&PlaybackEvent::Started);

        // Spawned after the clip is registered (so even a clip shorter than
        // one polling interval can find it for the finish transition) and
        // after the start event, which must precede all position events
        match self.spawn_poller(poll_cancel, control, duration, generation) {
            Ok(handle) => {
                let mut transport = self.transport.lock();
                let playing = transport.state == PlaybackState::Playing;
                if let Some(clip) = transport.clip.as_mut() {
                    if playing && clip.generation == generation {
                        clip.poller = Some(handle);
                    }
                }
            }
            Err(e) => warn!("failed to start position polling: {}", e),
        }

        Ok(())
    }

    /// Pause playback, freezing the reported position. No-op unless playing.
    pub fn pause(&self) {
        let (poller, position) = {
            let mut transport = self.transport.lock();
            if transport.state != PlaybackState::Playing {
                debug!("pause ignored: not playing");
                return;
            }
            let Some(clip) = transport.clip.as_mut() else {
                return;
            };

            clip.control.paused.store(true, Ordering::SeqCst);
            self.output.set_paused(true);

            let position = clip_position(&clip.control, &self.output, clip.duration);
            clip.poll_cancel.cancel();
            let poller = clip.poller.take();

            transport.stored_position = position;
            transport.state = PlaybackState::Paused;
            (poller, position)
        };

        // Joined outside the lock; the poller may be blocked on it while
        // finishing a track
        if let Some(handle) = poller {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        debug!("paused at {:?}", position);
        self.subscribers.notify(&PlaybackEvent::Paused);
    }

    /// Resume from the paused position. No-op unless paused.
    pub fn resume(&self) {
        let (token, control, duration, generation) = {
            let mut transport = self.transport.lock();
            if transport.state != PlaybackState::Paused {
                debug!("resume ignored: not paused");
                return;
            }

            let token = Arc::new(CancelToken::new());
            let (control, duration, generation) = {
                let Some(clip) = transport.clip.as_mut() else {
                    return;
                };
                clip.control.paused.store(false, Ordering::SeqCst);
                clip.poll_cancel = token.clone();
                (clip.control.clone(), clip.duration, clip.generation)
            };

            self.output.set_paused(false);
            transport.state = PlaybackState::Playing;
            (token, control, duration, generation)
        };

        debug!("resumed");
        self.subscribers.notify(&PlaybackEvent::Started);

        match self.spawn_poller(token, control, duration, generation) {
            Ok(handle) => {
                let mut transport = self.transport.lock();
                let playing = transport.state == PlaybackState::Playing;
                if let Some(clip) = transport.clip.as_mut() {
                    if playing && clip.generation == generation {
                        clip.poller = Some(handle);
                    }
                }
            }
            Err(e) => warn!("failed to restart position polling: {}", e),
        }
    }

    /// Stop playback and release the clip. No-op when nothing is loaded.
    pub fn stop(&self) {
        if !self.release_current(true) {
            debug!("stop ignored: nothing loaded");
        }
    }

    /// Seek, preserving the play/pause state.
    ///
    /// Targets past the end of the clip are clamped to its duration.
    /// No-op when nothing is loaded.
    pub fn set_position(&self, position: Duration) {
        let mut transport = self.transport.lock();
        let paused = transport.state == PlaybackState::Paused;
        let Some(clip) = transport.clip.as_mut() else {
            debug!("seek ignored: no clip loaded");
            return;
        };

        let clamped = if clip.duration > Duration::ZERO {
            position.min(clip.duration)
        } else {
            position
        };

        *clip.control.pending_seek.lock() = Some(clamped.as_micros() as u64);
        if paused {
            transport.stored_position = clamped;
        }
        debug!("seek requested to {:?}", clamped);
    }

    /// Current transport position; zero when nothing is loaded
    pub fn position(&self) -> Duration {
        let transport = self.transport.lock();
        match transport.state {
            PlaybackState::Stopped => Duration::ZERO,
            PlaybackState::Paused => transport.stored_position,
            PlaybackState::Playing => transport
                .clip
                .as_ref()
                .map(|clip| clip_position(&clip.control, &self.output, clip.duration))
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Duration of the loaded clip; zero when nothing is loaded
    pub fn duration(&self) -> Duration {
        self.transport
            .lock()
            .clip
            .as_ref()
            .map(|clip| clip.duration)
            .unwrap_or(Duration::ZERO)
    }

    pub fn state(&self) -> PlaybackState {
        self.transport.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    /// Path of the loaded clip, if any
    pub fn current_clip(&self) -> Option<PathBuf> {
        self.transport
            .lock()
            .clip
            .as_ref()
            .map(|clip| clip.path.clone())
    }

    /// Set the playback volume.
    ///
    /// Normalized 0.0..=1.0, clamped, mapped linearly onto the output gain.
    /// The value lives in the output stage, so it applies immediately and
    /// carries over to every future clip.
    pub fn set_volume(&self, volume: f32) {
        self.output.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.output.volume()
    }

    /// Register an event callback; events arrive in subscription order
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Tear down the current clip, if any. Returns whether one was loaded.
    fn release_current(&self, emit_stopped: bool) -> bool {
        let clip = {
            let mut transport = self.transport.lock();
            transport.state = PlaybackState::Stopped;
            transport.stored_position = Duration::ZERO;
            transport.clip.take()
        };

        let Some(mut clip) = clip else {
            return false;
        };

        clip.control.cancel.cancel();
        clip.poll_cancel.cancel();
        self.output.clear();
        self.output.set_paused(false);

        if let Some(feeder) = clip.feeder.take() {
            let _ = feeder.join();
        }
        if let Some(poller) = clip.poller.take() {
            if poller.thread().id() != thread::current().id() {
                let _ = poller.join();
            }
        }

        if emit_stopped {
            info!("playback stopped: {}", clip.path.display());
            self.subscribers.notify(&PlaybackEvent::Stopped);
        }
        true
    }

    fn spawn_poller(
        &self,
        token: Arc<CancelToken>,
        control: Arc<ClipControl>,
        duration: Duration,
        generation: u64,
    ) -> Result<JoinHandle<()>> {
        let task = PollerTask {
            token,
            control,
            output: self.output.clone(),
            transport: self.transport.clone(),
            subscribers: self.subscribers.clone(),
            duration,
            generation,
            poll_interval: self.poll_interval,
        };

        thread::Builder::new()
            .name("clip-poller".to_string())
            .spawn(move || task.run())
            .map_err(|e| Error::Stream(format!("failed to spawn poller thread: {}", e)))
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.release_current(false);
    }
}

/// Clip time derived from frames the device actually consumed
fn clip_position(control: &ClipControl, output: &AudioOutput, duration: Duration) -> Duration {
    let frames = output.frames_played();
    let us = control.base_us.load(Ordering::SeqCst)
        + frames * 1_000_000 / output.sample_rate().max(1) as u64;

    let position = Duration::from_micros(us);
    if duration > Duration::ZERO {
        position.min(duration)
    } else {
        position
    }
}

/// Decode loop: pulls packets, converts them to the device format and pushes
/// them into the ring buffer. Owns the decoder; seeks are applied here.
fn run_feeder(mut decoder: ClipDecoder, control: Arc<ClipControl>, output: Arc<AudioOutput>) {
    let clip_rate = decoder.sample_rate();
    let clip_channels = decoder.channels();
    let device_rate = output.sample_rate();
    let device_channels = output.channels().max(1) as usize;

    let mut pending: Vec<f32> = Vec::new();
    let mut offset = 0usize;

    loop {
        if control.cancel.is_cancelled() {
            break;
        }

        if let Some(target_us) = control.pending_seek.lock().take() {
            output.clear();
            match decoder.seek(target_us) {
                Ok(actual_us) => {
                    control.base_us.store(actual_us, Ordering::SeqCst);
                    output.reset_frames();
                    control.decode_done.store(false, Ordering::SeqCst);
                    pending.clear();
                    offset = 0;
                }
                Err(e) => warn!("seek failed: {}", e),
            }
        }

        if control.paused.load(Ordering::SeqCst) {
            if control.cancel.wait(FEED_IDLE) {
                break;
            }
            continue;
        }

        if offset < pending.len() {
            offset += output.write(&pending[offset..]);
            if offset < pending.len() {
                // Ring buffer full
                if control.cancel.wait(FEED_BACKOFF) {
                    break;
                }
                continue;
            }
        }

        if control.decode_done.load(Ordering::SeqCst) {
            // Stay around: a seek can rewind the clip until the transport
            // winds it down
            if control.cancel.wait(FEED_IDLE) {
                break;
            }
            continue;
        }

        match decoder.decode_next() {
            Ok(Some(samples)) => {
                let mapped = if clip_channels != device_channels {
                    Resampler::map_channels(&samples, clip_channels, device_channels)
                } else {
                    samples
                };

                pending = if clip_rate != device_rate {
                    match Resampler::resample(
                        &mapped,
                        clip_rate,
                        device_rate,
                        device_channels as u16,
                    ) {
                        Ok(converted) => converted,
                        Err(e) => {
                            warn!("resampling failed, ending clip: {}", e);
                            control.decode_done.store(true, Ordering::SeqCst);
                            continue;
                        }
                    }
                } else {
                    mapped
                };
                offset = 0;
            }
            Ok(None) => {
                control.decode_done.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                warn!("decode failed, ending clip: {}", e);
                control.decode_done.store(true, Ordering::SeqCst);
            }
        }
    }

    debug!("feeder thread exiting");
}

/// Position polling loop: samples the clip position, notifies subscribers
/// and detects end of track
struct PollerTask {
    token: Arc<CancelToken>,
    control: Arc<ClipControl>,
    output: Arc<AudioOutput>,
    transport: Arc<Mutex<Transport>>,
    subscribers: Arc<SubscriberRegistry>,
    duration: Duration,
    generation: u64,
    poll_interval: Duration,
}

impl PollerTask {
    fn run(self) {
        loop {
            if self.token.is_cancelled() || self.control.cancel.is_cancelled() {
                break;
            }

            let position = clip_position(&self.control, &self.output, self.duration);
            self.subscribers.notify(&PlaybackEvent::PositionChanged {
                position,
                duration: self.duration,
            });

            let at_end =
                self.duration > Duration::ZERO && position + END_TOLERANCE >= self.duration;
            let drained =
                self.control.decode_done.load(Ordering::SeqCst) && self.output.buffer_is_empty();

            if at_end || drained {
                self.finish_playback();
                break;
            }

            if self.token.wait(self.poll_interval) {
                break;
            }
        }

        debug!("poller thread exiting");
    }

    /// Natural end of track: same teardown as an explicit stop, but only if
    /// our clip is still the loaded one and nobody paused or stopped it first
    fn finish_playback(&self) {
        let mut clip = {
            let mut transport = self.transport.lock();
            match &transport.clip {
                Some(clip)
                    if clip.generation == self.generation
                        && transport.state == PlaybackState::Playing => {}
                _ => return,
            }
            transport.state = PlaybackState::Stopped;
            transport.stored_position = Duration::ZERO;
            transport.clip.take().unwrap()
        };

        clip.control.cancel.cancel();
        clip.poll_cancel.cancel();
        self.output.clear();

        if let Some(feeder) = clip.feeder.take() {
            let _ = feeder.join();
        }
        // We are the poller; dropping the handle detaches it and run()
        // returns right after this call
        clip.poller.take();

        info!("playback finished: {}", clip.path.display());
        self.subscribers.notify(&PlaybackEvent::Stopped);
    }
}
