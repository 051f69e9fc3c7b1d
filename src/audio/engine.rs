//! Realtime engine facade and control handle
//!
//! [`AudioEngine`] owns the mixer and all DSP state and lives on the audio
//! thread: the platform callback drives it through `fill_mono_buffer` /
//! `fill_stereo_buffer`. [`EngineControls`] is a cheap cloneable handle for
//! the control thread; it publishes configuration snapshots, writes gain
//! targets, reads envelope meters, and polls the error slot, all without
//! taking a lock the audio thread could ever contend.
//!
//! ## Realtime discipline
//!
//! The fill calls never allocate, block, log, or run user callbacks. New
//! configuration snapshots arrive through a bounded latest-wins mailbox and
//! are swapped in whole at the top of a block. Render faults silence the
//! buffer instead of propagating; after [`MAX_CONSECUTIVE_ERRORS`] faults in
//! a row the engine latches its critical-error state, stops playback, and
//! hands the fault to a background notifier thread which is the only place
//! subscriber callbacks ever run.

use crate::audio::mixer::Mixer;
use crate::config::{ChannelMode, LayerConfiguration, LayerSnapshot};
use crate::error::{EngineError, Result};
use crate::{
    MASTER_GAIN_SLEW, MAX_BUFFER, MAX_CONSECUTIVE_ERRORS, MAX_LAYERS, MAX_SAMPLE_RATE,
    MIN_SAMPLE_RATE, OUTPUT_CLAMP,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Capacity of the snapshot mailbox; the writer drops the oldest pending
/// snapshot when full so the newest always gets through
const CONFIG_MAILBOX_CAPACITY: usize = 2;

/// Capacity of the audio->notifier fault queue
const FAULT_QUEUE_CAPACITY: usize = 4;

/// How often the notifier thread re-checks its stop flag while idle
const NOTIFIER_POLL: Duration = Duration::from_millis(50);

/// Callback invoked on the notifier thread when the engine latches a
/// critical error. Subscribers must tolerate running off the UI thread.
pub type CriticalErrorCallback = Box<dyn Fn(EngineError) + Send + 'static>;

/// An atomic f32 for lock-free parameter handoff between the control and
/// audio threads, stored as its bit pattern in an `AtomicU32`
#[derive(Debug)]
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub(crate) fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// State shared between the facade, the control handle, and the callback
struct SharedControls {
    sample_rate: u32,
    /// Master gain target written by the control thread, 0..=1
    master_gain: AtomicF32,
    /// Final linear output multiplier, 0..=1, applied after the clamp
    output_gain: AtomicF32,
    /// Transport gate read by the callback each block
    playing: AtomicBool,
    /// Set by dispose(); every state-changing call then fails
    disposed: AtomicBool,
    /// Cheap update signal: the callback only drains the mailbox when set
    config_dirty: AtomicBool,
    config_tx: Sender<Arc<LayerSnapshot>>,
    config_rx: Receiver<Arc<LayerSnapshot>>,
    /// Callback -> notifier handoff for latched faults
    fault_tx: Sender<EngineError>,
    /// Last render fault, as an error-slot code; 0 means none
    error_code: AtomicU8,
    has_critical_error: AtomicBool,
    /// Per-layer envelope meters, written once per rendered block
    layer_envelopes: [AtomicF32; MAX_LAYERS],
    subscribers: Mutex<Vec<CriticalErrorCallback>>,
}

impl SharedControls {
    /// Validate and publish a fresh snapshot for the audio thread
    fn publish_configs(&self, configs: &[LayerConfiguration]) -> Result<()> {
        if self.disposed.load(Ordering::Relaxed) {
            return Err(EngineError::Disposed);
        }
        for config in configs {
            config.validate(self.sample_rate)?;
        }
        let mut snapshot = Arc::new(LayerSnapshot::new(configs.to_vec())?);

        // Latest-wins mailbox: on a full channel, pop the stale snapshot
        // the audio thread has not collected yet and try again.
        for _ in 0..CONFIG_MAILBOX_CAPACITY + 1 {
            match self.config_tx.try_send(snapshot) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    let _ = self.config_rx.try_recv();
                    snapshot = returned;
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        self.config_dirty.store(true, Ordering::SeqCst);
        tracing::debug!(layers = configs.len(), "configs_published");
        Ok(())
    }

    fn read_critical_error(&self) -> (Option<EngineError>, bool) {
        let error = EngineError::from_code(self.error_code.load(Ordering::Relaxed));
        let latched = self.has_critical_error.load(Ordering::Relaxed);
        (error, latched)
    }
}

/// Cloneable control-thread handle onto a running engine
///
/// Every operation here is safe to call while the audio thread is inside a
/// fill call: updates go through atomics and bounded channels only.
#[derive(Clone)]
pub struct EngineControls {
    shared: Arc<SharedControls>,
}

impl EngineControls {
    /// Replace the layer configuration with a validated snapshot
    ///
    /// The running audio thread picks the snapshot up whole at the start of
    /// one of the next blocks; it never observes a partial update.
    pub fn update_configs(&self, configs: &[LayerConfiguration]) -> Result<()> {
        self.shared.publish_configs(configs)
    }

    /// Set the smoothed master gain target, clamped to [0, 1]
    pub fn set_master_gain(&self, gain: f32) {
        self.shared.master_gain.set(gain.clamp(0.0, 1.0));
    }

    /// Current master gain target
    pub fn master_gain(&self) -> f32 {
        self.shared.master_gain.get()
    }

    /// Set the final output multiplier, clamped to [0, 1]
    pub fn set_output_gain(&self, gain: f32) {
        self.shared.output_gain.set(gain.clamp(0.0, 1.0));
    }

    /// Current output multiplier
    pub fn output_gain(&self) -> f32 {
        self.shared.output_gain.get()
    }

    /// Envelope meter for the layer at `index`; 0.0 for any invalid index
    ///
    /// Single-writer relaxed metering: a torn read costs one stale meter
    /// frame, nothing more.
    pub fn layer_envelope_value(&self, index: usize) -> f32 {
        match self.shared.layer_envelopes.get(index) {
            Some(meter) => meter.get(),
            None => 0.0,
        }
    }

    /// Last stored render fault and whether the engine has latched its
    /// critical-error state
    pub fn try_get_critical_error(&self) -> (Option<EngineError>, bool) {
        self.shared.read_critical_error()
    }

    /// Register a callback for latched critical errors
    ///
    /// Invoked from the notifier thread, never from the audio callback.
    pub fn subscribe_critical_errors<F>(&self, callback: F)
    where
        F: Fn(EngineError) + Send + 'static,
    {
        if let Ok(mut subscribers) = self.shared.subscribers.lock() {
            subscribers.push(Box::new(callback));
        }
    }
}

/// Handle owning the background notifier thread
struct NotifierHandle {
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl NotifierHandle {
    fn spawn(shared: Arc<SharedControls>, faults: Receiver<EngineError>) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&stop_flag);

        let thread = std::thread::Builder::new()
            .name("tonegen-notifier".into())
            .spawn(move || notifier_loop(shared, faults, flag_clone))
            .expect("Failed to spawn critical-error notifier thread");

        Self {
            stop_flag,
            thread: Some(thread),
        }
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for NotifierHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn notifier_loop(
    shared: Arc<SharedControls>,
    faults: Receiver<EngineError>,
    stop_flag: Arc<AtomicBool>,
) {
    while !stop_flag.load(Ordering::Acquire) {
        match faults.recv_timeout(NOTIFIER_POLL) {
            Ok(fault) => {
                tracing::error!(error = %fault, "critical_engine_error");
                if let Ok(subscribers) = shared.subscribers.lock() {
                    for callback in subscribers.iter() {
                        callback(fault);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn block_is_finite(block: &[f32]) -> bool {
    block.iter().all(|s| s.is_finite())
}

/// Realtime tone generation engine
///
/// # Example
/// ```
/// use tonegen::{AudioEngine, ChannelMode, LayerConfiguration};
///
/// let mut engine = AudioEngine::new(48_000).unwrap();
/// let layer = LayerConfiguration::mono(440.0, 2.0, 1.0, 0.5).unwrap();
/// engine.initialize(&[layer], ChannelMode::Mono).unwrap();
/// engine.start().unwrap();
///
/// let mut block = [0.0f32; 1024];
/// engine.fill_mono_buffer(&mut block).unwrap();
/// assert!(block.iter().all(|s| s.abs() <= 0.999));
/// ```
pub struct AudioEngine {
    sample_rate: u32,
    channel_mode: ChannelMode,
    mixer: Mixer,
    shared: Arc<SharedControls>,
    /// Notifier's end of the fault queue, handed over at initialize
    fault_rx: Receiver<EngineError>,
    /// Snapshot currently rendered by the audio thread
    active_snapshot: Option<Arc<LayerSnapshot>>,
    /// Audio-thread-only smoothed master gain
    smoothed_master_gain: f32,
    consecutive_errors: u32,
    initialized: bool,
    notifier: Option<NotifierHandle>,
    #[cfg(test)]
    pending_test_faults: u32,
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("sample_rate", &self.sample_rate)
            .field("channel_mode", &self.channel_mode)
            .field("consecutive_errors", &self.consecutive_errors)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl AudioEngine {
    /// Create an engine for the given sample rate
    ///
    /// # Errors
    /// [`EngineError::InvalidSampleRate`] outside 8000..=192000 Hz.
    pub fn new(sample_rate: u32) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(EngineError::InvalidSampleRate(sample_rate));
        }

        let (config_tx, config_rx) = bounded(CONFIG_MAILBOX_CAPACITY);
        let (fault_tx, fault_rx) = bounded(FAULT_QUEUE_CAPACITY);

        let shared = Arc::new(SharedControls {
            sample_rate,
            master_gain: AtomicF32::new(1.0),
            output_gain: AtomicF32::new(1.0),
            playing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            config_dirty: AtomicBool::new(false),
            config_tx,
            config_rx,
            fault_tx,
            error_code: AtomicU8::new(0),
            has_critical_error: AtomicBool::new(false),
            layer_envelopes: std::array::from_fn(|_| AtomicF32::new(0.0)),
            subscribers: Mutex::new(Vec::new()),
        });

        Ok(Self {
            sample_rate,
            channel_mode: ChannelMode::Mono,
            mixer: Mixer::new(),
            shared,
            fault_rx,
            active_snapshot: None,
            smoothed_master_gain: 0.0,
            consecutive_errors: 0,
            initialized: false,
            notifier: None,
            #[cfg(test)]
            pending_test_faults: 0,
        })
    }

    /// Engine sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel mode the engine was initialized for
    pub fn channel_mode(&self) -> ChannelMode {
        self.channel_mode
    }

    /// Whether the engine is currently playing
    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Relaxed)
    }

    /// Obtain a cloneable control-thread handle
    pub fn controls(&self) -> EngineControls {
        EngineControls {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Initialize with the default 10 s attack / 30 s release envelope
    pub fn initialize(
        &mut self,
        configs: &[LayerConfiguration],
        output_mode: ChannelMode,
    ) -> Result<()> {
        self.initialize_with_envelope(
            configs,
            output_mode,
            crate::DEFAULT_ATTACK_SECS,
            crate::DEFAULT_RELEASE_SECS,
        )
    }

    /// Allocate the layer pool and publish the first snapshot
    ///
    /// Validates every configuration against this engine's sample rate; a
    /// configuration that passed construction-time validation is checked
    /// again here because the Nyquist guard depends on the actual rate.
    pub fn initialize_with_envelope(
        &mut self,
        configs: &[LayerConfiguration],
        output_mode: ChannelMode,
        attack_secs: f32,
        release_secs: f32,
    ) -> Result<()> {
        self.ensure_not_disposed()?;
        for config in configs {
            config.validate(self.sample_rate)?;
        }
        let snapshot = Arc::new(LayerSnapshot::new(configs.to_vec())?);

        self.mixer.initialize(
            snapshot.len(),
            self.sample_rate,
            output_mode,
            attack_secs,
            release_secs,
        )?;
        self.channel_mode = output_mode;
        self.active_snapshot = Some(snapshot);
        if self.notifier.is_none() {
            self.notifier = Some(NotifierHandle::spawn(
                Arc::clone(&self.shared),
                self.fault_rx.clone(),
            ));
        }
        self.initialized = true;

        tracing::info!(
            layers = configs.len(),
            mode = ?output_mode,
            sample_rate = self.sample_rate,
            "engine_initialized"
        );
        Ok(())
    }

    /// Replace the layer configuration; see [`EngineControls::update_configs`]
    pub fn update_configs(&self, configs: &[LayerConfiguration]) -> Result<()> {
        self.shared.publish_configs(configs)
    }

    /// Begin producing sound
    ///
    /// # Errors
    /// [`EngineError::NotInitialized`] before the first `initialize`.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        self.shared.playing.store(true, Ordering::Relaxed);
        tracing::info!("engine_started");
        Ok(())
    }

    /// Stop producing steady-state sound
    ///
    /// Closes every envelope gate; the fill calls keep rendering until the
    /// release tails decay to silence.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        self.shared.playing.store(false, Ordering::Relaxed);
        self.mixer.trigger_release_all();
        tracing::info!("engine_stopped");
        Ok(())
    }

    /// Return all DSP and error state to its initial value
    ///
    /// Stops playback first, so the layers are never reset mid-render.
    /// Keeps the layer pool and scratch allocations.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_not_disposed()?;
        self.shared.playing.store(false, Ordering::Relaxed);
        self.mixer.reset();
        self.smoothed_master_gain = 0.0;
        self.consecutive_errors = 0;
        self.shared.error_code.store(0, Ordering::Relaxed);
        self.shared.has_critical_error.store(false, Ordering::Relaxed);
        for meter in self.shared.layer_envelopes.iter() {
            meter.set(0.0);
        }
        tracing::info!("engine_reset");
        Ok(())
    }

    /// Release the engine permanently
    ///
    /// Idempotent. Stops the notifier thread and forbids every further
    /// state-changing call; only metering and error polling keep answering.
    pub fn dispose(&mut self) {
        if self.shared.disposed.swap(true, Ordering::Relaxed) {
            return;
        }
        self.shared.playing.store(false, Ordering::Relaxed);
        self.notifier = None;
        tracing::info!("engine_disposed");
    }

    /// Whether dispose() has been called
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Relaxed)
    }

    /// Set the master gain target; see [`EngineControls::set_master_gain`]
    pub fn set_master_gain(&self, gain: f32) {
        self.shared.master_gain.set(gain.clamp(0.0, 1.0));
    }

    /// Current master gain target
    pub fn master_gain(&self) -> f32 {
        self.shared.master_gain.get()
    }

    /// Set the final output multiplier, clamped to [0, 1]
    pub fn set_output_gain(&self, gain: f32) {
        self.shared.output_gain.set(gain.clamp(0.0, 1.0));
    }

    /// Current output multiplier
    pub fn output_gain(&self) -> f32 {
        self.shared.output_gain.get()
    }

    /// Envelope meter for the layer at `index`; never fails
    pub fn get_layer_envelope_value(&self, index: usize) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        self.mixer.layer_envelope_value(index)
    }

    /// Last stored render fault and the critical-error latch state
    pub fn try_get_critical_error(&self) -> (Option<EngineError>, bool) {
        self.shared.read_critical_error()
    }

    /// Register a critical-error callback; see
    /// [`EngineControls::subscribe_critical_errors`]
    pub fn subscribe_critical_errors<F>(&self, callback: F)
    where
        F: Fn(EngineError) + Send + 'static,
    {
        if let Ok(mut subscribers) = self.shared.subscribers.lock() {
            subscribers.push(Box::new(callback));
        }
    }

    /// Fill one mono block; hard-realtime entry point
    ///
    /// Geometry and mode violations are returned to the caller; internal
    /// render faults are absorbed (the block is silenced) and handled by
    /// the consecutive-error policy instead.
    pub fn fill_mono_buffer(&mut self, out: &mut [f32]) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.channel_mode != ChannelMode::Mono {
            return Err(EngineError::ChannelModeMismatch);
        }
        if out.len() > MAX_BUFFER {
            return Err(EngineError::InvalidBufferGeometry);
        }
        if !self.initialized || self.shared.has_critical_error.load(Ordering::Relaxed) {
            out.fill(0.0);
            return Ok(());
        }

        self.refresh_snapshot();
        let playing = self.shared.playing.load(Ordering::Relaxed);
        let snapshot = match self.active_snapshot.clone() {
            Some(snapshot) => snapshot,
            None => {
                out.fill(0.0);
                return Ok(());
            }
        };

        let mut render_result =
            self.mixer
                .render_mono(out, self.sample_rate, snapshot.layers(), playing);
        #[cfg(test)]
        if self.pending_test_faults > 0 {
            self.pending_test_faults -= 1;
            render_result = Err(EngineError::InternalRenderFault);
        }
        if render_result.is_ok() && !block_is_finite(out) {
            render_result = Err(EngineError::InternalRenderFault);
        }

        match render_result {
            Ok(()) => {
                self.apply_master_gain(out, &mut []);
                self.consecutive_errors = 0;
                self.publish_meters();
                Ok(())
            }
            Err(fault) => {
                out.fill(0.0);
                self.record_render_fault(fault);
                Ok(())
            }
        }
    }

    /// Fill one stereo block as separate planes; hard-realtime entry point
    pub fn fill_stereo_buffer(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<()> {
        self.ensure_not_disposed()?;
        if self.channel_mode != ChannelMode::Stereo {
            return Err(EngineError::ChannelModeMismatch);
        }
        if left.len() != right.len() || left.len() > MAX_BUFFER {
            return Err(EngineError::InvalidBufferGeometry);
        }
        if !self.initialized || self.shared.has_critical_error.load(Ordering::Relaxed) {
            left.fill(0.0);
            right.fill(0.0);
            return Ok(());
        }

        self.refresh_snapshot();
        let playing = self.shared.playing.load(Ordering::Relaxed);
        let snapshot = match self.active_snapshot.clone() {
            Some(snapshot) => snapshot,
            None => {
                left.fill(0.0);
                right.fill(0.0);
                return Ok(());
            }
        };

        let mut render_result = self.mixer.render_stereo(
            left,
            right,
            self.sample_rate,
            snapshot.layers(),
            playing,
        );
        #[cfg(test)]
        if self.pending_test_faults > 0 {
            self.pending_test_faults -= 1;
            render_result = Err(EngineError::InternalRenderFault);
        }
        if render_result.is_ok() && !(block_is_finite(left) && block_is_finite(right)) {
            render_result = Err(EngineError::InternalRenderFault);
        }

        match render_result {
            Ok(()) => {
                self.apply_master_gain(left, right);
                self.consecutive_errors = 0;
                self.publish_meters();
                Ok(())
            }
            Err(fault) => {
                left.fill(0.0);
                right.fill(0.0);
                self.record_render_fault(fault);
                Ok(())
            }
        }
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.shared.disposed.load(Ordering::Relaxed) {
            return Err(EngineError::Disposed);
        }
        Ok(())
    }

    /// Collect the newest published snapshot, if any
    fn refresh_snapshot(&mut self) {
        if self.shared.config_dirty.load(Ordering::Relaxed) {
            self.shared.config_dirty.store(false, Ordering::Relaxed);
            while let Ok(snapshot) = self.shared.config_rx.try_recv() {
                self.active_snapshot = Some(snapshot);
            }
        }
    }

    /// Smooth the master gain per sample, clamp, then apply output gain
    ///
    /// `right` may be empty for mono blocks; the smoother advances once per
    /// frame either way so mono and stereo settle at the same wall-clock
    /// rate.
    fn apply_master_gain(&mut self, left: &mut [f32], right: &mut [f32]) {
        let target = self.shared.master_gain.get();
        let output_gain = self.shared.output_gain.get();
        let mut smoothed = self.smoothed_master_gain;

        if right.is_empty() {
            for sample in left.iter_mut() {
                smoothed += (target - smoothed) * MASTER_GAIN_SLEW;
                *sample = (*sample * smoothed).clamp(-OUTPUT_CLAMP, OUTPUT_CLAMP) * output_gain;
            }
        } else {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                smoothed += (target - smoothed) * MASTER_GAIN_SLEW;
                *l = (*l * smoothed).clamp(-OUTPUT_CLAMP, OUTPUT_CLAMP) * output_gain;
                *r = (*r * smoothed).clamp(-OUTPUT_CLAMP, OUTPUT_CLAMP) * output_gain;
            }
        }

        self.smoothed_master_gain = smoothed;
    }

    fn publish_meters(&self) {
        for (index, meter) in self.shared.layer_envelopes.iter().enumerate() {
            meter.set(self.mixer.layer_envelope_value(index));
        }
    }

    /// Absorb one render fault per the consecutive-error policy
    fn record_render_fault(&mut self, fault: EngineError) {
        self.consecutive_errors += 1;
        self.shared.error_code.store(fault.code(), Ordering::Relaxed);

        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS
            && !self.shared.has_critical_error.load(Ordering::Relaxed)
        {
            self.shared.has_critical_error.store(true, Ordering::Release);
            self.shared.playing.store(false, Ordering::Relaxed);
            for meter in self.shared.layer_envelopes.iter() {
                meter.set(0.0);
            }
            // Out-of-band: the notifier thread runs the subscribers.
            let _ = self.shared.fault_tx.try_send(fault);
        }
    }

    #[cfg(test)]
    fn inject_render_faults(&mut self, count: u32) {
        self.pending_test_faults = count;
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        // The default sample rate is always inside the supported range.
        Self::new(crate::DEFAULT_SAMPLE_RATE).expect("default sample rate is valid")
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
