//! Tonegen - real-time tone generation engine
//!
//! This library synthesizes continuous tonal material (sine carriers with
//! optional amplitude modulation and binaural frequency offsets) for
//! long-form listening sessions. A platform audio callback asks the engine
//! to fill sample blocks on a hard deadline; a separate control thread may
//! reconfigure layers, adjust gain, and poll for errors at any time without
//! taking locks.
//!
//! The realtime path never allocates, blocks, logs, or performs I/O once
//! the engine is initialized. Configuration updates are published as
//! immutable snapshots and picked up whole by the audio thread; repeated
//! render faults silence the output and latch a critical-error state that
//! is reported from a background notifier thread, never from the callback.

pub mod audio;
pub mod config;
pub mod error;

pub use audio::engine::{AudioEngine, EngineControls};
pub use audio::envelope::Envelope;
pub use audio::lfo::Lfo;
pub use audio::mixer::Mixer;
pub use audio::oscillator::SineOscillator;
pub use config::{ChannelMode, LayerConfiguration, LayerSnapshot};
pub use error::{EngineError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate for rendering (48 kHz, the common mobile rate)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Lowest sample rate an engine can be constructed with
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Highest sample rate an engine can be constructed with
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Maximum number of simultaneous layers in a snapshot
pub const MAX_LAYERS: usize = 8;

/// Maximum block length in samples accepted by the fill calls
pub const MAX_BUFFER: usize = 4096;

/// LFO control-rate divider: a new modulator value is computed every
/// `CONTROL_RATE` samples and intermediate samples are interpolated
pub const CONTROL_RATE: usize = 16;

/// Fixed attenuation applied to the summed mix (-6 dB reserved headroom)
pub const MIX_HEADROOM: f32 = 0.5;

/// Number of consecutive render faults before the engine latches its
/// critical-error state and stops playback
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Default envelope attack time in seconds
pub const DEFAULT_ATTACK_SECS: f32 = 10.0;

/// Default envelope release time in seconds
pub const DEFAULT_RELEASE_SECS: f32 = 30.0;

/// Shortest permitted envelope stage; shorter requests are clamped up
pub const MIN_ENVELOPE_SECS: f32 = 0.1;

/// Lowest valid carrier frequency in Hz
pub const CARRIER_MIN_HZ: f32 = 20.0;

/// Highest valid carrier frequency in Hz (also bounded by the Nyquist guard)
pub const CARRIER_MAX_HZ: f32 = 2_000.0;

/// Carriers must stay below this fraction of the sample rate
pub const CARRIER_NYQUIST_RATIO: f32 = 0.45;

/// Lowest valid modulator frequency in Hz (zero disables modulation)
pub const MODULATOR_MIN_HZ: f32 = 0.1;

/// Highest valid modulator frequency in Hz
pub const MODULATOR_MAX_HZ: f32 = 100.0;

/// Hard safety clamp applied to every output sample after master gain
pub const OUTPUT_CLAMP: f32 = 0.999;

/// Per-sample slew factor for master-gain smoothing (~100 ms at 48 kHz)
pub const MASTER_GAIN_SLEW: f32 = 0.001;
