//! Exponential attack/release envelope
//!
//! A one-pole smoother with separate attack and release coefficients. The
//! per-sample update `current += (target - current) * k` keeps the value
//! inside [0, 1] and monotonic toward the target for any coefficient in
//! (0, 1]. Stage times shorter than [`MIN_ENVELOPE_SECS`] are clamped up so
//! a zero-length request cannot produce a click or a division by zero.

use crate::MIN_ENVELOPE_SECS;

/// Once a released envelope decays below this it snaps to exactly zero.
/// Keeps the tail out of denormal territory and makes "release finished"
/// mean bit-exact silence.
const ENVELOPE_FLOOR: f32 = 1e-5;

/// Asymmetric exponential gain envelope
///
/// # Example
/// ```
/// use tonegen::Envelope;
///
/// let mut env = Envelope::new();
/// env.configure(0.1, 0.1, 48_000);
/// env.trigger(true);
/// let mut block = [1.0f32; 4800];
/// env.process(&mut block);
/// assert!(env.value() > 0.5); // one attack-time later, mostly open
/// ```
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Smoothed gain, always in [0, 1]
    current: f32,
    /// Gate target, 0 or 1
    target: f32,
    /// Per-sample approach factor while rising
    attack_coeff: f32,
    /// Per-sample approach factor while falling
    release_coeff: f32,
}

impl Envelope {
    /// Create a closed envelope with no stage times configured
    pub fn new() -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
        }
    }

    /// Set the attack and release stage times
    pub fn configure(&mut self, attack_secs: f32, release_secs: f32, sample_rate: u32) {
        self.attack_coeff = Self::stage_coeff(attack_secs, sample_rate);
        self.release_coeff = Self::stage_coeff(release_secs, sample_rate);
    }

    fn stage_coeff(stage_secs: f32, sample_rate: u32) -> f32 {
        1.0 / (stage_secs.max(MIN_ENVELOPE_SECS) * sample_rate as f32)
    }

    /// Open (`true`) or close (`false`) the gate
    pub fn trigger(&mut self, active: bool) {
        self.target = if active { 1.0 } else { 0.0 };
    }

    /// Multiply the envelope into the block, advancing it per sample
    pub fn process(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            let k = if self.target > self.current {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.current += (self.target - self.current) * k;
            if self.target == 0.0 && self.current < ENVELOPE_FLOOR {
                self.current = 0.0;
            }
            *sample *= self.current;
        }
    }

    /// Current smoothed gain
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Whether the envelope is fully closed with a closed gate
    pub fn is_idle(&self) -> bool {
        self.current == 0.0 && self.target == 0.0
    }

    /// Close the gate and zero the gain immediately
    pub fn reset(&mut self) {
        self.current = 0.0;
        self.target = 0.0;
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}
