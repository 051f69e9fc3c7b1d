//! Phase-accumulating sine carrier
//!
//! The oscillator keeps its phase in double precision so that multi-hour
//! sessions do not drift audibly: an f32 accumulator loses enough mantissa
//! after a few minutes at audio rate to detune the carrier. Samples are
//! narrowed to f32 only at the output write.

use std::f64::consts::TAU;

/// Continuous sine oscillator with a 64-bit phase accumulator
///
/// # Example
/// ```
/// use tonegen::SineOscillator;
///
/// let mut osc = SineOscillator::new();
/// osc.set_frequency(440.0, 48_000);
/// let mut block = [0.0f32; 64];
/// osc.process(&mut block);
/// assert!(block.iter().all(|s| s.abs() <= 1.0));
/// ```
#[derive(Debug, Clone)]
pub struct SineOscillator {
    /// Current phase in radians, kept in [0, 2*pi)
    phase: f64,
    /// Phase advance per sample in radians
    phase_inc: f64,
}

impl SineOscillator {
    /// Create an oscillator at phase zero with no frequency set
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            phase_inc: 0.0,
        }
    }

    /// Set the oscillator frequency
    ///
    /// Must only be called between blocks: either from the audio thread
    /// before rendering, or from a single writer while no block is in
    /// flight.
    pub fn set_frequency(&mut self, freq_hz: f64, sample_rate: u32) {
        self.phase_inc = TAU * freq_hz / sample_rate as f64;
    }

    /// Write one sine sample per slot and advance the phase
    ///
    /// The phase wraps by subtraction rather than modulo so the wrap cost
    /// is a single branch and the accumulator never grows.
    pub fn process(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.phase.sin() as f32;
            self.phase += self.phase_inc;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
    }

    /// Current phase in radians
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Phase advance per sample in radians
    pub fn phase_increment(&self) -> f64 {
        self.phase_inc
    }

    /// Return the phase to zero; the frequency is kept
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

impl Default for SineOscillator {
    fn default() -> Self {
        Self::new()
    }
}
