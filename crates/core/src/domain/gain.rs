//! Adaptive peak-following gain ("boost")
//!
//! The processor keeps the peak magnitude of the last [`HISTORY_LEN`]
//! blocks. While the loudest remembered peak is quiet enough, a fixed
//! floor gain of [`FLOOR_GAIN`] is applied; once it exceeds
//! [`FLOOR_THRESHOLD`] the gain normalizes that peak to full scale.
//!
//! History slots are only released by being overwritten at the same index,
//! so a single spike keeps the gain down for up to `HISTORY_LEN` blocks.
//! That slow release is intended.

use tracing::trace;

/// Number of block peaks remembered
pub const HISTORY_LEN: usize = 1000;

/// Gain used while the remembered peak is at or below [`FLOOR_THRESHOLD`]
pub const FLOOR_GAIN: f64 = 3.16;

/// Largest peak for which [`FLOOR_GAIN`] still fits in 16 bits
/// (10369 * 3.16 ≈ 32766)
pub const FLOOR_THRESHOLD: u16 = 10369;

const FULL_SCALE: f64 = i16::MAX as f64;

/// Peak history and gain stage
///
/// One instance lives for the whole routing session; it is not reset when
/// streams are swapped.
#[derive(Debug, Clone)]
pub struct GainProcessor {
    history: Box<[u16; HISTORY_LEN]>,
    cursor: usize,
    last_gain: f64,
}

impl Default for GainProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl GainProcessor {
    pub fn new() -> Self {
        Self {
            history: Box::new([0; HISTORY_LEN]),
            cursor: 0,
            last_gain: FLOOR_GAIN,
        }
    }

    /// Process one block of interleaved samples in place and return the gain
    /// that was applied.
    pub fn process(&mut self, block: &mut [i16]) -> f64 {
        let block_peak = block.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

        self.history[self.cursor] = block_peak;
        self.cursor = (self.cursor + 1) % HISTORY_LEN;

        let gain = gain_for_peak(self.peak_level());
        for sample in block.iter_mut() {
            *sample = scale(*sample, gain);
        }

        trace!(block_peak, gain, "Boosted block");
        self.last_gain = gain;
        gain
    }

    /// Loudest peak currently remembered
    pub fn peak_level(&self) -> u16 {
        self.history.iter().copied().max().unwrap_or(0)
    }

    /// Gain applied to the most recent block
    pub fn last_gain(&self) -> f64 {
        self.last_gain
    }

    /// Slot the next block peak will be written to
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn history(&self) -> &[u16] {
        &self.history[..]
    }
}

/// Gain for a given remembered peak
pub fn gain_for_peak(peak_level: u16) -> f64 {
    if peak_level > FLOOR_THRESHOLD {
        FULL_SCALE / f64::from(peak_level)
    } else {
        FLOOR_GAIN
    }
}

#[inline]
fn scale(sample: i16, gain: f64) -> i16 {
    (f64::from(sample) * gain)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}
