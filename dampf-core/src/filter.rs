//! Sample smoothing shared by the voltage estimator and the duty pipeline.

/// Median-of-three window followed by an exponential moving average.
///
/// The median drops single-sample spikes, the average smooths what remains.
/// Both the battery rail (which dips hard when the MOSFET switches) and the
/// commanded duty (which must ramp rather than step) run through one of these.
pub struct MedianEwma {
    /// The most recent samples, newest first.
    window: [f32; 3],
    /// How many window slots hold a real sample.
    filled: u8,
    /// Smoothed output.
    out: f32,
    /// Smoothing factor of the average.
    alpha: f32,
}

impl MedianEwma {
    /// An empty filter with the given smoothing factor.
    pub const fn new(alpha: f32) -> Self {
        Self {
            window: [0.0; 3],
            filled: 0,
            out: 0.0,
            alpha,
        }
    }

    /// Drop all history; the next three samples refill the window.
    pub fn reset(&mut self) {
        self.window = [0.0; 3];
        self.filled = 0;
        self.out = 0.0;
    }

    /// True once the window holds three samples.
    pub fn is_primed(&self) -> bool {
        self.filled >= 3
    }

    /// Shift in a sample and return the new output.
    ///
    /// While refilling, the raw sample passes straight through; the third
    /// sample seeds the average with the window mean.
    pub fn push(&mut self, sample: f32) -> f32 {
        self.window[2] = self.window[1];
        self.window[1] = self.window[0];
        self.window[0] = sample;

        if self.filled < 3 {
            self.filled += 1;
            self.out = if self.filled == 3 {
                (self.window[0] + self.window[1] + self.window[2]) / 3.0
            } else {
                sample
            };
            return self.out;
        }

        let median = median3(self.window[0], self.window[1], self.window[2]);
        self.out += self.alpha * (median - self.out);
        self.out
    }

    /// Current output without feeding a sample.
    pub fn output(&self) -> f32 {
        self.out
    }
}

/// Median of three values.
fn median3(a: f32, b: f32, c: f32) -> f32 {
    a.max(b).min(a.min(b).max(c))
}
