//! Battery rail estimation from band-gap ADC conversions.

use crate::filter::MedianEwma;

/// Smoothing factor of the rail average.
const VOLTAGE_ALPHA: f32 = 0.3;
/// Full scale of a 10 bit conversion.
const ADC_FULL_SCALE: f32 = 1023.0;

/// Filters band-gap conversions into a stable rail reading in millivolts.
///
/// The band-gap path is noisy and the MOSFET draws heavy pulsed current while
/// firing; the median window drops transient dips while the average still
/// follows a genuine discharge curve.
pub struct VoltageEstimator {
    /// Sample filter.
    filter: MedianEwma,
}

impl VoltageEstimator {
    /// An estimator with no history.
    pub const fn new() -> Self {
        Self {
            filter: MedianEwma::new(VOLTAGE_ALPHA),
        }
    }

    /// Forget all samples. Called on every wake and whenever the history is
    /// suspected stale.
    pub fn reset(&mut self) {
        self.filter.reset();
    }

    /// Fold one conversion into the estimate.
    ///
    /// `adc_code` is the result of measuring the internal reference against
    /// the rail, so the rail is `vcc_const * 1023 * 1000 / code` millivolts.
    /// A zero code is an open mux reading and is discarded.
    pub fn feed(&mut self, adc_code: u16, vcc_const: f32) {
        if adc_code == 0 {
            return;
        }
        let mv = vcc_const * ADC_FULL_SCALE * 1000.0 / adc_code as f32;
        self.filter.push(mv);
    }

    /// True once the sample window is full. Firing is impossible before this:
    /// an unprimed estimator reads 0 mV, which fails the gate's voltage guard.
    pub fn is_primed(&self) -> bool {
        self.filter.is_primed()
    }

    /// Filtered rail voltage in mV; 0 until the window is primed.
    pub fn read_mv(&self) -> u16 {
        if !self.filter.is_primed() {
            return 0;
        }
        let mv = self.filter.output();
        if mv <= 0.0 {
            0
        } else if mv >= u16::MAX as f32 {
            u16::MAX
        } else {
            mv as u16
        }
    }
}

impl Default for VoltageEstimator {
    fn default() -> Self {
        Self::new()
    }
}
