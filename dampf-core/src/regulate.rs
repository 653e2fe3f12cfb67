//! Feed-forward duty synthesis against the sagging battery rail.

use libm::{roundf, sqrtf};

use crate::filter::MedianEwma;
use crate::mode::Mode;
use crate::setpoint::{self, Settings};
use crate::PWM_MAX;

/// Smoothing factor of the duty ramp.
const DUTY_ALPHA: f32 = 0.1;

/// One synthesis result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Regulation {
    /// Filtered 10 bit duty word.
    pub pwm: u16,
    /// Inferred IR drop across the cell in mV.
    pub drop_mv: u16,
}

/// Converts the active set-point into a PWM duty word.
///
/// There is no current sensor; regulation is feed-forward from the measured
/// rail, the coil resistance and the battery's internal resistance. The raw
/// duty runs through a short median/average pipeline so the MOSFET ramps
/// instead of step-commanding, which tames audible transients and coil
/// inrush.
pub struct DutySynthesizer {
    /// Ramp filter on the raw duty.
    pipeline: MedianEwma,
}

impl DutySynthesizer {
    /// A synthesizer with an empty ramp.
    pub const fn new() -> Self {
        Self {
            pipeline: MedianEwma::new(DUTY_ALPHA),
        }
    }

    /// Drop the ramp history (wake path).
    pub fn reset(&mut self) {
        self.pipeline.reset();
    }

    /// Run one update.
    ///
    /// Clamps the active set-point against the sagged rail (writing it back,
    /// so the displayed value always matches what can be delivered) and
    /// returns the filtered duty plus the drop estimate. `prev_drop_mv` is
    /// the estimate from the previous update; before any firing it is zero.
    pub fn update(
        &mut self,
        mode: Mode,
        settings: &mut Settings,
        voltage_mv: u16,
        prev_drop_mv: u16,
    ) -> Regulation {
        if voltage_mv == 0 {
            // Estimator not primed yet; keep the output parked.
            return Regulation { pwm: 0, drop_mv: 0 };
        }

        let voltage = voltage_mv as f32;
        let headroom_mv = voltage_mv.saturating_sub(prev_drop_mv) as f32;

        let (raw, drop) = match mode {
            Mode::VariVolt => {
                if settings.ohm <= 0.0 {
                    settings.volt = 0.0;
                    (0.0, 0.0)
                } else {
                    let cap_v = headroom_mv / 1000.0;
                    if settings.volt > cap_v {
                        settings.volt = setpoint::floor_step(cap_v, setpoint::VOLT_STEP).max(0.0);
                    }
                    let drop = roundf(
                        settings.volt * settings.batt_res * 1000.0
                            / (settings.ohm + settings.batt_res),
                    );
                    let raw = roundf(settings.volt * 1000.0 * PWM_MAX as f32 / voltage);
                    (raw, drop)
                }
            }
            Mode::VariWatt => {
                if settings.ohm <= 0.0 {
                    settings.watt = 0;
                    (0.0, 0.0)
                } else {
                    let cap =
                        roundf(headroom_mv * headroom_mv / settings.ohm / 1_000_000.0).min(255.0);
                    if settings.watt as f32 > cap {
                        settings.watt = cap.max(0.0) as u8;
                    }
                    let out_v = sqrtf(settings.ohm * settings.watt as f32);
                    let drop = roundf(out_v * settings.batt_res * 1000.0 / settings.ohm);
                    let raw = roundf(out_v * 1000.0 * PWM_MAX as f32 / voltage);
                    (raw, drop)
                }
            }
            Mode::Hell => {
                // No PWM: the gate drives the MOSFET fully on. Only the drop
                // under the direct-cell load is estimated.
                if settings.ohm + settings.batt_res <= 0.0 {
                    (0.0, 0.0)
                } else {
                    let drop =
                        roundf(voltage * settings.batt_res / (settings.ohm + settings.batt_res));
                    (0.0, drop)
                }
            }
            Mode::Amp | Mode::Ohm | Mode::BattRes | Mode::VccConst => (0.0, 0.0),
        };

        let drop_mv = (drop.max(0.0) as u16).min(voltage_mv);
        let raw = raw.clamp(0.0, PWM_MAX as f32);
        let pwm = roundf(self.pipeline.push(raw)).clamp(0.0, PWM_MAX as f32) as u16;

        Regulation { pwm, drop_mv }
    }
}

impl Default for DutySynthesizer {
    fn default() -> Self {
        Self::new()
    }
}
