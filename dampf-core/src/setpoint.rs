//! User set-points and their quantized editor.

use libm::{ceilf, floorf, roundf};

use crate::mode::Mode;
use crate::{BATTERY_MAX_MV, VCC_CONST_DEFAULT};

/// Output voltage step in V.
pub(crate) const VOLT_STEP: f32 = 0.05;
/// Coil resistance step in Ω.
const OHM_STEP: f32 = 0.005;
/// Battery resistance step in Ω.
const BATT_RES_STEP: f32 = 0.001;
/// Band-gap calibration step.
const VCC_CONST_STEP: f32 = 0.001;
/// Largest supported coil resistance in Ω.
const OHM_MAX: f32 = 1.0;
/// Largest supported battery internal resistance in Ω.
const BATT_RES_MAX: f32 = 0.1;
/// Band-gap calibration bounds.
const VCC_CONST_MIN: f32 = 1.0;
/// Upper band-gap calibration bound.
const VCC_CONST_MAX: f32 = 1.2;
/// Largest configurable discharge limit in A.
const AMP_MAX: u8 = 100;

/// The persisted user set-points.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    /// VariVolt target in V.
    pub volt: f32,
    /// VariWatt target in W.
    pub watt: u8,
    /// Maximum cell discharge in A.
    pub amp: u8,
    /// Coil resistance in Ω.
    pub ohm: f32,
    /// Battery internal resistance in Ω.
    pub batt_res: f32,
    /// Band-gap calibration constant.
    pub vcc_const: f32,
}

impl Settings {
    /// First-boot contents: everything zero except the band-gap default.
    pub const fn first_boot() -> Self {
        Self {
            volt: 0.0,
            watt: 0,
            amp: 0,
            ohm: 0.0,
            batt_res: 0.0,
            vcc_const: VCC_CONST_DEFAULT,
        }
    }

    /// Lowest legal coil resistance for the configured discharge limit.
    ///
    /// Only meaningful with `amp > 0`; the editor forces `ohm` to zero
    /// otherwise.
    fn ohm_floor(&self) -> f32 {
        BATTERY_MAX_MV as f32 / (self.amp as f32 * 1000.0)
    }
}

/// Direction of one editor step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepDir {
    /// Increment.
    Up,
    /// Decrement.
    Down,
}

impl StepDir {
    /// Signed unit step.
    fn signum(self) -> f32 {
        match self {
            StepDir::Up => 1.0,
            StepDir::Down => -1.0,
        }
    }
}

/// Apply one quantized editor step for `mode`.
///
/// `voltage_mv` is the current filtered rail; it bounds the fire-cluster
/// set-points. Values snap to the mode's step grid, then clamp: upper clamps
/// snap down the grid, lower clamps snap up.
pub fn apply_step(settings: &mut Settings, mode: Mode, dir: StepDir, voltage_mv: u16) {
    match mode {
        Mode::VariVolt => {
            if settings.ohm <= 0.0 {
                settings.volt = 0.0;
                return;
            }
            let stepped = settings.volt + dir.signum() * VOLT_STEP;
            let cap = voltage_mv as f32 / 1000.0;
            settings.volt = clamp_to_grid(stepped, VOLT_STEP, 0.0, cap);
        }
        Mode::VariWatt => {
            if settings.ohm <= 0.0 {
                settings.watt = 0;
                return;
            }
            let rail_v = voltage_mv as f32 / 1000.0;
            let cap = floorf(rail_v * rail_v / settings.ohm).min(u8::MAX as f32) as u8;
            settings.watt = step_integer(settings.watt, dir, cap);
        }
        Mode::Hell => {}
        Mode::Amp => {
            settings.amp = step_integer(settings.amp, dir, AMP_MAX);
        }
        Mode::Ohm => {
            if settings.amp == 0 {
                settings.ohm = 0.0;
                return;
            }
            let stepped = settings.ohm + dir.signum() * OHM_STEP;
            let floor = ceil_step(settings.ohm_floor(), OHM_STEP);
            settings.ohm = clamp_to_grid(stepped, OHM_STEP, floor, OHM_MAX);
        }
        Mode::BattRes => {
            let stepped = settings.batt_res + dir.signum() * BATT_RES_STEP;
            settings.batt_res = clamp_to_grid(stepped, BATT_RES_STEP, 0.0, BATT_RES_MAX);
        }
        Mode::VccConst => {
            let stepped = settings.vcc_const + dir.signum() * VCC_CONST_STEP;
            settings.vcc_const = clamp_to_grid(stepped, VCC_CONST_STEP, VCC_CONST_MIN, VCC_CONST_MAX);
        }
    }
}

/// One signed unit step on an integer set-point, saturating at `[0, cap]`.
fn step_integer(value: u8, dir: StepDir, cap: u8) -> u8 {
    let stepped = match dir {
        StepDir::Up => value.saturating_add(1),
        StepDir::Down => value.saturating_sub(1),
    };
    stepped.min(cap)
}

/// Tolerance on grid quotients: a value sitting on the grid must not fall a
/// step short because `value / step` landed at 27.9999981.
const GRID_EPS: f32 = 1e-3;

/// Snap to the nearest multiple of `step`.
fn snap(value: f32, step: f32) -> f32 {
    roundf(value / step) * step
}

/// The largest multiple of `step` not above `value`.
pub(crate) fn floor_step(value: f32, step: f32) -> f32 {
    floorf(value / step + GRID_EPS) * step
}

/// The smallest multiple of `step` not below `value`.
fn ceil_step(value: f32, step: f32) -> f32 {
    ceilf(value / step - GRID_EPS) * step
}

/// Snap `value` onto the grid, then clamp into `[lo, hi]` without leaving it.
fn clamp_to_grid(value: f32, step: f32, lo: f32, hi: f32) -> f32 {
    let snapped = snap(value, step);
    if snapped < lo {
        ceil_step(lo, step).min(hi)
    } else if snapped > hi {
        floor_step(hi, step).max(lo)
    } else {
        snapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A plausible configuration with a coil attached.
    fn configured() -> Settings {
        Settings {
            volt: 3.0,
            watt: 20,
            amp: 30,
            ohm: 0.5,
            batt_res: 0.015,
            vcc_const: 1.1,
        }
    }

    fn on_grid(value: f32, step: f32) {
        let steps = value / step;
        assert!(
            (steps - roundf(steps)).abs() < 1e-3,
            "{value} is not a multiple of {step}"
        );
    }

    #[test]
    fn volt_steps_stay_on_the_grid_and_below_the_rail() {
        let mut settings = configured();
        for _ in 0..100 {
            apply_step(&mut settings, Mode::VariVolt, StepDir::Up, 4000);
            on_grid(settings.volt, VOLT_STEP);
            assert!(settings.volt <= 4.0 + 1e-4);
        }
        assert!((settings.volt - 4.0).abs() < 1e-4);
        for _ in 0..200 {
            apply_step(&mut settings, Mode::VariVolt, StepDir::Down, 4000);
            on_grid(settings.volt, VOLT_STEP);
            assert!(settings.volt >= -1e-4);
        }
        assert!(settings.volt.abs() < 1e-4);
    }

    #[test]
    fn volt_clamp_tracks_any_admissible_rail() {
        // The 50 mV grid lands every cap on a volt step; the offset grid
        // lands them mid-step (2933 mV -> cap 2.933 V, nearest multiple
        // below is 2.90 V), which is the interesting clamp case.
        let rails = (2800..=4200u16)
            .step_by(50)
            .chain((2833..=4183u16).step_by(50));
        for voltage_mv in rails {
            let mut settings = configured();
            settings.volt = 0.0;
            for _ in 0..100 {
                apply_step(&mut settings, Mode::VariVolt, StepDir::Up, voltage_mv);
                on_grid(settings.volt, VOLT_STEP);
                assert!(
                    settings.volt <= voltage_mv as f32 / 1000.0 + 1e-4,
                    "volt {} exceeds rail {voltage_mv} mV",
                    settings.volt
                );
            }
            // Largest multiple of 0.05 V under the rail, computed in integer
            // 50 mV steps so the expectation is independent of the float path.
            let expected = (voltage_mv / 50) as f32 * VOLT_STEP;
            assert!(
                (settings.volt - expected).abs() < 1e-4,
                "volt {} != {expected} at rail {voltage_mv} mV",
                settings.volt
            );
            for _ in 0..200 {
                apply_step(&mut settings, Mode::VariVolt, StepDir::Down, voltage_mv);
                on_grid(settings.volt, VOLT_STEP);
                assert!(settings.volt >= -1e-4);
            }
            assert!(settings.volt.abs() < 1e-4);
        }
    }

    #[test]
    fn volt_edit_without_a_coil_zeroes_the_target() {
        let mut settings = configured();
        settings.ohm = 0.0;
        apply_step(&mut settings, Mode::VariVolt, StepDir::Up, 4000);
        assert_eq!(settings.volt, 0.0);
    }

    #[test]
    fn watt_caps_at_the_available_power() {
        let mut settings = configured();
        // 4.2 V on 0.5 Ω supports 35 W.
        settings.watt = 34;
        apply_step(&mut settings, Mode::VariWatt, StepDir::Up, 4200);
        assert_eq!(settings.watt, 35);
        apply_step(&mut settings, Mode::VariWatt, StepDir::Up, 4200);
        assert_eq!(settings.watt, 35);
    }

    #[test]
    fn ohm_respects_the_discharge_limit() {
        let mut settings = configured();
        settings.amp = 30;
        settings.ohm = 0.145;
        // 4.2 V / 30 A needs at least 0.14 Ω.
        apply_step(&mut settings, Mode::Ohm, StepDir::Down, 4000);
        assert!((settings.ohm - 0.14).abs() < 1e-4);
        apply_step(&mut settings, Mode::Ohm, StepDir::Down, 4000);
        assert!((settings.ohm - 0.14).abs() < 1e-4);
        for _ in 0..500 {
            apply_step(&mut settings, Mode::Ohm, StepDir::Up, 4000);
            on_grid(settings.ohm, OHM_STEP);
        }
        assert!((settings.ohm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn ohm_floor_holds_across_the_amp_range() {
        for amp in 1..=100u8 {
            let mut settings = configured();
            settings.amp = amp;
            settings.ohm = 0.5;
            let floor = settings.ohm_floor().min(OHM_MAX);

            for _ in 0..250 {
                apply_step(&mut settings, Mode::Ohm, StepDir::Down, 4000);
                on_grid(settings.ohm, OHM_STEP);
                assert!(settings.ohm <= OHM_MAX + 1e-4);
            }
            assert!(
                settings.ohm + 1e-4 >= floor,
                "ohm {} fell under the {floor} Ω floor at {amp} A",
                settings.ohm
            );
            // An unsatisfiable floor (a discharge limit so low that even a
            // 1 Ω coil exceeds it) pins the value at the top of the range.
            if settings.ohm_floor() > OHM_MAX {
                assert!((settings.ohm - OHM_MAX).abs() < 1e-4);
            }

            for _ in 0..250 {
                apply_step(&mut settings, Mode::Ohm, StepDir::Up, 4000);
                on_grid(settings.ohm, OHM_STEP);
                assert!(settings.ohm <= OHM_MAX + 1e-4);
                assert!(settings.ohm + 1e-4 >= floor);
            }
            assert!((settings.ohm - OHM_MAX).abs() < 1e-4);
        }
    }

    #[test]
    fn ohm_edit_without_amp_limit_zeroes_the_coil() {
        let mut settings = configured();
        settings.amp = 0;
        apply_step(&mut settings, Mode::Ohm, StepDir::Up, 4000);
        assert_eq!(settings.ohm, 0.0);
    }

    #[test]
    fn amp_saturates_at_its_bounds() {
        let mut settings = configured();
        settings.amp = 99;
        apply_step(&mut settings, Mode::Amp, StepDir::Up, 4000);
        assert_eq!(settings.amp, 100);
        apply_step(&mut settings, Mode::Amp, StepDir::Up, 4000);
        assert_eq!(settings.amp, 100);
        settings.amp = 1;
        apply_step(&mut settings, Mode::Amp, StepDir::Down, 4000);
        assert_eq!(settings.amp, 0);
        apply_step(&mut settings, Mode::Amp, StepDir::Down, 4000);
        assert_eq!(settings.amp, 0);
    }

    #[test]
    fn vcc_const_clamps_to_its_calibration_range() {
        let mut settings = configured();
        settings.vcc_const = 1.199;
        apply_step(&mut settings, Mode::VccConst, StepDir::Up, 4000);
        assert!((settings.vcc_const - 1.2).abs() < 1e-4);
        apply_step(&mut settings, Mode::VccConst, StepDir::Up, 4000);
        assert!((settings.vcc_const - 1.2).abs() < 1e-4);
        for _ in 0..500 {
            apply_step(&mut settings, Mode::VccConst, StepDir::Down, 4000);
        }
        assert!((settings.vcc_const - 1.0).abs() < 1e-4);
    }

    #[test]
    fn batt_res_clamps_between_zero_and_a_tenth() {
        let mut settings = configured();
        for _ in 0..500 {
            apply_step(&mut settings, Mode::BattRes, StepDir::Up, 4000);
            on_grid(settings.batt_res, BATT_RES_STEP);
        }
        assert!((settings.batt_res - 0.1).abs() < 1e-4);
        for _ in 0..500 {
            apply_step(&mut settings, Mode::BattRes, StepDir::Down, 4000);
        }
        assert!(settings.batt_res.abs() < 1e-4);
    }

    #[test]
    fn hell_has_no_set_point() {
        let mut settings = configured();
        let before = settings;
        apply_step(&mut settings, Mode::Hell, StepDir::Up, 4000);
        assert_eq!(settings, before);
    }
}
