//! Duty synthesis scenarios and range properties.

use dampf_core::mode::Mode;
use dampf_core::regulate::{DutySynthesizer, Regulation};
use dampf_core::setpoint::Settings;
use dampf_core::PWM_MAX;

/// The reference configuration: fresh cell, 0.5 Ω coil, 15 mΩ cell resistance.
fn reference() -> Settings {
    Settings {
        volt: 3.7,
        watt: 25,
        amp: 30,
        ohm: 0.5,
        batt_res: 0.015,
        vcc_const: 1.1,
    }
}

#[test]
fn varivolt_duty_at_full_charge() {
    let mut settings = reference();
    let mut synth = DutySynthesizer::new();
    let regulation = synth.update(Mode::VariVolt, &mut settings, 4000, 0);
    assert_eq!(
        regulation,
        Regulation {
            pwm: 946,
            drop_mv: 108
        }
    );
    // The set-point survives untouched below the cap.
    assert!((settings.volt - 3.7).abs() < 1e-6);
}

#[test]
fn variwatt_duty_at_full_charge() {
    let mut settings = reference();
    let mut synth = DutySynthesizer::new();
    let regulation = synth.update(Mode::VariWatt, &mut settings, 4000, 0);
    assert_eq!(
        regulation,
        Regulation {
            pwm: 904,
            drop_mv: 106
        }
    );
    assert_eq!(settings.watt, 25);
}

#[test]
fn hell_estimates_the_direct_cell_drop() {
    let mut settings = reference();
    let mut synth = DutySynthesizer::new();
    let regulation = synth.update(Mode::Hell, &mut settings, 4000, 0);
    assert_eq!(regulation.pwm, 0);
    assert_eq!(regulation.drop_mv, 117);
}

#[test]
fn sagging_rail_clamps_the_volt_target() {
    let mut settings = reference();
    settings.volt = 3.0;
    let mut synth = DutySynthesizer::new();
    let regulation = synth.update(Mode::VariVolt, &mut settings, 2900, 0);
    // Next multiple of 0.05 under the sagged rail.
    assert!((settings.volt - 2.90).abs() < 1e-4, "volt = {}", settings.volt);
    assert!(regulation.pwm <= PWM_MAX);
}

#[test]
fn settings_modes_neither_drive_nor_drop() {
    let mut settings = reference();
    let mut synth = DutySynthesizer::new();
    for mode in [Mode::Amp, Mode::Ohm, Mode::BattRes, Mode::VccConst] {
        let regulation = synth.update(mode, &mut settings, 4000, 0);
        assert_eq!(regulation, Regulation { pwm: 0, drop_mv: 0 });
    }
}

#[test]
fn missing_coil_zeroes_the_fire_targets() {
    let mut settings = reference();
    settings.ohm = 0.0;
    let mut synth = DutySynthesizer::new();
    let regulation = synth.update(Mode::VariVolt, &mut settings, 4000, 0);
    assert_eq!(regulation, Regulation { pwm: 0, drop_mv: 0 });
    assert_eq!(settings.volt, 0.0);

    let mut settings = reference();
    settings.ohm = 0.0;
    let regulation = synth.update(Mode::VariWatt, &mut settings, 4000, 0);
    assert_eq!(regulation, Regulation { pwm: 0, drop_mv: 0 });
    assert_eq!(settings.watt, 0);
}

#[test]
fn unprimed_rail_parks_the_output() {
    let mut settings = reference();
    let mut synth = DutySynthesizer::new();
    let regulation = synth.update(Mode::VariVolt, &mut settings, 0, 0);
    assert_eq!(regulation, Regulation { pwm: 0, drop_mv: 0 });
}

#[test]
fn duty_and_drop_stay_in_range_across_the_envelope() {
    for voltage_mv in (2800..=4200u16).step_by(100) {
        for ohm_milli in (50..=1000u32).step_by(50) {
            for volt_deci in (0..=42u32).step_by(3) {
                let mut settings = reference();
                settings.ohm = ohm_milli as f32 / 1000.0;
                settings.volt = volt_deci as f32 / 10.0;
                let mut synth = DutySynthesizer::new();
                // Two rounds so the drop estimate feeds back once.
                let first = synth.update(Mode::VariVolt, &mut settings, voltage_mv, 0);
                let second =
                    synth.update(Mode::VariVolt, &mut settings, voltage_mv, first.drop_mv);
                for regulation in [first, second] {
                    assert!(regulation.pwm <= PWM_MAX);
                    assert!(regulation.drop_mv <= voltage_mv);
                }
            }
        }
    }
}

#[test]
fn watt_duty_stays_in_range_across_the_envelope() {
    for voltage_mv in (2800..=4200u16).step_by(200) {
        for ohm_milli in (50..=1000u32).step_by(100) {
            for watt in (0..=60u8).step_by(5) {
                let mut settings = reference();
                settings.ohm = ohm_milli as f32 / 1000.0;
                settings.watt = watt;
                let mut synth = DutySynthesizer::new();
                let regulation = synth.update(Mode::VariWatt, &mut settings, voltage_mv, 0);
                assert!(regulation.pwm <= PWM_MAX);
                assert!(regulation.drop_mv <= voltage_mv);
                // Whatever the clamp left behind still fits the rail.
                let cap = (voltage_mv as f32 / 1000.0).powi(2) / settings.ohm;
                assert!(settings.watt as f32 <= cap + 1.0);
            }
        }
    }
}

#[test]
fn duty_ramps_through_the_pipeline() {
    let mut settings = reference();
    let mut synth = DutySynthesizer::new();
    // Prime the ramp at zero output.
    settings.volt = 0.0;
    for _ in 0..3 {
        synth.update(Mode::VariVolt, &mut settings, 4000, 0);
    }
    // Step the target up: the commanded duty approaches 946 gradually.
    settings.volt = 3.7;
    let first = synth.update(Mode::VariVolt, &mut settings, 4000, 0);
    assert!(first.pwm < 946);
    let mut last = first.pwm;
    for _ in 0..100 {
        last = synth.update(Mode::VariVolt, &mut settings, 4000, 0).pwm;
    }
    assert_eq!(last, 946);
}
