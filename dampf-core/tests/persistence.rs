//! Round-trip persistence of the settings image.

use dampf_core::controller::{Button, ButtonEvent, Controller, Inputs};
use dampf_core::eeprom;
use dampf_core::mode::Mode;
use dampf_core::setpoint::Settings;

#[test]
fn image_round_trips_bit_exactly() {
    let settings = Settings {
        volt: 3.65,
        watt: 42,
        amp: 87,
        ohm: 0.235,
        batt_res: 0.017,
        vcc_const: 1.093,
    };
    let image = eeprom::encode(&settings, Mode::Hell);
    let (read_back, mode) = eeprom::decode(&image);

    assert_eq!(read_back.volt.to_bits(), settings.volt.to_bits());
    assert_eq!(read_back.watt, settings.watt);
    assert_eq!(read_back.amp, settings.amp);
    assert_eq!(read_back.ohm.to_bits(), settings.ohm.to_bits());
    assert_eq!(read_back.batt_res.to_bits(), settings.batt_res.to_bits());
    assert_eq!(read_back.vcc_const.to_bits(), settings.vcc_const.to_bits());
    assert_eq!(mode, Mode::Hell);
}

#[test]
fn first_boot_image_round_trips() {
    let image = eeprom::encode(&Settings::first_boot(), Mode::VariVolt);
    let (settings, mode) = eeprom::decode(&image);
    assert_eq!(settings, Settings::first_boot());
    assert_eq!(mode, Mode::VariVolt);
}

#[test]
fn persisted_image_tracks_the_edited_state() {
    let settings = Settings {
        volt: 3.0,
        watt: 20,
        amp: 30,
        ohm: 0.5,
        batt_res: 0.015,
        vcc_const: 1.1,
    };
    let mut controller = Controller::new(settings, Mode::VariVolt);

    // Prime the rail so edits see a voltage bound.
    let code = (1.1 * 1023.0 * 1000.0 / 4000.0) as u16;
    let mut now = 0;
    for _ in 0..50 {
        now += 1;
        controller.step(&Inputs {
            now_ms: now,
            fire_pressed: false,
            adc_code: code,
            event: None,
        });
    }

    // Two volt increments: 3.00 -> 3.10.
    for _ in 0..2 {
        now += 1;
        controller.step(&Inputs {
            now_ms: now,
            fire_pressed: false,
            adc_code: code,
            event: Some(ButtonEvent::Short(Button::Up)),
        });
    }

    let (read_back, mode) = eeprom::decode(&controller.persist_image());
    assert!((read_back.volt - 3.10).abs() < 1e-4);
    assert_eq!(mode, Mode::VariVolt);
}

#[test]
fn image_remembers_the_fire_mode_across_a_settings_detour() {
    let settings = Settings {
        volt: 3.0,
        watt: 20,
        amp: 30,
        ohm: 0.5,
        batt_res: 0.015,
        vcc_const: 1.1,
    };
    let mut controller = Controller::new(settings, Mode::VariVolt);
    let code = (1.1 * 1023.0 * 1000.0 / 4000.0) as u16;
    let mut now = 0;
    let mut push = |controller: &mut Controller, now: &mut u32, event| {
        *now += 1;
        controller.step(&Inputs {
            now_ms: *now,
            fire_pressed: false,
            adc_code: code,
            event,
        });
    };

    // Move to VariWatt, then wander into the settings cluster.
    push(&mut controller, &mut now, Some(ButtonEvent::Short(Button::Mode)));
    assert_eq!(controller.mode(), Mode::VariWatt);
    push(&mut controller, &mut now, Some(ButtonEvent::Double(Button::Mode)));
    assert!(controller.settings_mode());
    push(&mut controller, &mut now, Some(ButtonEvent::Short(Button::Mode)));

    // The image still names the fire mode, per the sleep/wake contract.
    let (_, mode) = eeprom::decode(&controller.persist_image());
    assert_eq!(mode, Mode::VariWatt);
}
