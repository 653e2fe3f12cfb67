//! The fixed EEPROM image layout.
//!
//! Little-endian fields at fixed offsets; the firmware writes the image with
//! update-if-changed semantics so an unchanged sleep costs no erase cycles.

use crate::mode::{Cluster, Mode};
use crate::setpoint::Settings;
use crate::VCC_CONST_DEFAULT;

/// Total image length in bytes.
pub const IMAGE_LEN: usize = 19;

/// Band-gap calibration, f32.
const OFF_VCC_CONST: usize = 0;
/// Last fire-cluster mode tag, u8.
const OFF_MODE: usize = 4;
/// VariVolt target, f32.
const OFF_VOLT: usize = 5;
/// VariWatt target, u8.
const OFF_WATT: usize = 9;
/// Discharge limit, u8.
const OFF_AMP: usize = 10;
/// Coil resistance, f32.
const OFF_OHM: usize = 11;
/// Battery internal resistance, f32.
const OFF_BATT_RES: usize = 15;

/// Serialize the set-points and the last fire mode into the fixed layout.
pub fn encode(settings: &Settings, last_fire_mode: Mode) -> [u8; IMAGE_LEN] {
    let mut image = [0u8; IMAGE_LEN];
    put_f32(&mut image, OFF_VCC_CONST, settings.vcc_const);
    image[OFF_MODE] = last_fire_mode.as_index();
    put_f32(&mut image, OFF_VOLT, settings.volt);
    image[OFF_WATT] = settings.watt;
    image[OFF_AMP] = settings.amp;
    put_f32(&mut image, OFF_OHM, settings.ohm);
    put_f32(&mut image, OFF_BATT_RES, settings.batt_res);
    image
}

/// Parse an image read from the part.
///
/// A blank or corrupt `vcc_const` (zero or non-finite) falls back to the
/// factory default. Other fields are taken as stored; out-of-range values
/// are clamped on their first edit, and non-finite floats from a blank part
/// fold to zero so the usual comparisons stay meaningful.
pub fn decode(image: &[u8; IMAGE_LEN]) -> (Settings, Mode) {
    let stored_vcc = f32_at(image, OFF_VCC_CONST);
    let vcc_const = if stored_vcc == 0.0 || !stored_vcc.is_finite() {
        VCC_CONST_DEFAULT
    } else {
        stored_vcc
    };

    let mode = match Mode::from_index(image[OFF_MODE]) {
        Some(mode) if matches!(mode.cluster(), Cluster::Fire) => mode,
        _ => Mode::VariVolt,
    };

    let settings = Settings {
        volt: sane(f32_at(image, OFF_VOLT)),
        watt: image[OFF_WATT],
        amp: image[OFF_AMP],
        ohm: sane(f32_at(image, OFF_OHM)),
        batt_res: sane(f32_at(image, OFF_BATT_RES)),
        vcc_const,
    };
    (settings, mode)
}

/// Write a little-endian f32 at `offset`.
fn put_f32(image: &mut [u8; IMAGE_LEN], offset: usize, value: f32) {
    image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read a little-endian f32 at `offset`.
fn f32_at(image: &[u8; IMAGE_LEN], offset: usize) -> f32 {
    f32::from_le_bytes([
        image[offset],
        image[offset + 1],
        image[offset + 2],
        image[offset + 3],
    ])
}

/// Blank-part bytes decode to NaN; fold those to zero.
fn sane(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_uses_the_fixed_offsets() {
        let settings = Settings {
            volt: 3.7,
            watt: 25,
            amp: 30,
            ohm: 0.5,
            batt_res: 0.015,
            vcc_const: 1.1,
        };
        let image = encode(&settings, Mode::VariWatt);
        assert_eq!(image[0..4], 1.1f32.to_le_bytes());
        assert_eq!(image[4], Mode::VariWatt.as_index());
        assert_eq!(image[5..9], 3.7f32.to_le_bytes());
        assert_eq!(image[9], 25);
        assert_eq!(image[10], 30);
        assert_eq!(image[11..15], 0.5f32.to_le_bytes());
        assert_eq!(image[15..19], 0.015f32.to_le_bytes());
    }

    #[test]
    fn blank_part_yields_first_boot_defaults() {
        let image = [0xFFu8; IMAGE_LEN];
        let (settings, mode) = decode(&image);
        assert_eq!(settings.vcc_const, crate::VCC_CONST_DEFAULT);
        assert_eq!(settings.volt, 0.0);
        assert_eq!(settings.ohm, 0.0);
        assert_eq!(settings.batt_res, 0.0);
        assert_eq!(mode, Mode::VariVolt);
    }

    #[test]
    fn zeroed_vcc_const_falls_back_to_the_default() {
        let mut image = [0u8; IMAGE_LEN];
        image[OFF_MODE] = Mode::Hell.as_index();
        let (settings, mode) = decode(&image);
        assert_eq!(settings.vcc_const, crate::VCC_CONST_DEFAULT);
        assert_eq!(mode, Mode::Hell);
    }

    #[test]
    fn settings_cluster_tag_is_rejected() {
        let mut image = [0u8; IMAGE_LEN];
        image[OFF_MODE] = Mode::Ohm.as_index();
        let (_, mode) = decode(&image);
        assert_eq!(mode, Mode::VariVolt);
    }
}
