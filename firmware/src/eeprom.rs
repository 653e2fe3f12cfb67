//! Settings persistence on the 24x-series EEPROM.

use dampf_core::eeprom::{decode, IMAGE_LEN};
use defmt::{debug, info, warn};
use embassy_stm32::i2c;
use embassy_stm32::mode::Async;
use embassy_time::Timer;

use crate::{SETTINGS_LOADED_SIG, STORE_PERSISTENT_SIG};

/// The type of EEPROM on this device.
type Eeprom = eeprom24x::Eeprom24x<
    i2c::I2c<'static, Async>,
    eeprom24x::page_size::B32,
    eeprom24x::addr_size::TwoBytes,
    eeprom24x::unique_serial::No,
>;

/// Write-cycle time of the part.
const WRITE_CYCLE_MS: u64 = 5;

/// Read the settings image, retrying until the bus answers.
async fn load(eeprom: &mut Eeprom) -> [u8; IMAGE_LEN] {
    let mut image = [0u8; IMAGE_LEN];
    while eeprom.read_data(0, &mut image).is_err() {
        debug!("Retry EEPROM read");
        Timer::after_millis(10).await;
    }
    image
}

/// Store an image with update-if-changed semantics: only differing bytes are
/// written, so an unchanged sleep costs no erase cycles.
async fn store(eeprom: &mut Eeprom, image: &[u8; IMAGE_LEN]) {
    let current = load(eeprom).await;

    let mut written = 0;
    for (offset, (new, old)) in image.iter().zip(current.iter()).enumerate() {
        if new == old {
            continue;
        }
        while eeprom.write_byte(offset as u32, *new).is_err() {
            warn!("Retry EEPROM write at {}", offset);
            Timer::after_millis(WRITE_CYCLE_MS).await;
        }
        Timer::after_millis(WRITE_CYCLE_MS).await;
        written += 1;
    }
    debug!("EEPROM store complete, {} bytes written", written);
}

/// Handles reading and writing the EEPROM.
#[embassy_executor::task]
pub async fn eeprom_task(mut eeprom: Eeprom) {
    let image = load(&mut eeprom).await;
    let (settings, last_fire_mode) = decode(&image);
    info!("Loaded settings, last fire mode {}", last_fire_mode);
    SETTINGS_LOADED_SIG.signal((settings, last_fire_mode));

    loop {
        let image = STORE_PERSISTENT_SIG.wait().await;
        store(&mut eeprom, &image).await;
    }
}
