//! Portable control logic for a battery powered coil vaporizer.
//!
//! Everything in this crate is hardware independent: time is a wrapping
//! millisecond clock fed in by the caller, the battery is an injected ADC
//! conversion code, and outputs are plain commands (a duty word, a display
//! frame, a sleep request). The firmware crate adapts these to peripherals,
//! which keeps the whole regulation and lifecycle logic testable on the host.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod battery;
pub mod controller;
pub mod display;
pub mod eeprom;
pub mod filter;
pub mod gate;
pub mod lifecycle;
pub mod mode;
pub mod regulate;
pub mod setpoint;

/// Cell voltage below which firing is denied and the device trips to sleep, in mV.
pub const BATTERY_MIN_MV: u16 = 2800;
/// Fully charged cell voltage in mV.
pub const BATTERY_MAX_MV: u16 = 4200;
/// Hard limit on a single burn, in ms.
pub const FIRE_LIMIT_MS: u32 = 5000;
/// Inactivity period after which the device goes to sleep, in ms.
pub const STANDBY_TIME_MS: u32 = 300_000;
/// Click counting window of the sleep and wake gestures, in ms.
pub const UNLOCK_TIME_MS: u32 = 3000;
/// MOSFET PWM frequency in Hz.
pub const FIRE_FREQUENCY_HZ: u32 = 20_000;
/// Display refresh rate in Hz.
pub const DISPLAY_FREQUENCY_HZ: u32 = 30;
/// Interval between battery/duty refreshes in the control loop, in ms.
pub const VALUES_UPDATE_INTERVAL_MS: u32 = 10;
/// Time a button level must hold before the debouncer commits it, in ms.
pub const DEBOUNCE_MS: u32 = 100;
/// Full scale of the 10 bit PWM duty word.
pub const PWM_MAX: u16 = 1023;
/// Band-gap calibration used when the EEPROM holds no value.
pub const VCC_CONST_DEFAULT: f32 = 1.1;
