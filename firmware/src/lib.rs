//! Firmware for the dampf coil vaporizer controller.
//!
//! Every concern runs as its own embassy task; the tasks talk through the
//! signals and the channel below. All regulation and lifecycle logic lives in
//! `dampf-core`; this crate only adapts it to the peripherals.
#![no_std]
#![warn(missing_docs)]

use dampf_core::controller::ButtonEvent;
use dampf_core::display::Frame;
use dampf_core::eeprom::IMAGE_LEN;
use dampf_core::mode::Mode;
use dampf_core::setpoint::Settings;
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

pub mod buttons;
pub mod control;
pub mod display;
pub mod eeprom;

/// What the display task should render next.
#[derive(Clone, Copy)]
pub enum DisplayUpdate {
    /// Replace the frame.
    Frame(Frame),
    /// Slide the frame in glyph by glyph (mode titles, farewells).
    Slide(Frame),
    /// Run the fire animation until the next update.
    Fire,
    /// Blank the panel.
    Off,
}

/// Settings image decoded from the EEPROM at boot.
pub static SETTINGS_LOADED_SIG: Signal<ThreadModeRawMutex, (Settings, Mode)> = Signal::new();

/// Requests a persistent store of the given image.
pub static STORE_PERSISTENT_SIG: Signal<ThreadModeRawMutex, [u8; IMAGE_LEN]> = Signal::new();

/// Latest display update.
pub static DISPLAY_SIG: Signal<ThreadModeRawMutex, DisplayUpdate> = Signal::new();

/// Pad events from the button driver to the control loop.
pub static BUTTON_EVENTS: Channel<ThreadModeRawMutex, ButtonEvent, 8> = Channel::new();
