//! The up/down/mode pad driver: debounce, long press and auto-repeat.
//!
//! The fire button is not handled here; its debounce belongs to the fire
//! gate in `dampf-core`, which owns the safety timing.

use dampf_core::controller::{Button, ButtonEvent};
use defmt::debug;
use embassy_stm32::gpio::Input;
use embassy_time::{Duration, Instant, Ticker};

use crate::BUTTON_EVENTS;

/// Hold time before a press registers at all.
const SHORT_PRESS: Duration = Duration::from_millis(25);
/// Hold time that turns a press into a long press.
const LONG_PRESS: Duration = Duration::from_millis(500);
/// Repeat period while held past the long-press threshold.
const REPEAT: Duration = Duration::from_millis(100);
/// Two short presses this close together form a double press.
const DOUBLE_PRESS: Duration = Duration::from_millis(400);

/// Resources for the three pad buttons (active low, internal pull-ups).
pub struct ButtonResources {
    /// Set-point increment.
    pub pin_up: Input<'static>,
    /// Set-point decrement.
    pub pin_down: Input<'static>,
    /// Mode selector.
    pub pin_mode: Input<'static>,
}

/// Press tracking state of one button.
#[derive(Clone, Copy)]
enum SwitchState {
    /// Button is up.
    Released,
    /// Pressed since the recorded instant; short or long is still open.
    Pressed(Instant),
    /// Held past the long-press threshold; repeats fire from here.
    Held(Instant),
}

/// One pad button with its event logic.
struct PadButton {
    /// Which button this is.
    id: Button,
    /// Up/down auto-repeat; the mode button emits Long/Released instead.
    repeats: bool,
    /// Press state.
    state: SwitchState,
    /// A short press waiting to see whether a double press follows.
    pending_short: Option<Instant>,
    /// When the last short press was released.
    last_short: Option<Instant>,
}

impl PadButton {
    const fn new(id: Button, repeats: bool) -> Self {
        Self {
            id,
            repeats,
            state: SwitchState::Released,
            pending_short: None,
            last_short: None,
        }
    }

    /// Advance by one tick; emits at most one event.
    fn tick(&mut self, now: Instant, pressed: bool) -> Option<ButtonEvent> {
        match self.state {
            SwitchState::Released => {
                if let Some(at) = self.pending_short {
                    if !pressed && now.duration_since(at) >= DOUBLE_PRESS {
                        self.pending_short = None;
                        return Some(ButtonEvent::Short(self.id));
                    }
                }
                if pressed {
                    self.state = SwitchState::Pressed(now);
                }
                None
            }
            SwitchState::Pressed(since) => {
                let held = now.duration_since(since);
                if !pressed {
                    self.state = SwitchState::Released;
                    if held < SHORT_PRESS {
                        // Contact bounce.
                        return None;
                    }
                    return match self.id {
                        // The mode button waits for a possible double press.
                        Button::Mode => {
                            if let Some(last) = self.last_short {
                                if now.duration_since(last) <= DOUBLE_PRESS {
                                    self.last_short = None;
                                    self.pending_short = None;
                                    return Some(ButtonEvent::Double(self.id));
                                }
                            }
                            self.last_short = Some(now);
                            self.pending_short = Some(now);
                            None
                        }
                        _ => Some(ButtonEvent::Short(self.id)),
                    };
                }
                if held >= LONG_PRESS {
                    // A long press supersedes any half-finished double press.
                    self.pending_short = None;
                    self.last_short = None;
                    self.state = SwitchState::Held(now);
                    return Some(if self.repeats {
                        ButtonEvent::Repeat(self.id)
                    } else {
                        ButtonEvent::Long(self.id)
                    });
                }
                None
            }
            SwitchState::Held(last) => {
                if !pressed {
                    self.state = SwitchState::Released;
                    return (!self.repeats).then_some(ButtonEvent::Released(self.id));
                }
                if self.repeats && now.duration_since(last) >= REPEAT {
                    self.state = SwitchState::Held(now);
                    return Some(ButtonEvent::Repeat(self.id));
                }
                None
            }
        }
    }
}

/// Reads the pad buttons and feeds the control loop.
#[embassy_executor::task]
pub async fn button_task(resources: ButtonResources) {
    let mut up = PadButton::new(Button::Up, true);
    let mut down = PadButton::new(Button::Down, true);
    let mut mode = PadButton::new(Button::Mode, false);

    let mut ticker = Ticker::every(Duration::from_millis(1));

    loop {
        let now = Instant::now();
        for (button, pin) in [
            (&mut up, &resources.pin_up),
            (&mut down, &resources.pin_down),
            (&mut mode, &resources.pin_mode),
        ] {
            if let Some(event) = button.tick(now, pin.is_low()) {
                debug!("Pad event {}", event);
                // A full queue means the control loop lags far behind human
                // input; dropping is harmless.
                let _ = BUTTON_EVENTS.try_send(event);
            }
        }
        ticker.next().await;
    }
}
