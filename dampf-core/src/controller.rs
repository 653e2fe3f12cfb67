//! The control loop: sequences the estimator, synthesizer, gate, editor and
//! lifecycle at their rates.
//!
//! One [`Controller`] owns every runtime field. The firmware calls
//! [`Controller::step`] from its polling task and applies the returned
//! commands to hardware before the next call, which is what makes the
//! disarm-before-re-arm ordering hold.

use crate::battery::VoltageEstimator;
use crate::display::{self, Frame};
use crate::eeprom;
use crate::gate::{Debounce, FireGate};
use crate::lifecycle::{IdleTimer, Puzzle, PuzzleKind, PuzzleVerdict, SleepReason};
use crate::mode::{Mode, ModeSelector};
use crate::regulate::DutySynthesizer;
use crate::setpoint::{self, Settings, StepDir};
use crate::{BATTERY_MIN_MV, VALUES_UPDATE_INTERVAL_MS};

/// Two fire clicks this close together count as a double click.
const DOUBLE_CLICK_MS: u32 = 400;
/// Peek display alternation period.
#[cfg(feature = "percentage-toggling")]
const PEEK_TOGGLE_MS: u32 = 1000;

/// Buttons of the editor pad. The fire button has its own line and never
/// appears here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Button {
    /// Set-point increment.
    Up,
    /// Set-point decrement.
    Down,
    /// Mode selector.
    Mode,
}

/// Events from the pad button driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonEvent {
    /// Debounced press-and-release.
    Short(Button),
    /// Long-press threshold crossed while still held.
    Long(Button),
    /// Auto-repeat while held past the long-press threshold.
    Repeat(Button),
    /// Two presses in quick succession.
    Double(Button),
    /// Released after a long press.
    Released(Button),
}

/// Everything the firmware feeds into one control-loop step.
#[derive(Clone, Copy, Debug)]
pub struct Inputs {
    /// Monotonic milliseconds, wrapping.
    pub now_ms: u32,
    /// Raw fire-button line level, pressed = true.
    pub fire_pressed: bool,
    /// Latest band-gap conversion (10 bit).
    pub adc_code: u16,
    /// At most one pad event per step.
    pub event: Option<ButtonEvent>,
}

/// MOSFET command for this step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MosfetDrive {
    /// Gate low, PWM disabled.
    Off,
    /// PWM with the given 10 bit duty word.
    Duty(u16),
    /// Gate held high (Hell mode).
    On,
}

/// Lifecycle transition requested by a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// Persist the settings image and park; the reason selects the farewell
    /// slide.
    EnterSleep(SleepReason),
    /// Left sleep through the wake gesture.
    Wake,
}

/// What the firmware must apply after one step.
#[derive(Clone, Copy, Debug)]
pub struct Outputs {
    /// MOSFET command; applied before anything else.
    pub mosfet: MosfetDrive,
    /// New display frame, when it changed this step.
    pub frame: Option<Frame>,
    /// The frame is a title and slides in glyph by glyph.
    pub slide: bool,
    /// True while the gate is armed; drives the fire animation.
    pub firing: bool,
    /// Lifecycle transition, if any.
    pub action: Option<Action>,
}

impl Outputs {
    /// A step with no output changes.
    const fn quiet() -> Self {
        Self {
            mosfet: MosfetDrive::Off,
            frame: None,
            slide: false,
            firing: false,
            action: None,
        }
    }
}

/// Fire clicks derived from the debounced line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Click {
    /// No new press committed.
    None,
    /// One press committed.
    Single,
    /// A press committed close after the previous one.
    Double,
}

/// Fire-button click bookkeeping for the sleep/wake gestures.
struct ClickTracker {
    /// Dedicated debouncer (the gate owns its own).
    debounce: Debounce,
    /// Committed level at the previous poll.
    last_stable: bool,
    /// When the previous click committed.
    last_click_at: Option<u32>,
}

impl ClickTracker {
    const fn new() -> Self {
        Self {
            debounce: Debounce::new(),
            last_stable: false,
            last_click_at: None,
        }
    }

    /// Feed the raw line; reports a click on each committed press edge.
    fn poll(&mut self, now_ms: u32, raw: bool) -> Click {
        let stable = self.debounce.poll(now_ms, raw);
        let press_edge = stable && !self.last_stable;
        self.last_stable = stable;
        if !press_edge {
            return Click::None;
        }

        let double = match self.last_click_at {
            Some(at) => now_ms.wrapping_sub(at) <= DOUBLE_CLICK_MS,
            None => false,
        };
        if double {
            self.last_click_at = None;
            Click::Double
        } else {
            self.last_click_at = Some(now_ms);
            Click::Single
        }
    }

    /// Forget the double-click history across lifecycle transitions, so the
    /// last click of a committed gesture cannot pair with the next press.
    fn clear_history(&mut self) {
        self.last_click_at = None;
    }
}

/// The controller aggregate.
pub struct Controller {
    /// User set-points.
    settings: Settings,
    /// Mode selection with per-cluster memory.
    selector: ModeSelector,
    /// Battery rail estimator.
    battery: VoltageEstimator,
    /// Duty synthesizer.
    synth: DutySynthesizer,
    /// Fire gate.
    gate: FireGate,
    /// Standby bookkeeping.
    idle: IdleTimer,
    /// Fire-click bookkeeping for the gestures.
    clicks: ClickTracker,
    /// Open gesture window, if any.
    puzzle: Option<Puzzle>,
    /// Lifecycle flag; sleep steps only run the wake gesture.
    sleeping: bool,
    /// Filtered rail in mV.
    voltage_mv: u16,
    /// Inferred IR drop in mV.
    drop_mv: u16,
    /// Filtered duty word.
    pwm: u16,
    /// When values were last refreshed.
    values_update_at: u32,
    /// Voltage peek active (mode button held).
    peek: bool,
    /// When the peek opened; drives the percent/millivolt alternation.
    #[cfg(feature = "percentage-toggling")]
    peek_since: u32,
}

impl Controller {
    /// Build from the persisted image contents.
    pub fn new(settings: Settings, last_fire_mode: Mode) -> Self {
        Self {
            settings,
            selector: ModeSelector::new(last_fire_mode),
            battery: VoltageEstimator::new(),
            synth: DutySynthesizer::new(),
            gate: FireGate::new(),
            idle: IdleTimer::new(),
            clicks: ClickTracker::new(),
            puzzle: None,
            sleeping: false,
            voltage_mv: 0,
            drop_mv: 0,
            pwm: 0,
            values_update_at: 0,
            peek: false,
            #[cfg(feature = "percentage-toggling")]
            peek_since: 0,
        }
    }

    /// Lifecycle flag.
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// True while a gesture window is counting. The firmware keeps polling
    /// at full rate instead of parking while this holds.
    pub fn puzzle_pending(&self) -> bool {
        self.puzzle.is_some()
    }

    /// Current set-points.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The active mode.
    pub fn mode(&self) -> Mode {
        self.selector.mode()
    }

    /// True while a settings-cluster mode is shown.
    pub fn settings_mode(&self) -> bool {
        self.selector.settings_mode()
    }

    /// Filtered rail in mV.
    pub fn voltage_mv(&self) -> u16 {
        self.voltage_mv
    }

    /// Inferred IR drop in mV.
    pub fn voltage_drop_mv(&self) -> u16 {
        self.drop_mv
    }

    /// The EEPROM image of the current user-visible state.
    pub fn persist_image(&self) -> [u8; eeprom::IMAGE_LEN] {
        eeprom::encode(&self.settings, self.selector.last_fire_mode())
    }

    /// One control-loop iteration.
    pub fn step(&mut self, input: &Inputs) -> Outputs {
        if self.sleeping {
            return self.sleep_step(input);
        }

        let mut out = Outputs::quiet();

        // A stale sleep-gesture window closes without consequence.
        if let Some(puzzle) = &self.puzzle {
            if puzzle.expired(input.now_ms) {
                self.puzzle = None;
                out.frame = Some(self.main_frame());
            }
        }

        // Fire clicks feed the sleep gesture.
        match self.clicks.poll(input.now_ms, input.fire_pressed) {
            Click::Double if self.puzzle.is_none() => {
                self.puzzle = Some(Puzzle::open(PuzzleKind::Sleep, input.now_ms));
                self.idle.touch(input.now_ms);
                out.frame = Some(display::puzzle_frame(1));
            }
            Click::Single | Click::Double => {
                if let Some(puzzle) = self.puzzle.as_mut() {
                    self.idle.touch(input.now_ms);
                    match puzzle.press(input.now_ms) {
                        PuzzleVerdict::Commit => {
                            return self.commit_sleep(SleepReason::Gesture, out);
                        }
                        PuzzleVerdict::Pending(count) => {
                            out.frame = Some(display::puzzle_frame(count));
                        }
                    }
                }
            }
            Click::None => {}
        }

        if let Some(event) = input.event {
            self.handle_pad(event, input.now_ms, &mut out);
        }

        // Periodic measurement, synthesis and main screen refresh.
        if input
            .now_ms
            .wrapping_sub(self.values_update_at)
            >= VALUES_UPDATE_INTERVAL_MS
        {
            self.values_update_at = input.now_ms;
            self.battery.feed(input.adc_code, self.settings.vcc_const);
            self.voltage_mv = self.battery.read_mv();
            let mode = self.mode();
            let regulation =
                self.synth
                    .update(mode, &mut self.settings, self.voltage_mv, self.drop_mv);
            self.pwm = regulation.pwm;
            self.drop_mv = regulation.drop_mv;

            if self.peek {
                out.frame = Some(self.peek_frame(input.now_ms));
                out.slide = false;
            } else if !self.gate.is_armed() && self.puzzle.is_none() && out.frame.is_none() {
                out.frame = Some(self.main_frame());
            }
        }

        // Gate update. Clicks spent on an open gesture window never reach the
        // coil.
        let raw_for_gate = input.fire_pressed && self.puzzle.is_none();
        let can_arm = self.settings.ohm > 0.0 && self.voltage_mv >= BATTERY_MIN_MV;
        let allow_fire = self.gate.poll(input.now_ms, raw_for_gate, can_arm);

        out.firing = self.gate.is_armed();
        out.mosfet = if allow_fire {
            match self.mode() {
                Mode::VariVolt | Mode::VariWatt if self.pwm > 0 => MosfetDrive::Duty(self.pwm),
                Mode::Hell => MosfetDrive::On,
                _ => MosfetDrive::Off,
            }
        } else {
            MosfetDrive::Off
        };
        if out.firing {
            self.idle.touch(input.now_ms);
        }

        // Trips.
        if self.battery.is_primed() && self.voltage_mv < BATTERY_MIN_MV {
            return self.commit_sleep(SleepReason::LowBattery, out);
        }
        if self.idle.expired(input.now_ms) {
            return self.commit_sleep(SleepReason::Idle, out);
        }

        out
    }

    /// Step variant while asleep: only the wake gesture runs.
    fn sleep_step(&mut self, input: &Inputs) -> Outputs {
        let mut out = Outputs::quiet();

        if let Some(puzzle) = &self.puzzle {
            if puzzle.expired(input.now_ms) {
                // Window closed: stay asleep.
                self.puzzle = None;
            }
        }

        match self.clicks.poll(input.now_ms, input.fire_pressed) {
            Click::Single | Click::Double => match self.puzzle.as_mut() {
                None => {
                    self.puzzle = Some(Puzzle::open(PuzzleKind::Wake, input.now_ms));
                    out.frame = Some(display::puzzle_frame(1));
                }
                Some(puzzle) => match puzzle.press(input.now_ms) {
                    PuzzleVerdict::Commit => return self.wake(input.now_ms),
                    PuzzleVerdict::Pending(count) => {
                        out.frame = Some(display::puzzle_frame(count));
                    }
                },
            },
            Click::None => {}
        }

        out
    }

    /// Editor pad handling.
    fn handle_pad(&mut self, event: ButtonEvent, now_ms: u32, out: &mut Outputs) {
        match event {
            ButtonEvent::Short(Button::Mode) => {
                self.selector.advance();
                self.idle.touch(now_ms);
                out.frame = Some(display::title_frame(self.mode()));
                out.slide = true;
            }
            ButtonEvent::Double(Button::Mode) => {
                self.selector.toggle_cluster();
                self.idle.touch(now_ms);
                out.frame = Some(display::title_frame(self.mode()));
                out.slide = true;
            }
            ButtonEvent::Long(Button::Mode) => {
                self.peek = true;
                #[cfg(feature = "percentage-toggling")]
                {
                    self.peek_since = now_ms;
                }
                self.idle.touch(now_ms);
                out.frame = Some(self.peek_frame(now_ms));
            }
            ButtonEvent::Released(Button::Mode) => {
                if self.peek {
                    self.peek = false;
                    out.frame = Some(self.main_frame());
                }
            }
            ButtonEvent::Short(button) | ButtonEvent::Repeat(button) => {
                let dir = match button {
                    Button::Up => Some(StepDir::Up),
                    Button::Down => Some(StepDir::Down),
                    Button::Mode => None,
                };
                if let Some(dir) = dir {
                    let mode = self.mode();
                    setpoint::apply_step(&mut self.settings, mode, dir, self.voltage_mv);
                    self.idle.touch(now_ms);
                    out.frame = Some(self.main_frame());
                }
            }
            ButtonEvent::Long(_) | ButtonEvent::Double(_) | ButtonEvent::Released(_) => {}
        }
    }

    /// Sleep transition: one disarm, then the firmware persists and parks.
    fn commit_sleep(&mut self, reason: SleepReason, mut out: Outputs) -> Outputs {
        self.gate.disarm();
        self.puzzle = None;
        self.peek = false;
        self.clicks.clear_history();
        self.sleeping = true;
        out.mosfet = MosfetDrive::Off;
        out.firing = false;
        out.frame = None;
        out.action = Some(Action::EnterSleep(reason));
        out
    }

    /// Wake transition: fresh measurements, fire cluster restored.
    fn wake(&mut self, now_ms: u32) -> Outputs {
        self.sleeping = false;
        self.puzzle = None;
        self.clicks.clear_history();
        self.battery.reset();
        self.synth.reset();
        self.voltage_mv = 0;
        self.drop_mv = 0;
        self.pwm = 0;
        self.selector.restore_fire_mode();
        self.idle.touch(now_ms);
        // Refresh values on the very next step.
        self.values_update_at = now_ms.wrapping_sub(VALUES_UPDATE_INTERVAL_MS);

        let mut out = Outputs::quiet();
        out.frame = Some(self.main_frame());
        out.action = Some(Action::Wake);
        out
    }

    /// The main screen for the active mode.
    fn main_frame(&self) -> Frame {
        display::value_frame(self.mode(), &self.settings)
    }

    /// Battery peek rendering, honoring the percentage features.
    #[cfg_attr(not(feature = "percentage-toggling"), allow(unused_variables))]
    fn peek_frame(&self, now_ms: u32) -> Frame {
        #[cfg(feature = "percentage-toggling")]
        let frame = if now_ms.wrapping_sub(self.peek_since) / PEEK_TOGGLE_MS % 2 == 1 {
            display::battery_volts_frame(self.voltage_mv)
        } else {
            display::battery_percent_frame(self.voltage_mv)
        };
        #[cfg(all(feature = "battery-percentage", not(feature = "percentage-toggling")))]
        let frame = display::battery_percent_frame(self.voltage_mv);
        #[cfg(not(feature = "battery-percentage"))]
        let frame = display::battery_volts_frame(self.voltage_mv);

        frame
    }
}
