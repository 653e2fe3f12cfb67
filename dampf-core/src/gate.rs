//! Fire-button debounce and the arm/disarm state machine.

use crate::{DEBOUNCE_MS, FIRE_LIMIT_MS};

/// Timestamp debouncer: commits a level only after it held for the debounce
/// time.
#[derive(Clone, Copy, Debug)]
pub struct Debounce {
    /// Last raw level observed.
    raw: bool,
    /// When the raw level last changed.
    changed_at: u32,
    /// Committed level.
    stable: bool,
}

impl Debounce {
    /// A debouncer resting at the released level.
    pub const fn new() -> Self {
        Self {
            raw: false,
            changed_at: 0,
            stable: false,
        }
    }

    /// Feed the raw level at `now_ms`; returns the committed level.
    pub fn poll(&mut self, now_ms: u32, raw: bool) -> bool {
        if raw != self.raw {
            self.raw = raw;
            self.changed_at = now_ms;
        }
        if self.raw != self.stable && now_ms.wrapping_sub(self.changed_at) >= DEBOUNCE_MS {
            self.stable = self.raw;
        }
        self.stable
    }
}

impl Default for Debounce {
    fn default() -> Self {
        Self::new()
    }
}

/// Arm state of the output stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GateState {
    /// Waiting for a press.
    Idle,
    /// Output enabled, burn timer running.
    Armed,
    /// Burn limit hit; the button must be released before re-arming.
    Cooldown,
}

/// The debounced fire gate with burn timeout.
///
/// `allow_fire` is the single source of truth for the output stage: whenever
/// it is false the caller drives the MOSFET low and disables PWM before doing
/// anything else.
pub struct FireGate {
    /// Fire-line debouncer.
    debounce: Debounce,
    /// Arm state.
    state: GateState,
    /// When the current burn started.
    burn_start: u32,
    /// Gate output.
    allow_fire: bool,
}

impl FireGate {
    /// A disarmed gate.
    pub const fn new() -> Self {
        Self {
            debounce: Debounce::new(),
            state: GateState::Idle,
            burn_start: 0,
            allow_fire: false,
        }
    }

    /// State machine update; returns `allow_fire`.
    ///
    /// `can_arm` is the safety guard: a coil must be attached and the rail
    /// must be above the low-battery threshold.
    pub fn poll(&mut self, now_ms: u32, raw_pressed: bool, can_arm: bool) -> bool {
        let pressed = self.debounce.poll(now_ms, raw_pressed);

        match self.state {
            GateState::Idle => {
                if pressed && can_arm {
                    self.burn_start = now_ms;
                    self.allow_fire = true;
                    self.state = GateState::Armed;
                }
            }
            GateState::Armed => {
                if !pressed {
                    self.disarm();
                } else if now_ms.wrapping_sub(self.burn_start) >= FIRE_LIMIT_MS {
                    self.disarm();
                    self.state = GateState::Cooldown;
                }
            }
            GateState::Cooldown => {
                if !pressed {
                    self.state = GateState::Idle;
                }
            }
        }

        self.allow_fire
    }

    /// The single disarm primitive: clears `allow_fire` so the caller's next
    /// output mapping drops PWM and the MOSFET line.
    pub fn disarm(&mut self) {
        self.allow_fire = false;
        if matches!(self.state, GateState::Armed) {
            self.state = GateState::Idle;
        }
    }

    /// Gate output.
    pub fn allow_fire(&self) -> bool {
        self.allow_fire
    }

    /// True while the burn timer runs.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, GateState::Armed)
    }

    /// Current arm state.
    pub fn state(&self) -> GateState {
        self.state
    }
}

impl Default for FireGate {
    fn default() -> Self {
        Self::new()
    }
}
