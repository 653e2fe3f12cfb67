//! Fire and settings mode selection.

/// Regulation policy or settings page the device is showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Constant output voltage.
    VariVolt,
    /// Constant output power.
    VariWatt,
    /// Unregulated: MOSFET fully on while firing.
    Hell,
    /// Maximum cell discharge current in A.
    Amp,
    /// Coil resistance in Ω.
    Ohm,
    /// Battery internal resistance in Ω.
    BattRes,
    /// Band-gap calibration constant.
    VccConst,
}

/// The two groups modes cycle within.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Cluster {
    /// Modes that drive the coil.
    Fire,
    /// Configuration pages.
    Settings,
}

impl Mode {
    /// The cluster this mode belongs to.
    pub const fn cluster(self) -> Cluster {
        match self {
            Mode::VariVolt | Mode::VariWatt | Mode::Hell => Cluster::Fire,
            Mode::Amp | Mode::Ohm | Mode::BattRes | Mode::VccConst => Cluster::Settings,
        }
    }

    /// Stable tag used in the EEPROM image and the glyph tables.
    pub const fn as_index(self) -> u8 {
        match self {
            Mode::VariVolt => 0,
            Mode::VariWatt => 1,
            Mode::Hell => 2,
            Mode::Amp => 3,
            Mode::Ohm => 4,
            Mode::BattRes => 5,
            Mode::VccConst => 6,
        }
    }

    /// Inverse of [`Mode::as_index`].
    pub const fn from_index(index: u8) -> Option<Mode> {
        match index {
            0 => Some(Mode::VariVolt),
            1 => Some(Mode::VariWatt),
            2 => Some(Mode::Hell),
            3 => Some(Mode::Amp),
            4 => Some(Mode::Ohm),
            5 => Some(Mode::BattRes),
            6 => Some(Mode::VccConst),
            _ => None,
        }
    }
}

/// The next mode within the same cluster, wrapping at the end.
pub const fn next_in_cluster(mode: Mode) -> Mode {
    match mode {
        Mode::VariVolt => Mode::VariWatt,
        Mode::VariWatt => Mode::Hell,
        Mode::Hell => Mode::VariVolt,
        Mode::Amp => Mode::Ohm,
        Mode::Ohm => Mode::BattRes,
        Mode::BattRes => Mode::VccConst,
        Mode::VccConst => Mode::Amp,
    }
}

/// Tracks the active mode and the last selection of each cluster.
pub struct ModeSelector {
    /// Active mode.
    mode: Mode,
    /// Last mode shown in the fire cluster.
    last_fire: Mode,
    /// Last mode shown in the settings cluster.
    last_settings: Mode,
}

impl ModeSelector {
    /// Start in the fire cluster on the given (persisted) mode.
    ///
    /// A settings mode from a corrupt image falls back to VariVolt.
    pub fn new(initial: Mode) -> Self {
        let fire = match initial.cluster() {
            Cluster::Fire => initial,
            Cluster::Settings => Mode::VariVolt,
        };
        Self {
            mode: fire,
            last_fire: fire,
            last_settings: Mode::Amp,
        }
    }

    /// The active mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// True while a settings-cluster mode is shown.
    pub fn settings_mode(&self) -> bool {
        matches!(self.mode.cluster(), Cluster::Settings)
    }

    /// The fire-cluster mode that firing would use (persisted on sleep).
    pub fn last_fire_mode(&self) -> Mode {
        self.last_fire
    }

    /// Advance within the current cluster.
    pub fn advance(&mut self) {
        self.mode = next_in_cluster(self.mode);
        self.remember();
    }

    /// Switch clusters, restoring the remembered mode of the other one.
    pub fn toggle_cluster(&mut self) {
        self.mode = match self.mode.cluster() {
            Cluster::Fire => self.last_settings,
            Cluster::Settings => self.last_fire,
        };
    }

    /// Return to the remembered fire mode (wake path).
    pub fn restore_fire_mode(&mut self) {
        self.mode = self.last_fire;
    }

    /// Record the active mode as the cluster's memory.
    fn remember(&mut self) {
        match self.mode.cluster() {
            Cluster::Fire => self.last_fire = self.mode,
            Cluster::Settings => self.last_settings = self.mode,
        }
    }
}
