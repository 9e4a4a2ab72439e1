//! System data model
//!
//! Measurement snapshot, operating mode, error bitmask and the single
//! `SystemState` instance owned by the controller.

use core::ops::{BitOr, BitOrAssign};

use crate::config::{control, limits};

/// Operating mode of the buffer
///
/// Discriminants are the wire values reported in the status packet.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Init = 0,
    Charging = 1,
    Discharging = 2,
    Idle = 3,
    BackEmfRecovery = 4,
    Error = 5,
    Protect = 6,
}

impl Mode {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Mode::Init),
            1 => Some(Mode::Charging),
            2 => Some(Mode::Discharging),
            3 => Some(Mode::Idle),
            4 => Some(Mode::BackEmfRecovery),
            5 => Some(Mode::Error),
            6 => Some(Mode::Protect),
            _ => None,
        }
    }

    /// Sticky fault modes, left only through an explicit error clear
    pub const fn is_fault(self) -> bool {
        matches!(self, Mode::Error | Mode::Protect)
    }

    /// Modes that run a control law
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Mode::Charging | Mode::Discharging | Mode::BackEmfRecovery
        )
    }
}

/// Independent fault bits, OR'd together every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    pub const NONE: Self = Self(0x00);
    pub const OVERVOLTAGE: Self = Self(0x01);
    pub const UNDERVOLTAGE: Self = Self(0x02);
    pub const OVERCURRENT: Self = Self(0x04);
    pub const OVERTEMP: Self = Self(0x08);
    pub const COMM_LOSS: Self = Self(0x10);
    pub const SENSOR_FAULT: Self = Self(0x20);
    pub const BACK_EMF_FAULT: Self = Self(0x40);

    const ALL: u8 = 0x7F;

    /// Build from a raw byte, dropping undefined bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, flag: Self, active: bool) {
        if active {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl BitOr for ErrorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ErrorFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One tick's sensor readings, SI units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurements {
    /// Supercap bank voltage [V]
    pub supercap_voltage: f32,
    /// Battery voltage [V]
    pub battery_voltage: f32,
    /// Output (load side) voltage [V]
    pub output_voltage: f32,
    /// Charge current into the bank [A]
    pub charge_current: f32,
    /// Discharge current out of the bank [A]
    pub discharge_current: f32,
    /// Back-EMF current from the motors [A], signed
    pub back_emf_current: f32,
    /// Board temperature [°C]
    pub temperature: f32,
}

impl Measurements {
    pub const ZERO: Self = Self {
        supercap_voltage: 0.0,
        battery_voltage: 0.0,
        output_voltage: 0.0,
        charge_current: 0.0,
        discharge_current: 0.0,
        back_emf_current: 0.0,
        temperature: 0.0,
    };

    pub fn is_finite(&self) -> bool {
        self.supercap_voltage.is_finite()
            && self.battery_voltage.is_finite()
            && self.output_voltage.is_finite()
            && self.charge_current.is_finite()
            && self.discharge_current.is_finite()
            && self.back_emf_current.is_finite()
            && self.temperature.is_finite()
    }
}

/// Command handed to the power stage every tick
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Actuation {
    /// Duty cycle, always within `0.0..=MAX_DUTY`
    pub duty_cycle: f32,
    pub charge_enable: bool,
    pub discharge_enable: bool,
}

impl Actuation {
    /// Both paths disabled, zero duty
    pub const OFF: Self = Self {
        duty_cycle: 0.0,
        charge_enable: false,
        discharge_enable: false,
    };

    pub fn charge(duty_cycle: f32) -> Self {
        Self {
            duty_cycle: clamp_duty(duty_cycle),
            charge_enable: true,
            discharge_enable: false,
        }
    }

    pub fn discharge(duty_cycle: f32) -> Self {
        Self {
            duty_cycle: clamp_duty(duty_cycle),
            charge_enable: false,
            discharge_enable: true,
        }
    }

    pub fn is_off(&self) -> bool {
        self.duty_cycle == 0.0 && !self.charge_enable && !self.discharge_enable
    }
}

/// Clamp a duty cycle into `0.0..=MAX_DUTY`; NaN maps to zero.
pub fn clamp_duty(duty: f32) -> f32 {
    if duty.is_nan() {
        0.0
    } else {
        duty.clamp(0.0, control::MAX_DUTY)
    }
}

/// The single system state, written only from the control tick
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemState {
    pub measurements: Measurements,

    /// Battery-side input power [W]
    pub input_power: f32,
    /// Load-side output power [W]
    pub output_power: f32,
    /// Energy currently stored in the bank [J]
    pub energy_stored: f32,
    /// Lifetime energy captured from back-EMF [J]
    pub energy_recovered: f32,

    /// Operator power limit [W], within `(0, MAX_POWER_LIMIT]`
    pub power_limit: f32,
    pub duty_cycle: f32,
    pub charge_enable: bool,
    pub discharge_enable: bool,
    pub back_emf_recovery_enable: bool,

    pub mode: Mode,
    pub error_flags: ErrorFlags,
    pub runtime_seconds: u32,
}

impl SystemState {
    pub const fn new() -> Self {
        Self {
            measurements: Measurements::ZERO,
            input_power: 0.0,
            output_power: 0.0,
            energy_stored: 0.0,
            energy_recovered: 0.0,
            power_limit: limits::DEFAULT_POWER_LIMIT,
            duty_cycle: 0.0,
            charge_enable: false,
            discharge_enable: false,
            back_emf_recovery_enable: true,
            mode: Mode::Init,
            error_flags: ErrorFlags::NONE,
            runtime_seconds: 0,
        }
    }

    pub fn actuation(&self) -> Actuation {
        Actuation {
            duty_cycle: self.duty_cycle,
            charge_enable: self.charge_enable,
            discharge_enable: self.discharge_enable,
        }
    }

    pub(crate) fn set_actuation(&mut self, actuation: Actuation) {
        self.duty_cycle = actuation.duty_cycle;
        self.charge_enable = actuation.charge_enable;
        self.discharge_enable = actuation.discharge_enable;
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_wire_values() {
        assert_eq!(Mode::Init.as_u8(), 0);
        assert_eq!(Mode::Idle.as_u8(), 3);
        assert_eq!(Mode::Protect.as_u8(), 6);
        for raw in 0..=6u8 {
            assert_eq!(Mode::from_u8(raw).map(Mode::as_u8), Some(raw));
        }
        assert_eq!(Mode::from_u8(7), None);
    }

    #[test]
    fn test_mode_classes() {
        for raw in 0..=6u8 {
            let mode = Mode::from_u8(raw).unwrap();
            // 各モードは高々1つの分類に属する
            assert!(!(mode.is_active() && mode.is_fault()));
        }
        assert!(Mode::Charging.is_active());
        assert!(Mode::BackEmfRecovery.is_active());
        assert!(!Mode::Idle.is_active());
        assert!(!Mode::Init.is_fault());
        assert!(Mode::Protect.is_fault());
    }

    #[test]
    fn test_error_flags_combine() {
        let mut flags = ErrorFlags::NONE;
        assert!(flags.is_empty());

        flags |= ErrorFlags::OVERVOLTAGE;
        flags |= ErrorFlags::COMM_LOSS;
        assert_eq!(flags.bits(), 0x11);
        assert!(flags.contains(ErrorFlags::COMM_LOSS));
        assert!(!flags.contains(ErrorFlags::OVERTEMP));

        flags.set(ErrorFlags::OVERVOLTAGE, false);
        assert_eq!(flags, ErrorFlags::COMM_LOSS);
        assert_eq!(ErrorFlags::from_bits(0xFF).bits(), 0x7F);
    }

    #[test]
    fn test_actuation_clamps_duty() {
        assert_eq!(Actuation::charge(1.5).duty_cycle, control::MAX_DUTY);
        assert_eq!(Actuation::discharge(-0.2).duty_cycle, 0.0);
        assert_eq!(Actuation::charge(f32::NAN).duty_cycle, 0.0);
        assert!(Actuation::OFF.is_off());
    }

    #[test]
    fn test_initial_state() {
        let state = SystemState::new();
        assert_eq!(state.mode, Mode::Init);
        assert_eq!(state.power_limit, limits::DEFAULT_POWER_LIMIT);
        assert!(state.back_emf_recovery_enable);
        assert!(!state.charge_enable && !state.discharge_enable);
        assert_eq!(state.energy_recovered, 0.0);
    }
}
