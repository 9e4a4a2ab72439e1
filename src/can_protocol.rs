// CAN communication protocol between the supercap controller and the chassis

use libm::roundf;

use crate::model::{ErrorFlags, Mode};

/// CAN message IDs
pub mod can_ids {
    /// Chassis command (power limit: u16 x10 W, flags: u8, 8 bytes)
    pub const COMMAND: u32 = 0x210;

    /// Supercap status (voltages, output current, mode, flags, 8 bytes, 50 Hz)
    pub const STATUS: u32 = 0x211;

    /// Diagnostics (temperature, energy, runtime, 8 bytes, 1 Hz)
    pub const DIAGNOSTICS: u32 = 0x212;
}

/// Flag bits of the chassis command (byte 2)
pub mod command_flags {
    pub const CHARGE_ENABLE: u8 = 0x01;
    pub const DISCHARGE_ENABLE: u8 = 0x02;
    pub const BACK_EMF_ENABLE: u8 = 0x04;
    pub const RESET_ERRORS: u8 = 0x08;
}

/// Command packet length: power limit + flags + reserved
const COMMAND_LEN: usize = 8;

/// Supercap status packet
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SupercapStatus {
    pub supercap_voltage: f32,
    pub battery_voltage: f32,
    /// Discharge current delivered to the load [A]
    pub output_current: f32,
    pub mode: Mode,
    pub error_flags: ErrorFlags,
}

/// Diagnostics packet
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    pub temperature: f32,
    pub energy_stored: f32,
    pub energy_recovered: f32,
    pub runtime_minutes: u16,
}

/// Decoded chassis command
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChassisCommand {
    /// New power limit [W]; `None` when the raw field is zero (no change)
    pub power_limit: Option<f32>,
    pub charge_enable: bool,
    pub discharge_enable: bool,
    pub back_emf_enable: bool,
    /// One-shot error clear
    pub reset_errors: bool,
}

impl ChassisCommand {
    pub fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.charge_enable {
            flags |= command_flags::CHARGE_ENABLE;
        }
        if self.discharge_enable {
            flags |= command_flags::DISCHARGE_ENABLE;
        }
        if self.back_emf_enable {
            flags |= command_flags::BACK_EMF_ENABLE;
        }
        if self.reset_errors {
            flags |= command_flags::RESET_ERRORS;
        }
        flags
    }
}

// Float -> integer `as` casts saturate at the type bounds and map NaN to 0,
// so scaled fields never wrap.
fn scale_u16(value: f32, scale: f32) -> u16 {
    (value * scale) as u16
}

fn scale_i16(value: f32, scale: f32) -> i16 {
    (value * scale) as i16
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Encode supercap status into CAN data
///
/// # Returns
/// 8-byte array: Vcap x100, Vbat x100, Iout x100 (u16 LE), mode, flags
pub fn encode_status(status: &SupercapStatus) -> [u8; 8] {
    let mut data = [0u8; 8];

    data[0..2].copy_from_slice(&scale_u16(status.supercap_voltage, 100.0).to_le_bytes());
    data[2..4].copy_from_slice(&scale_u16(status.battery_voltage, 100.0).to_le_bytes());
    data[4..6].copy_from_slice(&scale_u16(status.output_current, 100.0).to_le_bytes());
    data[6] = status.mode.as_u8();
    data[7] = status.error_flags.bits();

    data
}

/// Decode supercap status from CAN data
///
/// # Returns
/// * `Some(SupercapStatus)` if parsing successful
/// * `None` if data length is incorrect or the mode byte is unknown
pub fn decode_status(data: &[u8]) -> Option<SupercapStatus> {
    if data.len() < 8 {
        error!("Status: invalid data length {}", data.len());
        return None;
    }

    let Some(mode) = Mode::from_u8(data[6]) else {
        error!("Status: unknown mode {}", data[6]);
        return None;
    };

    Some(SupercapStatus {
        supercap_voltage: read_u16(data, 0) as f32 / 100.0,
        battery_voltage: read_u16(data, 2) as f32 / 100.0,
        output_current: read_u16(data, 4) as f32 / 100.0,
        mode,
        error_flags: ErrorFlags::from_bits(data[7]),
    })
}

/// Encode diagnostics into CAN data
///
/// # Returns
/// 8-byte array: temperature x10 (i16), stored x10, recovered x10, runtime minutes (u16)
pub fn encode_diagnostics(diag: &Diagnostics) -> [u8; 8] {
    let mut data = [0u8; 8];

    data[0..2].copy_from_slice(&scale_i16(diag.temperature, 10.0).to_le_bytes());
    data[2..4].copy_from_slice(&scale_u16(diag.energy_stored, 10.0).to_le_bytes());
    data[4..6].copy_from_slice(&scale_u16(diag.energy_recovered, 10.0).to_le_bytes());
    data[6..8].copy_from_slice(&diag.runtime_minutes.to_le_bytes());

    data
}

/// Decode diagnostics from CAN data
pub fn decode_diagnostics(data: &[u8]) -> Option<Diagnostics> {
    if data.len() < 8 {
        error!("Diagnostics: invalid data length {}", data.len());
        return None;
    }

    Some(Diagnostics {
        temperature: i16::from_le_bytes([data[0], data[1]]) as f32 / 10.0,
        energy_stored: read_u16(data, 2) as f32 / 10.0,
        energy_recovered: read_u16(data, 4) as f32 / 10.0,
        runtime_minutes: read_u16(data, 6),
    })
}

/// Parse chassis command from CAN data
///
/// Reserved bytes 3-7 are ignored.
///
/// # Returns
/// * `Some(ChassisCommand)` if parsing successful
/// * `None` if data is shorter than the 8-byte packet
pub fn parse_command(data: &[u8]) -> Option<ChassisCommand> {
    if data.len() < COMMAND_LEN {
        error!("Command: invalid data length {}", data.len());
        return None;
    }

    let raw_limit = read_u16(data, 0);
    let flags = data[2];

    let command = ChassisCommand {
        power_limit: if raw_limit == 0 {
            None
        } else {
            Some(raw_limit as f32 / 10.0)
        },
        charge_enable: flags & command_flags::CHARGE_ENABLE != 0,
        discharge_enable: flags & command_flags::DISCHARGE_ENABLE != 0,
        back_emf_enable: flags & command_flags::BACK_EMF_ENABLE != 0,
        reset_errors: flags & command_flags::RESET_ERRORS != 0,
    };

    debug!("Command received: limit_raw={} flags={:#x}", raw_limit, flags);
    Some(command)
}

/// Encode chassis command into CAN data (consumer side)
pub fn encode_command(command: &ChassisCommand) -> [u8; 8] {
    let mut data = [0u8; 8];

    let raw_limit = match command.power_limit {
        Some(limit) => roundf(limit * 10.0) as u16,
        None => 0,
    };
    data[0..2].copy_from_slice(&raw_limit.to_le_bytes());
    data[2] = command.flags();

    data
}
