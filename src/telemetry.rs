//! Telemetry frames and their tick-driven schedule

use crate::can_protocol::{self, can_ids, Diagnostics, SupercapStatus};
use crate::config::rates;
use crate::model::SystemState;

/// Outbound CAN frame, standard ID and 8 data bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryFrame {
    pub id: u32,
    pub data: [u8; 8],
}

/// Frames due on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Due {
    pub status: bool,
    pub diagnostics: bool,
}

/// Counter-gated telemetry schedule driven from the control tick
#[derive(Debug, Clone, Copy)]
pub struct TelemetryScheduler {
    status_divider: u32,
    diagnostics_divider: u32,
    status_counter: u32,
    diagnostics_counter: u32,
}

impl TelemetryScheduler {
    pub const fn new(status_divider: u32, diagnostics_divider: u32) -> Self {
        Self {
            status_divider,
            diagnostics_divider,
            status_counter: 0,
            diagnostics_counter: 0,
        }
    }

    /// Advance one tick
    pub fn poll(&mut self) -> Due {
        let mut due = Due::default();

        self.status_counter += 1;
        if self.status_counter >= self.status_divider {
            self.status_counter = 0;
            due.status = true;
        }

        self.diagnostics_counter += 1;
        if self.diagnostics_counter >= self.diagnostics_divider {
            self.diagnostics_counter = 0;
            due.diagnostics = true;
        }

        due
    }
}

impl Default for TelemetryScheduler {
    fn default() -> Self {
        // 1000/50 = 20 ticks, 1000/1 = 1000 ticks
        Self::new(
            rates::CONTROL_LOOP_FREQ_HZ / rates::STATUS_TX_FREQ_HZ,
            rates::CONTROL_LOOP_FREQ_HZ / rates::DIAGNOSTIC_TX_FREQ_HZ,
        )
    }
}

pub fn status(state: &SystemState) -> SupercapStatus {
    SupercapStatus {
        supercap_voltage: state.measurements.supercap_voltage,
        battery_voltage: state.measurements.battery_voltage,
        output_current: state.measurements.discharge_current,
        mode: state.mode,
        error_flags: state.error_flags,
    }
}

pub fn diagnostics(state: &SystemState) -> Diagnostics {
    let minutes = state.runtime_seconds / 60;
    Diagnostics {
        temperature: state.measurements.temperature,
        energy_stored: state.energy_stored,
        energy_recovered: state.energy_recovered,
        runtime_minutes: minutes.min(u16::MAX as u32) as u16,
    }
}

pub fn status_frame(state: &SystemState) -> TelemetryFrame {
    TelemetryFrame {
        id: can_ids::STATUS,
        data: can_protocol::encode_status(&status(state)),
    }
}

pub fn diagnostics_frame(state: &SystemState) -> TelemetryFrame {
    TelemetryFrame {
        id: can_ids::DIAGNOSTICS,
        data: can_protocol::encode_diagnostics(&diagnostics(state)),
    }
}
