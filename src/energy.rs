// Energy accounting for the supercap bank

use libm::fabsf;

use crate::config::{control, rates, supercap};
use crate::model::Measurements;

/// Energy stored in the bank at `voltage`, E = ½·C·V² [J]
///
/// Recomputed from the live reading every tick; no integration.
pub fn stored_energy(voltage: f32) -> f32 {
    0.5 * supercap::CAPACITANCE * voltage * voltage
}

/// Battery-side input power [W]
pub fn input_power(m: &Measurements) -> f32 {
    m.battery_voltage * m.charge_current
}

/// Load-side output power [W]
pub fn output_power(m: &Measurements) -> f32 {
    m.output_voltage * m.discharge_current
}

/// Energy captured from back-EMF during one control tick [J]
///
/// Simplified model: recovery voltage is proportional to the back-EMF
/// current, so the captured power grows with I².
pub fn recovered_energy_per_tick(back_emf_current: f32) -> f32 {
    let current = fabsf(back_emf_current);
    let recovery_voltage = current * control::BACK_EMF_VOLTAGE_PER_AMP;
    recovery_voltage * current / rates::CONTROL_LOOP_FREQ_HZ as f32
}
