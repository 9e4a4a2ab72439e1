// CC-CV charging law

use crate::config::{control, limits, supercap};
use crate::model::{Actuation, Measurements};

use super::proportional_step;

/// CC-CV current target for the bank voltage, before the power cap
///
/// Full `MAX_CHARGE_CURRENT` while the gap to the rated voltage is at least
/// `CV_TAPER_VOLTAGE`, then linear taper down to zero at the rated voltage.
pub fn target_current(supercap_voltage: f32) -> f32 {
    let gap = supercap::RATED_VOLTAGE - supercap_voltage;
    if gap >= control::CV_TAPER_VOLTAGE {
        limits::MAX_CHARGE_CURRENT
    } else if gap > 0.0 {
        limits::MAX_CHARGE_CURRENT * gap / control::CV_TAPER_VOLTAGE
    } else {
        0.0
    }
}

/// Current the battery may source within `power_limit`
pub fn power_cap(power_limit: f32, battery_voltage: f32) -> f32 {
    if battery_voltage > 0.0 {
        power_limit / battery_voltage
    } else {
        0.0
    }
}

/// Charging target after the power cap
pub fn capped_target(m: &Measurements, power_limit: f32) -> f32 {
    let target = target_current(m.supercap_voltage);
    let cap = power_cap(power_limit, m.battery_voltage);
    if target > cap {
        cap
    } else {
        target
    }
}

/// One tick of the charging law
pub fn step(prev_duty: f32, m: &Measurements, power_limit: f32) -> Actuation {
    let target = capped_target(m, power_limit);
    Actuation::charge(proportional_step(prev_duty, target, m.charge_current))
}
