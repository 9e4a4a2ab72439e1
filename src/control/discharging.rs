// Power-limited discharging law

use crate::config::limits;
use crate::model::{Actuation, Measurements};

use super::proportional_step;

/// Discharge current target for the bank voltage
///
/// Power target is `min(power_limit, MAX_DISCHARGE_CURRENT * V)`, converted
/// back to current at the bank voltage.
pub fn target_current(power_limit: f32, supercap_voltage: f32) -> f32 {
    if supercap_voltage <= 0.0 {
        return 0.0;
    }
    let max_power = limits::MAX_DISCHARGE_CURRENT * supercap_voltage;
    let target_power = if power_limit < max_power {
        power_limit
    } else {
        max_power
    };
    target_power / supercap_voltage
}

/// One tick of the discharging law
pub fn step(prev_duty: f32, m: &Measurements, power_limit: f32) -> Actuation {
    let target = target_current(power_limit, m.supercap_voltage);
    Actuation::discharge(proportional_step(prev_duty, target, m.discharge_current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::control;

    #[test]
    fn test_target_follows_power_limit() {
        // 80 W at 16 V -> 5 A
        assert!((target_current(80.0, 16.0) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_target_capped_by_max_current() {
        // 200 W at 5 V would be 40 A, capped at 20 A
        assert!((target_current(200.0, 5.0) - 20.0).abs() < 1e-5);
    }

    #[test]
    fn test_zero_voltage() {
        assert_eq!(target_current(80.0, 0.0), 0.0);
        assert_eq!(target_current(80.0, -1.0), 0.0);
    }

    #[test]
    fn test_step_sets_discharge_path() {
        let m = Measurements {
            supercap_voltage: 16.0,
            discharge_current: 3.0,
            ..Measurements::ZERO
        };
        let act = step(0.2, &m, 80.0);
        assert!(act.discharge_enable);
        assert!(!act.charge_enable);
        assert!((act.duty_cycle - 0.22).abs() < 1e-6);
    }

    #[test]
    fn test_duty_stays_bounded() {
        let mut duty = 0.0;
        for idis in [0.0, 50.0, -50.0] {
            for _ in 0..300 {
                let m = Measurements {
                    supercap_voltage: 14.0,
                    discharge_current: idis,
                    ..Measurements::ZERO
                };
                duty = step(duty, &m, 200.0).duty_cycle;
                assert!((0.0..=control::MAX_DUTY).contains(&duty));
            }
        }
    }
}
