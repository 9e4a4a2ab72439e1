// Back-EMF recovery law

use crate::config::{control, supercap};
use crate::energy;
use crate::model::{Actuation, Measurements};

/// Result of one recovery tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recovery {
    pub actuation: Actuation,
    /// Energy captured this tick [J], zero when recovery is inhibited
    pub energy: f32,
}

/// Voltage headroom left in the bank [V]
pub fn headroom(supercap_voltage: f32) -> f32 {
    supercap::MAX_VOLTAGE - supercap_voltage
}

/// Recovery duty for the given headroom, `None` when the bank is too full
pub fn duty_for_headroom(headroom: f32) -> Option<f32> {
    if headroom.is_nan() || headroom <= control::BACK_EMF_MIN_HEADROOM {
        return None;
    }
    if headroom < control::BACK_EMF_TAPER_HEADROOM {
        Some(control::BACK_EMF_BASE_DUTY * headroom / control::BACK_EMF_TAPER_HEADROOM)
    } else {
        Some(control::BACK_EMF_BASE_DUTY)
    }
}

/// One tick of the recovery law
pub fn step(m: &Measurements) -> Recovery {
    match duty_for_headroom(headroom(m.supercap_voltage)) {
        Some(duty) => Recovery {
            actuation: Actuation::charge(duty),
            energy: energy::recovered_energy_per_tick(m.back_emf_current),
        },
        None => Recovery {
            actuation: Actuation::OFF,
            energy: 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(vcap: f32, iemf: f32) -> Measurements {
        Measurements {
            supercap_voltage: vcap,
            back_emf_current: iemf,
            ..Measurements::ZERO
        }
    }

    #[test]
    fn test_full_duty_with_headroom() {
        let r = step(&snapshot(16.0, 2.0));
        assert_eq!(r.actuation.duty_cycle, 0.3);
        assert!(r.actuation.charge_enable);
        assert!(!r.actuation.discharge_enable);
        assert!(r.energy > 0.0);
    }

    #[test]
    fn test_tapered_duty_near_full() {
        // headroom 1.0 V -> 0.15
        let r = step(&snapshot(23.0, 2.0));
        assert!((r.actuation.duty_cycle - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_inhibited_when_full() {
        for vcap in [23.5, 23.9, 24.0, 25.0] {
            let r = step(&snapshot(vcap, 3.0));
            assert!(r.actuation.is_off());
            assert_eq!(r.energy, 0.0);
        }
    }

    #[test]
    fn test_nan_headroom_is_inhibited() {
        assert_eq!(duty_for_headroom(f32::NAN), None);
    }
}
