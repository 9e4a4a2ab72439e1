// Control laws for the active modes
//
// Each law is a pure function of the snapshot, the previous duty of the same
// law and the mode parameters. Output duty is always clamped to [0, MAX_DUTY].

pub mod back_emf;
pub mod charging;
pub mod discharging;

pub use crate::model::clamp_duty;

use crate::config::control;

/// Proportional current step: `duty += (target - measured) * Kp`, clamped
pub fn proportional_step(duty: f32, target_current: f32, measured_current: f32) -> f32 {
    clamp_duty(duty + (target_current - measured_current) * control::CURRENT_KP)
}
