//! Safety Monitor
//!
//! 毎tick、測定スナップショットを固定の安全エンベロープと比較し、エラービットマスクを生成します。
//! 非ゼロの結果はステートマシンを PROTECT に強制します。

use libm::fabsf;

use crate::config::{battery, safety};
use crate::model::{ErrorFlags, Measurements, Mode};

/// 安全しきい値
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyThresholds {
    /// 過電圧しきい値 [V]
    pub overvoltage: f32,
    /// 低電圧しきい値 [V]（INIT中は無視）
    pub undervoltage: f32,
    /// 過電流しきい値 [A]（充電/放電/逆起電力）
    pub overcurrent: f32,
    /// 過熱しきい値 [°C]
    pub overtemp: f32,
    /// バッテリー電圧の妥当範囲 [V]
    pub battery_min: f32,
    pub battery_max: f32,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            overvoltage: safety::OVERVOLTAGE_THRESHOLD,
            undervoltage: safety::UNDERVOLTAGE_THRESHOLD,
            overcurrent: safety::OVERCURRENT_THRESHOLD,
            overtemp: safety::OVERTEMP_THRESHOLD,
            battery_min: battery::MIN_VOLTAGE,
            battery_max: battery::MAX_VOLTAGE,
        }
    }
}

/// Evaluate one snapshot against the envelope.
///
/// `detected` carries faults found outside the snapshot (command-liveness
/// expiry, failed acquisition) and is OR'd into the result.
pub fn evaluate(
    m: &Measurements,
    mode: Mode,
    detected: ErrorFlags,
    th: &SafetyThresholds,
) -> ErrorFlags {
    let mut flags = detected;

    flags.set(ErrorFlags::OVERVOLTAGE, m.supercap_voltage > th.overvoltage);
    flags.set(
        ErrorFlags::UNDERVOLTAGE,
        m.supercap_voltage < th.undervoltage && mode != Mode::Init,
    );
    flags.set(
        ErrorFlags::OVERCURRENT,
        m.charge_current > th.overcurrent || m.discharge_current > th.overcurrent,
    );
    flags.set(ErrorFlags::OVERTEMP, m.temperature > th.overtemp);
    if m.battery_voltage < th.battery_min || m.battery_voltage > th.battery_max {
        flags |= ErrorFlags::SENSOR_FAULT;
    }
    if fabsf(m.back_emf_current) > th.overcurrent {
        flags |= ErrorFlags::BACK_EMF_FAULT;
    }

    flags
}

/// 安全監視
///
/// 判定は `evaluate` に委譲し、フラグが変化したときだけログを出します。
pub struct SafetyMonitor {
    thresholds: SafetyThresholds,
    last_flags: ErrorFlags,
}

impl SafetyMonitor {
    pub fn new(thresholds: SafetyThresholds) -> Self {
        Self {
            thresholds,
            last_flags: ErrorFlags::NONE,
        }
    }

    /// 今回のtickのエラーフラグを計算
    pub fn check(&mut self, m: &Measurements, mode: Mode, detected: ErrorFlags) -> ErrorFlags {
        let flags = evaluate(m, mode, detected, &self.thresholds);

        if flags != self.last_flags {
            if flags.is_empty() {
                info!("Safety flags cleared");
            } else {
                error!(
                    "Safety fault: flags={:#x} Vcap={}V Vbat={}V Ichg={}A Idis={}A T={}C",
                    flags.bits(),
                    m.supercap_voltage,
                    m.battery_voltage,
                    m.charge_current,
                    m.discharge_current,
                    m.temperature
                );
            }
            self.last_flags = flags;
        }

        flags
    }

    /// 明示的なエラークリア後、次の変化を再度ログするため
    pub fn reset(&mut self) {
        self.last_flags = ErrorFlags::NONE;
    }
}

impl Default for SafetyMonitor {
    fn default() -> Self {
        Self::new(SafetyThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal() -> Measurements {
        Measurements {
            supercap_voltage: 16.0,
            battery_voltage: 24.0,
            output_voltage: 24.0,
            charge_current: 1.0,
            discharge_current: 1.0,
            back_emf_current: 0.0,
            temperature: 30.0,
        }
    }

    fn eval(m: &Measurements, mode: Mode) -> ErrorFlags {
        evaluate(m, mode, ErrorFlags::NONE, &SafetyThresholds::default())
    }

    #[test]
    fn test_nominal_is_clean() {
        assert!(eval(&nominal(), Mode::Idle).is_empty());
    }

    #[test]
    fn test_undervoltage_masked_during_init() {
        let m = Measurements {
            supercap_voltage: 10.0,
            ..nominal()
        };
        assert!(eval(&m, Mode::Init).is_empty());
        assert_eq!(eval(&m, Mode::Idle), ErrorFlags::UNDERVOLTAGE);
    }

    #[test]
    fn test_independent_faults_combine() {
        let m = Measurements {
            supercap_voltage: 26.5,
            charge_current: 25.5,
            temperature: 80.0,
            ..nominal()
        };
        let flags = eval(&m, Mode::Charging);
        assert_eq!(
            flags,
            ErrorFlags::OVERVOLTAGE | ErrorFlags::OVERCURRENT | ErrorFlags::OVERTEMP
        );
    }

    #[test]
    fn test_thresholds_are_strict() {
        let m = Measurements {
            supercap_voltage: 26.0,
            discharge_current: 25.0,
            temperature: 75.0,
            battery_voltage: 25.2,
            ..nominal()
        };
        assert!(eval(&m, Mode::Discharging).is_empty());
    }

    #[test]
    fn test_battery_out_of_range_is_sensor_fault() {
        let low = Measurements {
            battery_voltage: 17.9,
            ..nominal()
        };
        let high = Measurements {
            battery_voltage: 25.3,
            ..nominal()
        };
        assert_eq!(eval(&low, Mode::Idle), ErrorFlags::SENSOR_FAULT);
        assert_eq!(eval(&high, Mode::Idle), ErrorFlags::SENSOR_FAULT);
    }

    #[test]
    fn test_back_emf_surge() {
        let m = Measurements {
            back_emf_current: -26.0,
            ..nominal()
        };
        assert_eq!(eval(&m, Mode::BackEmfRecovery), ErrorFlags::BACK_EMF_FAULT);
    }

    #[test]
    fn test_detected_flags_are_kept() {
        let flags = evaluate(
            &nominal(),
            Mode::Idle,
            ErrorFlags::COMM_LOSS,
            &SafetyThresholds::default(),
        );
        assert_eq!(flags, ErrorFlags::COMM_LOSS);
    }

    #[test]
    fn test_monitor_uses_custom_envelope() {
        let mut monitor = SafetyMonitor::new(SafetyThresholds {
            overtemp: 40.0,
            ..SafetyThresholds::default()
        });
        let m = Measurements {
            temperature: 45.0,
            ..nominal()
        };
        assert_eq!(monitor.check(&m, Mode::Idle, ErrorFlags::NONE), ErrorFlags::OVERTEMP);
        assert!(monitor.check(&nominal(), Mode::Idle, ErrorFlags::NONE).is_empty());
    }
}
