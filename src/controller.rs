//! State Machine Controller
//!
//! 運転モードを保持し、1kHz tick ごとに遷移を評価して該当する制御則を実行します。
//!
//! ## Tick内の処理順序
//! 1. センサスナップショット更新（無効値は前回値を保持）
//! 2. 電力・蓄積エネルギーの再計算
//! 3. 安全監視（フラグ非ゼロなら PROTECT を強制）
//! 4. 状態遷移と制御則
//! 5. 稼働時間カウンタ更新

use libm::fabsf;

use crate::can_protocol::ChassisCommand;
use crate::config::{battery, control, limits, rates, supercap};
use crate::control::{back_emf, charging, discharging};
use crate::energy;
use crate::error::SensorError;
use crate::model::{Actuation, ErrorFlags, Measurements, Mode, SystemState};
use crate::safety::{SafetyMonitor, SafetyThresholds};

/// Operator-controlled inputs of the transition function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeParams {
    pub power_limit: f32,
    pub back_emf_recovery_enable: bool,
}

impl ModeParams {
    pub fn from_state(state: &SystemState) -> Self {
        Self {
            power_limit: state.power_limit,
            back_emf_recovery_enable: state.back_emf_recovery_enable,
        }
    }
}

/// Transition function, first matching rule wins.
///
/// ERROR and PROTECT never leave on their own.
pub fn next_mode(mode: Mode, m: &Measurements, params: &ModeParams) -> Mode {
    let back_emf = fabsf(m.back_emf_current);

    match mode {
        Mode::Init => Mode::Idle,
        Mode::Idle => {
            if m.supercap_voltage < supercap::RATED_VOLTAGE
                && m.battery_voltage > battery::MIN_VOLTAGE
            {
                Mode::Charging
            } else if params.back_emf_recovery_enable && back_emf > limits::BACK_EMF_THRESHOLD {
                Mode::BackEmfRecovery
            } else {
                Mode::Idle
            }
        }
        Mode::Charging => {
            // 負荷側の出力電力で判定する
            let output_power = energy::output_power(m);
            if output_power > params.power_limit * control::DISCHARGE_ENTER_RATIO
                && m.supercap_voltage > supercap::MIN_VOLTAGE
            {
                Mode::Discharging
            } else if m.supercap_voltage >= supercap::RATED_VOLTAGE {
                Mode::Idle
            } else {
                Mode::Charging
            }
        }
        Mode::Discharging => {
            if m.supercap_voltage <= supercap::MIN_VOLTAGE {
                Mode::Charging
            } else if energy::output_power(m) < params.power_limit * control::DISCHARGE_EXIT_RATIO
            {
                Mode::Idle
            } else {
                Mode::Discharging
            }
        }
        Mode::BackEmfRecovery => {
            if back_emf < limits::BACK_EMF_THRESHOLD * 0.5 {
                Mode::Idle
            } else {
                Mode::BackEmfRecovery
            }
        }
        Mode::Error | Mode::Protect => mode,
    }
}

/// Result of one fault-free tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub mode: Mode,
    pub actuation: Actuation,
    /// Energy captured this tick [J]
    pub recovered_energy: f32,
}

/// Evaluate the transition and run the law of the resulting mode.
///
/// The proportional laws continue from `prev.duty_cycle` only while the
/// mode is unchanged; a freshly entered law starts from zero duty.
/// Duty is not shared between legs: a Charging <-> Discharging switch
/// never hands the charge-leg duty to the discharge leg (or back).
pub fn step(mode: Mode, prev: &Actuation, m: &Measurements, params: &ModeParams) -> StepOutcome {
    let next = next_mode(mode, m, params);
    let base_duty = if next == mode { prev.duty_cycle } else { 0.0 };

    let (actuation, recovered_energy) = match next {
        Mode::Charging => (charging::step(base_duty, m, params.power_limit), 0.0),
        Mode::Discharging => (discharging::step(base_duty, m, params.power_limit), 0.0),
        Mode::BackEmfRecovery => {
            let r = back_emf::step(m);
            (r.actuation, r.energy)
        }
        Mode::Init | Mode::Idle | Mode::Error | Mode::Protect => (Actuation::OFF, 0.0),
    };

    StepOutcome {
        mode: next,
        actuation,
        recovered_energy,
    }
}

/// スーパーキャパシタ制御コントローラ
///
/// `SystemState` の唯一の所有者。外部には読み取り専用ビューのみを公開します。
pub struct Controller {
    state: SystemState,
    safety: SafetyMonitor,
    /// 1秒未満のtickカウント
    subsecond_ticks: u32,
    last_command: Option<ChassisCommand>,
}

impl Controller {
    pub fn new() -> Self {
        Self::with_thresholds(SafetyThresholds::default())
    }

    pub fn with_thresholds(thresholds: SafetyThresholds) -> Self {
        Self {
            state: SystemState::new(),
            safety: SafetyMonitor::new(thresholds),
            subsecond_ticks: 0,
            last_command: None,
        }
    }

    /// 1 tick 分の制御を実行し、パワーステージへの出力を返す
    ///
    /// # Arguments
    /// * `reading` - 今回のセンサ取得結果
    /// * `comm_lost` - コマンド途絶ウォッチドッグの状態
    pub fn tick(&mut self, reading: Result<Measurements, SensorError>, comm_lost: bool) -> Actuation {
        let mut detected = ErrorFlags::NONE;
        if comm_lost {
            detected |= ErrorFlags::COMM_LOSS;
        }

        match reading {
            Ok(m) if m.is_finite() => self.state.measurements = m,
            // 前回の有効値を保持
            _ => detected |= ErrorFlags::SENSOR_FAULT,
        }

        let m = self.state.measurements;
        self.state.input_power = energy::input_power(&m);
        self.state.output_power = energy::output_power(&m);
        self.state.energy_stored = energy::stored_energy(m.supercap_voltage);

        let flags = self.safety.check(&m, self.state.mode, detected);
        self.state.error_flags = flags;

        if !flags.is_empty() {
            if self.state.mode != Mode::Protect {
                warn!("Mode {} -> Protect (flags={:#x})", self.state.mode.as_u8(), flags.bits());
                self.state.mode = Mode::Protect;
            }
            self.emergency_stop();
        } else if self.state.mode.is_fault() {
            self.emergency_stop();
        } else {
            let params = ModeParams::from_state(&self.state);
            let outcome = step(self.state.mode, &self.state.actuation(), &m, &params);

            if outcome.mode != self.state.mode {
                info!(
                    "Mode {} -> {} (Vcap={}V Vbat={}V)",
                    self.state.mode.as_u8(),
                    outcome.mode.as_u8(),
                    m.supercap_voltage,
                    m.battery_voltage
                );
            }

            self.state.mode = outcome.mode;
            self.state.set_actuation(outcome.actuation);
            self.state.energy_recovered += outcome.recovered_energy;
        }

        self.subsecond_ticks += 1;
        if self.subsecond_ticks >= rates::CONTROL_LOOP_FREQ_HZ {
            self.subsecond_ticks = 0;
            self.state.runtime_seconds = self.state.runtime_seconds.saturating_add(1);
        }

        self.state.actuation()
    }

    /// 受信したシャーシコマンドを適用
    ///
    /// リセット要求は一度だけ処理され、保存されるコマンドからは除去されます。
    pub fn apply_command(&mut self, command: &ChassisCommand) {
        if let Some(limit) = command.power_limit {
            if !self.set_power_limit(limit) {
                warn!("Power limit {}W rejected", limit);
            }
        }

        self.set_back_emf_recovery(command.back_emf_enable);

        if command.reset_errors {
            self.clear_errors();
        }

        self.last_command = Some(ChassisCommand {
            reset_errors: false,
            ..*command
        });
    }

    /// エラーフラグをクリアし、ERROR/PROTECT から IDLE へ戻す
    pub fn clear_errors(&mut self) {
        info!(
            "Clearing errors (flags={:#x}, mode={})",
            self.state.error_flags.bits(),
            self.state.mode.as_u8()
        );
        self.state.error_flags = ErrorFlags::NONE;
        if self.state.mode.is_fault() {
            self.state.mode = Mode::Idle;
        }
        self.safety.reset();
    }

    /// 電力制限を設定（範囲外なら変更しない）
    pub fn set_power_limit(&mut self, power_limit: f32) -> bool {
        if power_limit > 0.0 && power_limit <= limits::MAX_POWER_LIMIT {
            if power_limit != self.state.power_limit {
                info!("Power limit: {}W -> {}W", self.state.power_limit, power_limit);
            }
            self.state.power_limit = power_limit;
            true
        } else {
            false
        }
    }

    pub fn set_back_emf_recovery(&mut self, enable: bool) {
        if enable != self.state.back_emf_recovery_enable {
            info!("Back-EMF recovery {}", if enable { "enabled" } else { "disabled" });
        }
        self.state.back_emf_recovery_enable = enable;
    }

    /// 両経路を無効化し、デューティ比をゼロにする
    pub fn emergency_stop(&mut self) {
        self.state.set_actuation(Actuation::OFF);
    }

    /// 初期化失敗またはパワーステージ異常で ERROR に遷移
    pub fn enter_error(&mut self) {
        if self.state.mode != Mode::Error {
            error!("Mode {} -> Error", self.state.mode.as_u8());
        }
        self.state.mode = Mode::Error;
        self.emergency_stop();
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn error_flags(&self) -> ErrorFlags {
        self.state.error_flags
    }

    pub fn recovered_energy(&self) -> f32 {
        self.state.energy_recovered
    }

    /// 最後に適用したコマンド（リセットビットは除去済み）
    pub fn last_command(&self) -> Option<&ChassisCommand> {
        self.last_command.as_ref()
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
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
            charge_current: 0.0,
            discharge_current: 0.0,
            back_emf_current: 0.0,
            temperature: 30.0,
        }
    }

    fn params() -> ModeParams {
        ModeParams {
            power_limit: 80.0,
            back_emf_recovery_enable: true,
        }
    }

    fn idle_controller() -> Controller {
        let mut c = Controller::new();
        c.tick(Ok(nominal()), false);
        assert_eq!(c.mode(), Mode::Idle);
        c
    }

    fn command(raw_limit: u16, flags: u8) -> ChassisCommand {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&raw_limit.to_le_bytes());
        data[2] = flags;
        crate::can_protocol::parse_command(&data).unwrap()
    }

    #[test]
    fn test_init_to_idle_ignores_undervoltage() {
        let mut c = Controller::new();
        let low = Measurements {
            supercap_voltage: 10.0,
            ..nominal()
        };

        c.tick(Ok(low), false);
        assert_eq!(c.mode(), Mode::Idle);
        assert!(c.error_flags().is_empty());

        let act = c.tick(Ok(low), false);
        assert_eq!(c.mode(), Mode::Protect);
        assert!(c.error_flags().contains(ErrorFlags::UNDERVOLTAGE));
        assert!(act.is_off());
    }

    #[test]
    fn test_idle_to_charging() {
        let m = Measurements {
            supercap_voltage: 15.9,
            battery_voltage: 20.0,
            ..nominal()
        };
        assert_eq!(next_mode(Mode::Idle, &m, &params()), Mode::Charging);

        let mut c = idle_controller();
        let act = c.tick(Ok(m), false);
        assert_eq!(c.mode(), Mode::Charging);
        assert!(act.charge_enable && !act.discharge_enable);
        assert!(act.duty_cycle > 0.0);
    }

    #[test]
    fn test_charging_target_in_taper_region() {
        let m = Measurements {
            supercap_voltage: 15.0,
            battery_voltage: 24.0,
            ..nominal()
        };
        assert!((charging::target_current(m.supercap_voltage) - 5.0).abs() < 1e-5);
        // 200 W / 24 V = 8.3 A, taper target wins
        let out = step(Mode::Charging, &Actuation::OFF, &m, &ModeParams {
            power_limit: 200.0,
            ..params()
        });
        assert_eq!(out.mode, Mode::Charging);
        assert!((out.actuation.duty_cycle - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_back_emf_round_trip() {
        let mut c = idle_controller();
        let surge = Measurements {
            back_emf_current: 0.6,
            ..nominal()
        };
        let act = c.tick(Ok(surge), false);
        assert_eq!(c.mode(), Mode::BackEmfRecovery);
        assert_eq!(act.duty_cycle, 0.3);
        assert!(c.recovered_energy() > 0.0);

        let settled = Measurements {
            back_emf_current: 0.2,
            ..nominal()
        };
        let before = c.recovered_energy();
        let act = c.tick(Ok(settled), false);
        assert_eq!(c.mode(), Mode::Idle);
        assert!(act.is_off());
        assert_eq!(c.recovered_energy(), before);
    }

    #[test]
    fn test_back_emf_disabled_stays_idle() {
        let p = ModeParams {
            back_emf_recovery_enable: false,
            ..params()
        };
        let m = Measurements {
            back_emf_current: -3.0,
            ..nominal()
        };
        assert_eq!(next_mode(Mode::Idle, &m, &p), Mode::Idle);
        assert_eq!(next_mode(Mode::Idle, &m, &params()), Mode::BackEmfRecovery);
    }

    #[test]
    fn test_charging_to_discharging_on_output_power() {
        // 24 V * 3 A = 72 W > 64 W
        let m = Measurements {
            supercap_voltage: 14.0,
            discharge_current: 3.0,
            ..nominal()
        };
        assert_eq!(next_mode(Mode::Charging, &m, &params()), Mode::Discharging);

        let full = Measurements {
            supercap_voltage: 16.0,
            ..nominal()
        };
        assert_eq!(next_mode(Mode::Charging, &full, &params()), Mode::Idle);
    }

    #[test]
    fn test_discharging_exits() {
        let depleted = Measurements {
            supercap_voltage: 12.0,
            discharge_current: 5.0,
            ..nominal()
        };
        assert_eq!(next_mode(Mode::Discharging, &depleted, &params()), Mode::Charging);

        // 24 V * 1 A = 24 W < 40 W
        let light = Measurements {
            supercap_voltage: 14.0,
            discharge_current: 1.0,
            ..nominal()
        };
        assert_eq!(next_mode(Mode::Discharging, &light, &params()), Mode::Idle);
    }

    #[test]
    fn test_new_law_starts_from_zero_duty() {
        let prev = Actuation::charge(0.9);
        let m = Measurements {
            supercap_voltage: 14.0,
            discharge_current: 3.0,
            ..nominal()
        };
        let out = step(Mode::Charging, &prev, &m, &params());
        assert_eq!(out.mode, Mode::Discharging);
        assert!(out.actuation.discharge_enable);
        assert!(out.actuation.duty_cycle < 0.1);
    }

    #[test]
    fn test_discharge_duty_not_carried_into_charging() {
        let prev = Actuation::discharge(0.9);
        let m = Measurements {
            supercap_voltage: 12.0,
            discharge_current: 5.0,
            ..nominal()
        };
        let out = step(Mode::Discharging, &prev, &m, &params());
        assert_eq!(out.mode, Mode::Charging);
        assert!(out.actuation.charge_enable);
        assert!(!out.actuation.discharge_enable);
        assert!(out.actuation.duty_cycle < 0.1);
    }

    #[test]
    fn test_fault_modes_are_sticky() {
        for mode in [Mode::Error, Mode::Protect] {
            let out = step(mode, &Actuation::OFF, &nominal(), &params());
            assert_eq!(out.mode, mode);
            assert!(out.actuation.is_off());
        }
    }

    #[test]
    fn test_protect_until_reset() {
        let mut c = idle_controller();
        let hot = Measurements {
            temperature: 90.0,
            ..nominal()
        };
        c.tick(Ok(hot), false);
        assert_eq!(c.mode(), Mode::Protect);

        // fault gone, mode stays
        c.tick(Ok(nominal()), false);
        assert_eq!(c.mode(), Mode::Protect);
        assert!(c.error_flags().is_empty());
        assert!(c.state().actuation().is_off());

        c.apply_command(&command(0, 0x0C));
        assert_eq!(c.mode(), Mode::Idle);

        c.tick(Ok(nominal()), false);
        assert_eq!(c.mode(), Mode::Idle);
    }

    #[test]
    fn test_reset_is_not_replayed() {
        let mut c = idle_controller();
        c.apply_command(&command(0, 0x08));
        assert!(!c.last_command().unwrap().reset_errors);

        let hot = Measurements {
            temperature: 90.0,
            ..nominal()
        };
        c.tick(Ok(hot), false);
        c.tick(Ok(nominal()), false);
        assert_eq!(c.mode(), Mode::Protect);
    }

    #[test]
    fn test_power_limit_command() {
        let mut c = Controller::new();

        c.apply_command(&command(0, 0x04));
        assert_eq!(c.state().power_limit, 80.0);

        c.apply_command(&command(2000, 0x04));
        assert_eq!(c.state().power_limit, 200.0);

        c.apply_command(&command(2001, 0x04));
        assert_eq!(c.state().power_limit, 200.0);

        c.apply_command(&command(500, 0x04));
        assert_eq!(c.state().power_limit, 50.0);
    }

    #[test]
    fn test_back_emf_enable_applied_every_command() {
        let mut c = Controller::new();
        c.apply_command(&command(0, 0x00));
        assert!(!c.state().back_emf_recovery_enable);
        c.apply_command(&command(0, 0x04));
        assert!(c.state().back_emf_recovery_enable);
    }

    #[test]
    fn test_sensor_failure_keeps_last_snapshot() {
        let mut c = idle_controller();
        c.tick(Err(SensorError::Timeout), false);
        assert_eq!(c.mode(), Mode::Protect);
        assert!(c.error_flags().contains(ErrorFlags::SENSOR_FAULT));
        assert_eq!(c.state().measurements, nominal());

        let bad = Measurements {
            supercap_voltage: f32::NAN,
            ..nominal()
        };
        c.tick(Ok(bad), false);
        assert_eq!(c.state().measurements, nominal());
        assert!(c.error_flags().contains(ErrorFlags::SENSOR_FAULT));
    }

    #[test]
    fn test_comm_loss_forces_protect() {
        let mut c = idle_controller();
        c.tick(Ok(nominal()), true);
        assert_eq!(c.mode(), Mode::Protect);
        assert_eq!(c.error_flags(), ErrorFlags::COMM_LOSS);

        c.tick(Ok(nominal()), false);
        assert!(c.error_flags().is_empty());
        assert_eq!(c.mode(), Mode::Protect);
    }

    #[test]
    fn test_fault_overrides_error_mode() {
        let mut c = idle_controller();
        c.enter_error();
        assert_eq!(c.mode(), Mode::Error);
        c.tick(Ok(nominal()), false);
        assert_eq!(c.mode(), Mode::Error);
        c.tick(Ok(nominal()), true);
        assert_eq!(c.mode(), Mode::Protect);
    }

    #[test]
    fn test_derived_values_follow_snapshot() {
        let mut c = Controller::new();
        let m = Measurements {
            supercap_voltage: 20.0,
            battery_voltage: 24.0,
            charge_current: 2.0,
            output_voltage: 22.0,
            discharge_current: 1.0,
            ..nominal()
        };
        c.tick(Ok(m), false);
        let s = c.state();
        assert_eq!(s.energy_stored, 0.5 * 50.0 * 20.0 * 20.0);
        assert_eq!(s.input_power, 48.0);
        assert_eq!(s.output_power, 22.0);
    }

    #[test]
    fn test_runtime_counts_seconds() {
        let mut c = Controller::new();
        for _ in 0..2500 {
            c.tick(Ok(nominal()), false);
        }
        assert_eq!(c.state().runtime_seconds, 2);
    }

    #[test]
    fn test_invariants_over_random_walk() {
        // 決定的な擬似乱数で入力を揺らす
        let mut seed: u32 = 0x1234_5678;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed % 10_000) as f32 / 10_000.0
        };

        let mut c = Controller::new();
        let mut recovered = 0.0;
        for _ in 0..5000 {
            let m = Measurements {
                supercap_voltage: 10.0 + next() * 17.0,
                battery_voltage: 17.0 + next() * 9.0,
                output_voltage: 20.0 + next() * 5.0,
                charge_current: next() * 12.0,
                discharge_current: next() * 12.0,
                back_emf_current: next() * 4.0 - 2.0,
                temperature: 20.0 + next() * 60.0,
            };
            let prev_mode = c.mode();
            let act = c.tick(Ok(m), false);

            assert!((0.0..=control::MAX_DUTY).contains(&act.duty_cycle));
            assert!(!(act.charge_enable && act.discharge_enable));
            if act.duty_cycle > 0.0 {
                assert!(act.charge_enable || act.discharge_enable);
            }
            if !c.error_flags().is_empty() {
                assert_eq!(c.mode(), Mode::Protect);
                assert!(act.is_off());
            }
            if matches!(c.mode(), Mode::Idle | Mode::Protect | Mode::Error) {
                assert!(!act.charge_enable && !act.discharge_enable);
            }

            assert!(c.recovered_energy() >= recovered);
            if c.mode() != Mode::BackEmfRecovery || prev_mode.is_fault() {
                assert_eq!(c.recovered_energy(), recovered);
            }
            recovered = c.recovered_energy();

            if c.mode() == Mode::Protect && next() < 0.05 {
                c.clear_errors();
            }
        }
    }
}
