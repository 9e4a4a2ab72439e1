//! ハーフブリッジ・パワーステージ
//!
//! TIM1 の相補PWMで充電レグ（CH1/CH1N）と放電レグ（CH2/CH2N）を駆動します。
//! 同時に有効化できるのはどちらか一方のみです。

use embassy_stm32::{
    peripherals,
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};
use supercap_controller::config::pwm;
use supercap_controller::hal::PowerStage;
use supercap_controller::{Actuation, PowerStageError};

const CHARGE_LEG: Channel = Channel::Ch1;
const DISCHARGE_LEG: Channel = Channel::Ch2;

pub struct HalfBridge {
    pwm: ComplementaryPwm<'static, peripherals::TIM1>,
    max_duty: u16,
    initialized: bool,
}

impl HalfBridge {
    /// # 引数
    /// * `pwm` - PWMペリフェラル（TIM1）
    pub fn new(pwm: ComplementaryPwm<'static, peripherals::TIM1>) -> Self {
        let max_duty = pwm.get_max_duty();
        Self {
            pwm,
            max_duty,
            initialized: false,
        }
    }

    /// デューティ比（0.0-1.0）をコンペア値に変換
    fn compare(&self, duty: f32) -> u16 {
        (duty * self.max_duty as f32) as u16
    }

    /// 両レグのDuty比を0にして停止
    fn stop(&mut self) {
        self.pwm.set_duty(CHARGE_LEG, 0);
        self.pwm.set_duty(DISCHARGE_LEG, 0);
        self.pwm.disable(CHARGE_LEG);
        self.pwm.disable(DISCHARGE_LEG);
    }

    fn drive(&mut self, active: Channel, idle: Channel, duty: f32) {
        self.pwm.disable(idle);
        self.pwm.set_duty(idle, 0);
        self.pwm.set_duty(active, self.compare(duty));
        self.pwm.enable(active);
    }
}

impl PowerStage for HalfBridge {
    fn init(&mut self) -> Result<(), PowerStageError> {
        self.stop();
        self.pwm.set_dead_time(pwm::DEAD_TIME);
        self.initialized = true;
        info!(
            "Half bridge ready: {}Hz, max_duty={}, dead_time={}",
            pwm::FREQUENCY_HZ,
            self.max_duty,
            pwm::DEAD_TIME
        );
        Ok(())
    }

    fn apply(&mut self, actuation: &Actuation) -> Result<(), PowerStageError> {
        if !self.initialized {
            return Err(PowerStageError::NotInitialized);
        }

        match (actuation.charge_enable, actuation.discharge_enable) {
            (true, true) => {
                self.stop();
                Err(PowerStageError::ShootThrough)
            }
            (true, false) => {
                self.drive(CHARGE_LEG, DISCHARGE_LEG, actuation.duty_cycle);
                Ok(())
            }
            (false, true) => {
                self.drive(DISCHARGE_LEG, CHARGE_LEG, actuation.duty_cycle);
                Ok(())
            }
            (false, false) => {
                self.stop();
                Ok(())
            }
        }
    }
}
