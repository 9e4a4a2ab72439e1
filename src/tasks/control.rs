//! 制御タスク
//!
//! 1kHz で Supervisor を駆動し、モード変化を LED タスクへ通知します。

use embassy_time::{Duration, Ticker};
use supercap_controller::config::rates;
use supercap_controller::Supervisor;

use crate::adc_sensors::AdcSensors;
use crate::power_stage::HalfBridge;
use crate::state::{COMMAND_SLOT, MODE_SIGNAL};
use crate::tasks::can::QueueTelemetry;

// 制御周期はタイムベースの整数tickでなければならない
const _: () = core::assert!(embassy_time::TICK_HZ == rates::TIMEBASE_HZ);

/// 制御タスク（1kHz 制御ループ）
#[embassy_executor::task]
pub async fn control_task(sensors: AdcSensors, stage: HalfBridge) {
    info!("Control task started ({}Hz)", rates::CONTROL_LOOP_FREQ_HZ);

    let mut supervisor = Supervisor::new(&COMMAND_SLOT, sensors, stage, QueueTelemetry);

    // 失敗時は ERROR のままテレメトリ送信を継続
    if supervisor.init().is_err() {
        warn!("Continuing in ERROR mode");
    }

    let mut last_mode = supervisor.controller().mode();
    MODE_SIGNAL.signal(last_mode);

    let mut ticker = Ticker::every(Duration::from_micros(rates::CONTROL_PERIOD_US));

    // デバッグログ用カウンタ（1秒ごとにログ）
    let mut log_counter = 0u32;

    loop {
        ticker.next().await;

        let actuation = supervisor.tick();

        let mode = supervisor.controller().mode();
        if mode != last_mode {
            MODE_SIGNAL.signal(mode);
            last_mode = mode;
        }

        log_counter += 1;
        if log_counter >= rates::CONTROL_LOOP_FREQ_HZ {
            log_counter = 0;
            let state = supervisor.controller().state();
            info!(
                "[Supercap] mode={} flags={:#x} Vcap={}V Vbat={}V Pin={}W Pout={}W duty={} E={}J Erec={}J",
                state.mode.as_u8(),
                state.error_flags.bits(),
                state.measurements.supercap_voltage,
                state.measurements.battery_voltage,
                state.input_power,
                state.output_power,
                actuation.duty_cycle,
                state.energy_stored,
                state.energy_recovered
            );
        }
    }
}
