#![no_std]
#![no_main]

#[macro_use]
mod fmt;

mod adc_sensors;
mod hardware;
mod power_stage;
mod state;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::{
    adc::{Adc, AdcChannel, SampleTime},
    can,
    gpio::{Level, Output, OutputType, Speed},
    time::Hertz,
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
    },
};
use embassy_time::{Duration, Timer};
use supercap_controller::config;

use adc_sensors::{Adc1Channels, Adc2Channels, AdcSensors};
use hardware::Irqs;
use power_stage::HalfBridge;
use tasks::{can_task, control_task, led_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // ハードウェア初期化
    let config = hardware::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("═══════════════════════════════════════════════════════════");
    info!("");
    info!("   Supercapacitor Energy Buffer • STM32G431VB @ 170MHz");
    info!("   charge / discharge / back-EMF recovery");
    info!("");
    info!("═══════════════════════════════════════════════════════════");

    // LED初期化＆タスク起動
    let led1 = Output::new(p.PC13, Level::Low, Speed::Low);
    let led2 = Output::new(p.PC14, Level::Low, Speed::Low);
    let led3 = Output::new(p.PC15, Level::Low, Speed::Low);
    spawner.spawn(led_task(led1, led2, led3)).unwrap();

    // CAN初期化＆タスク起動
    let mut can_configurator = can::CanConfigurator::new(p.FDCAN1, p.PA11, p.PA12, Irqs);
    can_configurator.properties().set_standard_filter(
        can::filter::StandardFilterSlot::_0,
        can::filter::StandardFilter::accept_all_into_fifo0(),
    );
    can_configurator.set_bitrate(config::can::DEFAULT_BITRATE);
    let can = can_configurator.start(can::OperatingMode::NormalOperationMode);
    spawner.spawn(can_task(can)).unwrap();

    // ADC初期化
    let mut adc1 = Adc::new(p.ADC1);
    adc1.set_sample_time(SampleTime::CYCLES47_5);
    let mut adc2 = Adc::new(p.ADC2);
    adc2.set_sample_time(SampleTime::CYCLES47_5);

    let sensors = AdcSensors::new(
        adc1,
        adc2,
        Adc1Channels {
            supercap_voltage: p.PA0.degrade_adc(),
            battery_voltage: p.PA1.degrade_adc(),
            output_voltage: p.PA2.degrade_adc(),
            charge_current: p.PA3.degrade_adc(),
        },
        Adc2Channels {
            discharge_current: p.PC1.degrade_adc(),
            back_emf_current: p.PC2.degrade_adc(),
            temperature: p.PC3.degrade_adc(),
        },
    );
    info!("ADC sensors: ADC1 PA0-PA3, ADC2 PC1-PC3");

    // PWM初期化（TIM1、CH1=充電レグ、CH2=放電レグ）
    let pwm = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE8, OutputType::PushPull)),
        Some(PwmPin::new(p.PE11, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE10, OutputType::PushPull)),
        None,
        None,
        None,
        None,
        Hertz(config::pwm::FREQUENCY_HZ),
        CountingMode::EdgeAlignedUp,
    );
    let stage = HalfBridge::new(pwm);

    info!("Starting supercap control...");

    spawner.spawn(control_task(sensors, stage)).unwrap();

    // メインループ（将来の拡張用）
    loop {
        Timer::after(Duration::from_millis(100)).await;
    }
}
