//! ADCセンサ入力
//!
//! ADC1: PA0=スーパーキャパシタ電圧, PA1=バッテリー電圧, PA2=出力電圧, PA3=充電電流
//! ADC2: PC1=放電電流, PC2=逆起電力電流, PC3=温度

use embassy_stm32::{
    adc::{Adc, AnyAdcChannel},
    peripherals,
};
use supercap_controller::hal::SensorSource;
use supercap_controller::sensors::{RawSamples, SensorFrontEnd};
use supercap_controller::{Measurements, SensorError};

pub struct Adc1Channels {
    pub supercap_voltage: AnyAdcChannel<peripherals::ADC1>,
    pub battery_voltage: AnyAdcChannel<peripherals::ADC1>,
    pub output_voltage: AnyAdcChannel<peripherals::ADC1>,
    pub charge_current: AnyAdcChannel<peripherals::ADC1>,
}

pub struct Adc2Channels {
    pub discharge_current: AnyAdcChannel<peripherals::ADC2>,
    pub back_emf_current: AnyAdcChannel<peripherals::ADC2>,
    pub temperature: AnyAdcChannel<peripherals::ADC2>,
}

pub struct AdcSensors {
    adc1: Adc<'static, peripherals::ADC1>,
    adc2: Adc<'static, peripherals::ADC2>,
    ch1: Adc1Channels,
    ch2: Adc2Channels,
    front: SensorFrontEnd,
}

impl AdcSensors {
    pub fn new(
        adc1: Adc<'static, peripherals::ADC1>,
        adc2: Adc<'static, peripherals::ADC2>,
        ch1: Adc1Channels,
        ch2: Adc2Channels,
    ) -> Self {
        Self {
            adc1,
            adc2,
            ch1,
            ch2,
            front: SensorFrontEnd::default(),
        }
    }

    fn sample(&mut self) -> RawSamples {
        RawSamples {
            supercap_voltage: self.adc1.blocking_read(&mut self.ch1.supercap_voltage),
            battery_voltage: self.adc1.blocking_read(&mut self.ch1.battery_voltage),
            output_voltage: self.adc1.blocking_read(&mut self.ch1.output_voltage),
            charge_current: self.adc1.blocking_read(&mut self.ch1.charge_current),
            discharge_current: self.adc2.blocking_read(&mut self.ch2.discharge_current),
            back_emf_current: self.adc2.blocking_read(&mut self.ch2.back_emf_current),
            temperature: self.adc2.blocking_read(&mut self.ch2.temperature),
        }
    }
}

impl SensorSource for AdcSensors {
    fn acquire(&mut self) -> Result<Measurements, SensorError> {
        let raw = self.sample();
        self.front.update(&raw)
    }
}
