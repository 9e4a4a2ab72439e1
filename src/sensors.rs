//! Analog sensor front-end
//!
//! 7チャンネルのADC生値を SI 単位の測定値に変換します。
//! 電圧は分圧回路から逆算、電流はセンスアンプのゼロ点とゲイン、温度はリニア温度センサ。

use crate::config::adc;
use crate::error::SensorError;
use crate::model::Measurements;

/// 1tick分のADC生値（0-4095）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSamples {
    pub supercap_voltage: u16,
    pub battery_voltage: u16,
    pub output_voltage: u16,
    pub charge_current: u16,
    pub discharge_current: u16,
    pub back_emf_current: u16,
    pub temperature: u16,
}

impl RawSamples {
    fn max(&self) -> u16 {
        [
            self.supercap_voltage,
            self.battery_voltage,
            self.output_voltage,
            self.charge_current,
            self.discharge_current,
            self.back_emf_current,
            self.temperature,
        ]
        .into_iter()
        .fold(0, u16::max)
    }
}

/// ADC変換パラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcScaling {
    /// ADC分解能（12ビット = 4096）
    pub adc_max: u16,
    /// ADC基準電圧 [V]
    pub vref: f32,
    /// 分圧抵抗の上側 [Ω]
    pub r_upper: f32,
    /// 分圧抵抗の下側 [Ω]
    pub r_lower: f32,
    /// 電流センス感度 [V/A]
    pub current_v_per_a: f32,
    /// 電流センスのゼロ点 [V]
    pub current_zero_v: f32,
    /// 温度センサ感度 [V/°C]
    pub temp_v_per_c: f32,
    /// 温度センサ 0°C 出力 [V]
    pub temp_zero_v: f32,
    /// ローパスフィルタ係数（0.0-1.0、1.0でフィルタなし）
    pub filter_alpha: f32,
}

impl Default for AdcScaling {
    fn default() -> Self {
        Self {
            // 分圧回路: 33.3kΩ + 3.3kΩ（電圧変換係数 11.09倍、最大 36.6V）
            adc_max: adc::ADC_MAX,
            vref: adc::VREF,
            r_upper: adc::DIVIDER_R_UPPER,
            r_lower: adc::DIVIDER_R_LOWER,
            current_v_per_a: adc::CURRENT_SENSE_V_PER_A,
            current_zero_v: adc::CURRENT_SENSE_ZERO_V,
            temp_v_per_c: adc::TEMP_SENSE_V_PER_C,
            temp_zero_v: adc::TEMP_SENSE_ZERO_V,
            filter_alpha: adc::FILTER_ALPHA,
        }
    }
}

/// センサフロントエンド
pub struct SensorFrontEnd {
    scaling: AdcScaling,
    filtered: Measurements,
    initialized: bool,
}

impl SensorFrontEnd {
    pub fn new(scaling: AdcScaling) -> Self {
        Self {
            scaling,
            filtered: Measurements::ZERO,
            initialized: false,
        }
    }

    /// ADC生値からADCピン電圧を計算 [V]
    pub fn adc_to_volts(&self, raw: u16) -> f32 {
        (raw as f32 / self.scaling.adc_max as f32) * self.scaling.vref
    }

    /// 分圧回路から元の電圧を逆算 [V]
    ///
    /// V = V_adc * (R_upper + R_lower) / R_lower
    pub fn divider_voltage(&self, raw: u16) -> f32 {
        let ratio = (self.scaling.r_upper + self.scaling.r_lower) / self.scaling.r_lower;
        self.adc_to_volts(raw) * ratio
    }

    /// 電流センス出力から電流を計算 [A]
    pub fn current(&self, raw: u16) -> f32 {
        (self.adc_to_volts(raw) - self.scaling.current_zero_v) / self.scaling.current_v_per_a
    }

    /// 温度センサ出力から温度を計算 [°C]
    pub fn temperature(&self, raw: u16) -> f32 {
        (self.adc_to_volts(raw) - self.scaling.temp_zero_v) / self.scaling.temp_v_per_c
    }

    /// フィルタなしの変換
    pub fn convert(&self, raw: &RawSamples) -> Measurements {
        Measurements {
            supercap_voltage: self.divider_voltage(raw.supercap_voltage),
            battery_voltage: self.divider_voltage(raw.battery_voltage),
            output_voltage: self.divider_voltage(raw.output_voltage),
            charge_current: self.current(raw.charge_current),
            discharge_current: self.current(raw.discharge_current),
            back_emf_current: self.current(raw.back_emf_current),
            temperature: self.temperature(raw.temperature),
        }
    }

    /// 生値を変換してフィルタを更新
    ///
    /// 範囲外・非有限の値はフィルタに取り込まずエラーを返します。
    pub fn update(&mut self, raw: &RawSamples) -> Result<Measurements, SensorError> {
        if raw.max() >= self.scaling.adc_max {
            return Err(SensorError::OutOfRange);
        }

        let m = self.convert(raw);
        if !m.is_finite() {
            return Err(SensorError::NonFinite);
        }

        if !self.initialized {
            self.initialize_with(m);
            return Ok(m);
        }

        // filtered = alpha * raw + (1 - alpha) * filtered_prev
        let a = self.scaling.filter_alpha;
        let lp = |new: f32, prev: f32| a * new + (1.0 - a) * prev;
        let f = &mut self.filtered;
        f.supercap_voltage = lp(m.supercap_voltage, f.supercap_voltage);
        f.battery_voltage = lp(m.battery_voltage, f.battery_voltage);
        f.output_voltage = lp(m.output_voltage, f.output_voltage);
        f.charge_current = lp(m.charge_current, f.charge_current);
        f.discharge_current = lp(m.discharge_current, f.discharge_current);
        f.back_emf_current = lp(m.back_emf_current, f.back_emf_current);
        f.temperature = lp(m.temperature, f.temperature);

        Ok(self.filtered)
    }

    /// フィルタ状態を指定値で初期化（起動直後の立ち上がり遅れを防ぐ）
    pub fn initialize_with(&mut self, m: Measurements) {
        self.filtered = m;
        self.initialized = true;
    }

    pub fn filtered(&self) -> &Measurements {
        &self.filtered
    }

    pub fn scaling(&self) -> &AdcScaling {
        &self.scaling
    }
}

impl Default for SensorFrontEnd {
    fn default() -> Self {
        Self::new(AdcScaling::default())
    }
}
