//! スーパーキャパシタ制御とハードウェアの設定パラメータ

/// スーパーキャパシタバンク
pub mod supercap {
    /// 最大電圧 [V]（回生時のヘッドルーム計算の基準）
    pub const MAX_VOLTAGE: f32 = 24.0;

    /// 最小電圧 [V]（これ以下では放電しない）
    pub const MIN_VOLTAGE: f32 = 12.0;

    /// 定格電圧 [V]（充電目標）
    pub const RATED_VOLTAGE: f32 = 16.0;

    /// 等価静電容量 [F]
    pub const CAPACITANCE: f32 = 50.0;
}

/// バッテリー
pub mod battery {
    /// 最大電圧 [V]（6S LiPo満充電）
    pub const MAX_VOLTAGE: f32 = 25.2;

    /// 最小電圧 [V]
    pub const MIN_VOLTAGE: f32 = 18.0;
}

/// 電流・電力の制限値
pub mod limits {
    /// 最大充電電流 [A]
    pub const MAX_CHARGE_CURRENT: f32 = 10.0;

    /// 最大放電電流 [A]
    pub const MAX_DISCHARGE_CURRENT: f32 = 20.0;

    /// 逆起電力回生の開始しきい値 [A]
    pub const BACK_EMF_THRESHOLD: f32 = 0.5;

    /// デフォルト電力制限 [W]
    pub const DEFAULT_POWER_LIMIT: f32 = 80.0;

    /// 設定可能な最大電力制限 [W]
    pub const MAX_POWER_LIMIT: f32 = 200.0;
}

/// 保護しきい値
pub mod safety {
    /// 過温度 [°C]
    pub const OVERTEMP_THRESHOLD: f32 = 75.0;

    /// 過電流 [A]
    pub const OVERCURRENT_THRESHOLD: f32 = 25.0;

    /// 過電圧 [V]
    pub const OVERVOLTAGE_THRESHOLD: f32 = 26.0;

    /// 低電圧 [V]
    pub const UNDERVOLTAGE_THRESHOLD: f32 = 11.0;
}

/// ループ周波数
pub mod rates {
    /// 制御ループ周波数 [Hz]
    pub const CONTROL_LOOP_FREQ_HZ: u32 = 1000;

    /// タイムベース周波数 [Hz]（embassy-time の `tick-hz-1_000_000` と一致させる）
    pub const TIMEBASE_HZ: u64 = 1_000_000;

    /// 制御周期 [us]
    pub const CONTROL_PERIOD_US: u64 = TIMEBASE_HZ / CONTROL_LOOP_FREQ_HZ as u64;

    /// ステータス送信周波数 [Hz]
    pub const STATUS_TX_FREQ_HZ: u32 = 50;

    /// 診断データ送信周波数 [Hz]
    pub const DIAGNOSTIC_TX_FREQ_HZ: u32 = 1;

    /// シャーシからのコマンド想定周期 [ms]
    pub const COMMAND_PERIOD_MS: u32 = 100;

    /// コマンド途絶とみなすまでの周期数
    pub const COMMAND_TIMEOUT_PERIODS: u32 = 3;
}

/// 制御則パラメータ
pub mod control {
    /// デューティ比の上限
    pub const MAX_DUTY: f32 = 0.95;

    /// 電流誤差に対する比例ゲイン [1/A]
    pub const CURRENT_KP: f32 = 0.01;

    /// CC→CV切替の電圧差 [V]
    pub const CV_TAPER_VOLTAGE: f32 = 2.0;

    /// 回生時の基本デューティ比
    pub const BACK_EMF_BASE_DUTY: f32 = 0.3;

    /// 回生を行う最小ヘッドルーム [V]
    pub const BACK_EMF_MIN_HEADROOM: f32 = 0.5;

    /// 回生デューティを絞り始めるヘッドルーム [V]
    pub const BACK_EMF_TAPER_HEADROOM: f32 = 2.0;

    /// 回生電圧の簡易モデル係数 [V/A]
    pub const BACK_EMF_VOLTAGE_PER_AMP: f32 = 0.1;

    /// 充電→放電切替の出力電力比
    pub const DISCHARGE_ENTER_RATIO: f32 = 0.8;

    /// 放電→待機切替の出力電力比
    pub const DISCHARGE_EXIT_RATIO: f32 = 0.5;
}

/// PWM設定
pub mod pwm {
    /// スイッチング周波数 [Hz]
    pub const FREQUENCY_HZ: u32 = 100_000;

    /// デッドタイム
    pub const DEAD_TIME: u16 = 20;
}

/// CAN設定
pub mod can {
    /// CANビットレート（1Mbps、シャーシ側と共通）
    pub const DEFAULT_BITRATE: u32 = 1_000_000;
}

/// ADCフロントエンド
pub mod adc {
    /// ADC分解能（12ビット）
    pub const ADC_MAX: u16 = 4096;

    /// ADC基準電圧 [V]
    pub const VREF: f32 = 3.3;

    /// 電圧分圧抵抗 上側 [Ω]
    pub const DIVIDER_R_UPPER: f32 = 33_300.0;

    /// 電圧分圧抵抗 下側 [Ω]
    pub const DIVIDER_R_LOWER: f32 = 3_300.0;

    /// 電流センスアンプ感度 [V/A]
    pub const CURRENT_SENSE_V_PER_A: f32 = 0.05;

    /// 電流センスアンプのゼロ点 [V]（双方向センサ）
    pub const CURRENT_SENSE_ZERO_V: f32 = 1.65;

    /// 温度センサ感度 [V/°C]
    pub const TEMP_SENSE_V_PER_C: f32 = 0.01;

    /// 温度センサ 0°C 出力 [V]
    pub const TEMP_SENSE_ZERO_V: f32 = 0.5;

    /// ローパスフィルタ係数
    pub const FILTER_ALPHA: f32 = 0.5;
}
