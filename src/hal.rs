//! Hardware capability interfaces
//!
//! 制御コアはこれらのトレイトを通してのみハードウェアに触れます。
//! ファームウェアでは ADC / PWM / FDCAN で実装し、テストではモックを注入します。

use crate::error::{PowerStageError, SensorError, TelemetryError};
use crate::model::{Actuation, Measurements};
use crate::telemetry::TelemetryFrame;

/// センサ取得（1tickにつき1回呼ばれる）
pub trait SensorSource {
    fn acquire(&mut self) -> Result<Measurements, SensorError>;
}

/// ハーフブリッジ・パワーステージ
pub trait PowerStage {
    /// 起動時に一度だけ呼ばれる
    fn init(&mut self) -> Result<(), PowerStageError>;

    /// デューティ比と経路イネーブルを反映
    fn apply(&mut self, actuation: &Actuation) -> Result<(), PowerStageError>;
}

/// テレメトリ送信（ノンブロッキング）
pub trait TelemetrySink {
    fn send(&mut self, frame: &TelemetryFrame) -> Result<(), TelemetryError>;
}
