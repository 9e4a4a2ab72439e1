//! タスク間共有状態
//!
//! 制御タスクとCANタスク、LEDタスクの間で受け渡すキュー・シグナル・コマンドスロット。

use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use supercap_controller::command::CommandSlot;
use supercap_controller::telemetry::TelemetryFrame;
use supercap_controller::Mode;

/// 送信待ちテレメトリの深さ
pub const TELEMETRY_QUEUE_DEPTH: usize = 8;

/// シャーシコマンド（CAN受信 → 制御tick）
pub static COMMAND_SLOT: CommandSlot = CommandSlot::new();

/// テレメトリフレーム（制御tick → CAN送信）
pub static TELEMETRY_QUEUE: Channel<ThreadModeRawMutex, TelemetryFrame, TELEMETRY_QUEUE_DEPTH> =
    Channel::new();

/// 運転モード変化（制御tick → LED）
pub static MODE_SIGNAL: Signal<ThreadModeRawMutex, Mode> = Signal::new();
