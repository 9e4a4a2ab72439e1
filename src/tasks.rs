//! タスクモジュール
//!
//! 各タスクの実装を分離して管理します。

pub mod can;
pub mod control;
pub mod led;

// タスク関数を再エクスポート
pub use can::can_task;
pub use control::control_task;
pub use led::led_task;
