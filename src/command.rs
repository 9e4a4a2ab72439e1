//! Command handoff between the CAN receive context and the control tick
//!
//! CAN受信側が `publish` し、制御tickが `take` する単一スロット。
//! 未消費のコマンドは上書きされ、取り出したコマンドは二度と適用されません。

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::can_protocol::ChassisCommand;
use crate::config::rates;

/// Single-producer / single-consumer command slot
pub struct CommandSlot {
    inner: Mutex<CriticalSectionRawMutex, Cell<Option<ChassisCommand>>>,
}

impl CommandSlot {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(None)),
        }
    }

    /// Store a decoded command, returns `true` if an unconsumed one was overwritten
    pub fn publish(&self, command: ChassisCommand) -> bool {
        self.inner
            .lock(|slot| slot.replace(Some(command)))
            .is_some()
    }

    /// Take the pending command, leaving the slot empty
    pub fn take(&self) -> Option<ChassisCommand> {
        self.inner.lock(|slot| slot.take())
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock(|slot| slot.get().is_some())
    }
}

impl Default for CommandSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// コマンド途絶ウォッチドッグ
///
/// 起動時から監視を開始し、`timeout_ticks` を超えてコマンドが届かなければ期限切れ。
#[derive(Debug, Clone, Copy)]
pub struct CommandWatchdog {
    timeout_ticks: u32,
    silent_ticks: u32,
}

impl CommandWatchdog {
    pub const fn new(timeout_ticks: u32) -> Self {
        Self {
            timeout_ticks,
            silent_ticks: 0,
        }
    }

    /// コマンド受信を記録
    pub fn feed(&mut self) {
        self.silent_ticks = 0;
    }

    /// 1 tick 進め、期限切れなら `true`
    pub fn tick(&mut self) -> bool {
        self.silent_ticks = self.silent_ticks.saturating_add(1);
        self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        self.silent_ticks > self.timeout_ticks
    }

    pub fn timeout_ticks(&self) -> u32 {
        self.timeout_ticks
    }
}

impl Default for CommandWatchdog {
    fn default() -> Self {
        // 100ms x 3 = 300 ticks @ 1kHz
        Self::new(
            rates::COMMAND_PERIOD_MS * rates::COMMAND_TIMEOUT_PERIODS * rates::CONTROL_LOOP_FREQ_HZ
                / 1000,
        )
    }
}
