//! LED制御タスク
//!
//! 運転モードを3つのLEDで表示します。
//! LED1=アクティブ（充電/放電/回生）、LED2=待機、LED3=異常（ERROR/PROTECT）

use embassy_stm32::gpio::Output;
use crate::state::MODE_SIGNAL;

/// LED制御タスク
#[embassy_executor::task]
pub async fn led_task(
    mut led1: Output<'static>,
    mut led2: Output<'static>,
    mut led3: Output<'static>,
) {
    info!("LED task started");

    loop {
        let mode = MODE_SIGNAL.wait().await;

        let active = mode.is_active();
        let fault = mode.is_fault();

        led1.set_level(active.into());
        led2.set_level((!active && !fault).into());
        led3.set_level(fault.into());
    }
}
