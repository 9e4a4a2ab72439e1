//! CAN通信タスク
//!
//! シャーシコマンドの受信とテレメトリ送信を行います。

use embassy_futures::select::{select, Either};
use embassy_stm32::can;
use embedded_can::{Id, StandardId};
use supercap_controller::can_protocol::{can_ids, parse_command};
use supercap_controller::hal::TelemetrySink;
use supercap_controller::telemetry::TelemetryFrame;
use supercap_controller::TelemetryError;

use crate::state::{COMMAND_SLOT, TELEMETRY_QUEUE};

/// 制御tickからのテレメトリをキューへ積むシンク（ノンブロッキング）
pub struct QueueTelemetry;

impl TelemetrySink for QueueTelemetry {
    fn send(&mut self, frame: &TelemetryFrame) -> Result<(), TelemetryError> {
        TELEMETRY_QUEUE
            .try_send(*frame)
            .map_err(|_| TelemetryError::QueueFull)
    }
}

/// CAN通信タスク - コマンド受信とテレメトリ送信
#[embassy_executor::task]
pub async fn can_task(can: can::Can<'static>) {
    let (mut tx, mut rx, _properties) = can.split();

    info!("CAN task started");

    loop {
        match select(rx.read(), TELEMETRY_QUEUE.receive()).await {
            Either::First(Ok(envelope)) => {
                let frame = envelope.frame;

                // IDを数値として取得
                let id_raw = match frame.header().id() {
                    Id::Standard(std_id) => std_id.as_raw() as u32,
                    Id::Extended(ext_id) => ext_id.as_raw(),
                };

                match id_raw {
                    can_ids::COMMAND => {
                        if let Some(command) = parse_command(frame.data()) {
                            if COMMAND_SLOT.publish(command) {
                                debug!("Unconsumed command overwritten");
                            }
                        }
                    }
                    _ => {
                        debug!("Unknown CAN ID: {:#x}", id_raw);
                    }
                }
            }
            Either::First(Err(_e)) => {
                warn!("CAN RX error");
            }
            Either::Second(telemetry) => {
                let Some(std_id) = StandardId::new(telemetry.id as u16) else {
                    error!("Invalid telemetry ID: {:#x}", telemetry.id);
                    continue;
                };
                match can::frame::Frame::new_data(Id::Standard(std_id), &telemetry.data) {
                    Ok(frame) => {
                        let _ = tx.write(&frame).await;
                    }
                    Err(_) => error!("Failed to build frame {:#x}", telemetry.id),
                }
            }
        }
    }
}
