//! Per-tick supervisor
//!
//! ハードウェア抽象（センサ、パワーステージ、テレメトリ）をコントローラに接続し、
//! 1 tick 内の処理順序を固定します:
//! コマンド適用 → センサ取得 → 安全監視/状態遷移/制御則 → 出力反映 → テレメトリ

use crate::command::{CommandSlot, CommandWatchdog};
use crate::controller::Controller;
use crate::error::InitError;
use crate::hal::{PowerStage, SensorSource, TelemetrySink};
use crate::model::{Actuation, Mode};
use crate::telemetry::{self, TelemetryFrame, TelemetryScheduler};

pub struct Supervisor<'a, S, P, T> {
    controller: Controller,
    watchdog: CommandWatchdog,
    scheduler: TelemetryScheduler,
    commands: &'a CommandSlot,
    sensors: S,
    stage: P,
    telemetry: T,
}

impl<'a, S, P, T> Supervisor<'a, S, P, T>
where
    S: SensorSource,
    P: PowerStage,
    T: TelemetrySink,
{
    pub fn new(commands: &'a CommandSlot, sensors: S, stage: P, telemetry: T) -> Self {
        Self::with_controller(Controller::new(), commands, sensors, stage, telemetry)
    }

    pub fn with_controller(
        controller: Controller,
        commands: &'a CommandSlot,
        sensors: S,
        stage: P,
        telemetry: T,
    ) -> Self {
        Self {
            controller,
            watchdog: CommandWatchdog::default(),
            scheduler: TelemetryScheduler::default(),
            commands,
            sensors,
            stage,
            telemetry,
        }
    }

    /// 起動時の初期化
    ///
    /// 失敗した場合は ERROR に遷移しますが、呼び出し側は `tick` を続けて
    /// テレメトリを送り続けます。
    pub fn init(&mut self) -> Result<(), InitError> {
        let result = self.bring_up();
        match result {
            Ok(()) => info!("Supercap controller initialized"),
            Err(e) => {
                error!("Bring-up failed: {:?}", e);
                self.controller.enter_error();
            }
        }
        result
    }

    fn bring_up(&mut self) -> Result<(), InitError> {
        self.stage.init()?;
        self.stage.apply(&Actuation::OFF)?;
        self.sensors.acquire()?;
        Ok(())
    }

    /// 1 tick（1ms）分の処理
    pub fn tick(&mut self) -> Actuation {
        if let Some(command) = self.commands.take() {
            self.watchdog.feed();
            self.controller.apply_command(&command);
        }
        let comm_lost = self.watchdog.tick();

        let reading = self.sensors.acquire();
        let actuation = self.controller.tick(reading, comm_lost);

        if let Err(e) = self.stage.apply(&actuation) {
            if self.controller.mode() != Mode::Error {
                error!("Power stage apply failed: {:?}", e);
            }
            self.controller.enter_error();
            // 停止を試みる（失敗しても次tickで再試行）
            let _ = self.stage.apply(&Actuation::OFF);
        }

        let due = self.scheduler.poll();
        if due.status {
            let frame = telemetry::status_frame(self.controller.state());
            self.send(&frame);
        }
        if due.diagnostics {
            let frame = telemetry::diagnostics_frame(self.controller.state());
            self.send(&frame);
        }

        self.controller.state().actuation()
    }

    fn send(&mut self, frame: &TelemetryFrame) {
        if let Err(e) = self.telemetry.send(frame) {
            warn!("Telemetry 0x{:x} dropped: {:?}", frame.id, e);
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn power_stage(&self) -> &P {
        &self.stage
    }

    pub fn power_stage_mut(&mut self) -> &mut P {
        &mut self.stage
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }
}
