//! Error types of the hardware capability interfaces.

/// Sensor acquisition failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// ADC conversion did not complete
    Timeout,
    /// Raw sample outside the converter range
    OutOfRange,
    /// Converted value is NaN or infinite
    NonFinite,
}

/// Power stage (PWM) failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerStageError {
    /// Stage was driven before `init`
    NotInitialized,
    /// Charge and discharge legs requested at the same time
    ShootThrough,
    /// Gate driver reported a fault
    DriverFault,
}

/// Telemetry transmission failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError {
    /// Outbound queue is full, frame dropped
    QueueFull,
    /// Bus is off or the frame could not be built
    Bus,
}

/// Start-up bring-up failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    PowerStage(PowerStageError),
    Sensor(SensorError),
}

impl From<PowerStageError> for InitError {
    fn from(e: PowerStageError) -> Self {
        InitError::PowerStage(e)
    }
}

impl From<SensorError> for InitError {
    fn from(e: SensorError) -> Self {
        InitError::Sensor(e)
    }
}
