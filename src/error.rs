// src/error.rs

//! Error type shared by the estimator, the command channel and the control loop.

use core::fmt;
use embedded_time::{clock, ConversionError};

/// Sensor bring-up step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorInitStage {
    /// The sensor did not answer on its bus.
    Begin,
    /// The accelerometer full-scale range was rejected.
    AccelRange,
    /// The gyroscope full-scale range was rejected.
    GyroRange,
}

/// Setpoint field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandField {
    /// Collective throttle.
    Throttle,
    /// Pitch setpoint.
    Pitch,
    /// Roll setpoint.
    Roll,
    /// Yaw command.
    Yaw,
}

/// A setpoint message that was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDecodeError {
    /// Offending field.
    pub field: CommandField,
    /// Value as received.
    pub value: i32,
}

/// Errors raised by the stabilization pipeline.
#[derive(Debug)]
pub enum Error {
    /// Sensor bring-up failed. Fatal, the loop halts without driving motors.
    SensorInit(SensorInitStage),
    /// A tick was requested before calibration finished or after a halt.
    NotReady,
    /// A setpoint message was rejected and the previous setpoints kept.
    CommandDecode(CommandDecodeError),
    /// The monotonic clock could not be read.
    Clock(clock::Error),
    /// A clock reading could not be converted to microseconds.
    Time(ConversionError),
}

impl From<clock::Error> for Error {
    fn from(clock_error: clock::Error) -> Self {
        Error::Clock(clock_error)
    }
}

impl From<ConversionError> for Error {
    fn from(time_error: ConversionError) -> Self {
        Error::Time(time_error)
    }
}

impl From<CommandDecodeError> for Error {
    fn from(decode_error: CommandDecodeError) -> Self {
        Error::CommandDecode(decode_error)
    }
}

impl fmt::Display for SensorInitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorInitStage::Begin => f.write_str("sensor did not respond"),
            SensorInitStage::AccelRange => f.write_str("accelerometer range rejected"),
            SensorInitStage::GyroRange => f.write_str("gyroscope range rejected"),
        }
    }
}

impl fmt::Display for CommandDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} out of range: {}", self.field, self.value)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SensorInit(stage) => write!(f, "sensor init failed: {}", stage),
            Error::NotReady => f.write_str("estimator not ready"),
            Error::CommandDecode(e) => write!(f, "command discarded: {}", e),
            Error::Clock(e) => write!(f, "clock error: {:?}", e),
            Error::Time(e) => write!(f, "time conversion error: {:?}", e),
        }
    }
}
