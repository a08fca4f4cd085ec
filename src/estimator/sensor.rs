// src/estimator/sensor.rs

//! # Inertial Sensor Interface
//!
//! The estimator consumes an inertial measurement unit through the
//! [`SensorSource`] trait. Bus setup and register access live in the
//! implementation; the estimator only needs bring-up, range selection,
//! a "new sample ready" read, and SI-unit accessors.

use crate::error::SensorInitStage;
use crate::Axes;

/// Accelerometer full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelRange {
    /// ±2 g
    G2,
    /// ±4 g
    G4,
    /// ±8 g
    G8,
    /// ±16 g
    G16,
}

/// Gyroscope full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    /// ±250 °/s
    Dps250,
    /// ±500 °/s
    Dps500,
    /// ±1000 °/s
    Dps1000,
    /// ±2000 °/s
    Dps2000,
}

/// One accelerometer and gyroscope reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuSample {
    /// Specific force in m/s².
    pub accel: Axes<f32>,
    /// Angular rate in rad/s.
    pub gyro: Axes<f32>,
}

/// Source of raw inertial samples.
pub trait SensorSource {
    /// Starts the sensor. Returns `false` if it does not respond.
    fn begin(&mut self) -> bool;

    /// Selects the accelerometer range. Returns `false` if rejected.
    fn configure_accel_range(&mut self, range: AccelRange) -> bool;

    /// Selects the gyroscope range. Returns `false` if rejected.
    fn configure_gyro_range(&mut self, range: GyroRange) -> bool;

    /// Latches a new sample. Returns `false` when no new data is ready,
    /// which is not a fault.
    fn read(&mut self) -> bool;

    /// Acceleration of the last latched sample in m/s².
    fn accel(&self) -> Axes<f32>;

    /// Angular rate of the last latched sample in rad/s.
    fn gyro(&self) -> Axes<f32>;

    /// Applies both ranges, reporting the first one that failed.
    fn configure_ranges(
        &mut self,
        accel: AccelRange,
        gyro: GyroRange,
    ) -> Result<(), SensorInitStage> {
        if !self.configure_accel_range(accel) {
            return Err(SensorInitStage::AccelRange);
        }
        if !self.configure_gyro_range(gyro) {
            return Err(SensorInitStage::GyroRange);
        }
        Ok(())
    }

    /// Both readings of the last latched sample.
    fn sample(&self) -> ImuSample {
        ImuSample {
            accel: self.accel(),
            gyro: self.gyro(),
        }
    }
}

impl<S: SensorSource + ?Sized> SensorSource for &mut S {
    fn begin(&mut self) -> bool {
        (**self).begin()
    }

    fn configure_accel_range(&mut self, range: AccelRange) -> bool {
        (**self).configure_accel_range(range)
    }

    fn configure_gyro_range(&mut self, range: GyroRange) -> bool {
        (**self).configure_gyro_range(range)
    }

    fn read(&mut self) -> bool {
        (**self).read()
    }

    fn accel(&self) -> Axes<f32> {
        (**self).accel()
    }

    fn gyro(&self) -> Axes<f32> {
        (**self).gyro()
    }
}
