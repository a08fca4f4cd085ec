// src/test_utils.rs

//! This module contains utilities for testing.

use crate::estimator::{AccelRange, GyroRange, SensorSource};
use crate::mixer::{ActuatorSink, Rotor};
use crate::Axes;
use core::cell::Cell;
use embedded_hal::blocking::delay::DelayMs;
use embedded_time::{clock, fraction::Fraction, Clock, Instant};

/// A constant defining the tolerance within which floating-point values
/// are considered close enough to be equal.
pub const TEST_TOLERANCE: f32 = 1e-5;

/// Gravity reading of a level, resting accelerometer.
pub const GRAVITY: f32 = 9.80665;

/// Checks if two floating point numbers are close enough to be considered
/// equal.
///
/// # Arguments
/// * `target` - The target value.
/// * `value` - The value to compare against the target.
///
/// # Returns
/// `true` if the absolute difference between `target` and `value` is less than
/// `TEST_TOLERANCE`, otherwise `false`.
pub fn value_close(target: f32, value: f32) -> bool {
    value_near(target, value, TEST_TOLERANCE)
}

/// Checks if two floating point numbers are within `tolerance` of each other.
pub fn value_near(target: f32, value: f32, tolerance: f32) -> bool {
    (target - value).abs() < tolerance
}

/// Checks if each of the components in a vector is close enough to
/// be considered equal.
///
/// # Arguments
/// * `target` - The target vector as a tuple of three `f32` values.
/// * `value` - The vector to compare against the target.
///
/// # Returns
/// `true` if each component of `target` and `value` is close as per `value_close`,
/// otherwise `false`.
pub fn vector_close(target: (f32, f32, f32), value: (f32, f32, f32)) -> bool {
    vector_near(target, value, TEST_TOLERANCE)
}

/// Checks if each component of a vector is within `tolerance` of the target.
pub fn vector_near(target: (f32, f32, f32), value: (f32, f32, f32), tolerance: f32) -> bool {
    value_near(target.0, value.0, tolerance)
        && value_near(target.1, value.1, tolerance)
        && value_near(target.2, value.2, tolerance)
}

/// Scripted inertial sensor.
#[derive(Debug)]
pub struct MockSensor {
    /// Result of `begin`.
    pub begin_ok: bool,
    /// Result of `configure_accel_range`.
    pub accel_range_ok: bool,
    /// Result of `configure_gyro_range`.
    pub gyro_range_ok: bool,
    /// Last accepted accelerometer range.
    pub accel_range: Option<AccelRange>,
    /// Last accepted gyroscope range.
    pub gyro_range: Option<GyroRange>,
    /// Acceleration reported by every read.
    pub accel: Axes<f32>,
    /// Angular rate reported by every read.
    pub gyro: Axes<f32>,
    /// Whether `read` has new data.
    pub fresh: bool,
    /// Number of `read` calls.
    pub reads: u32,
    latched_accel: Axes<f32>,
    latched_gyro: Axes<f32>,
}

impl MockSensor {
    /// A healthy sensor resting level with no rotation.
    pub fn level() -> Self {
        Self {
            begin_ok: true,
            accel_range_ok: true,
            gyro_range_ok: true,
            accel_range: None,
            gyro_range: None,
            accel: Axes::new(0.0, 0.0, GRAVITY),
            gyro: Axes::default(),
            fresh: true,
            reads: 0,
            latched_accel: Axes::default(),
            latched_gyro: Axes::default(),
        }
    }
}

impl SensorSource for MockSensor {
    fn begin(&mut self) -> bool {
        self.begin_ok
    }

    fn configure_accel_range(&mut self, range: AccelRange) -> bool {
        if self.accel_range_ok {
            self.accel_range = Some(range);
        }
        self.accel_range_ok
    }

    fn configure_gyro_range(&mut self, range: GyroRange) -> bool {
        if self.gyro_range_ok {
            self.gyro_range = Some(range);
        }
        self.gyro_range_ok
    }

    fn read(&mut self) -> bool {
        self.reads += 1;
        if self.fresh {
            self.latched_accel = self.accel;
            self.latched_gyro = self.gyro;
        }
        self.fresh
    }

    fn accel(&self) -> Axes<f32> {
        self.latched_accel
    }

    fn gyro(&self) -> Axes<f32> {
        self.latched_gyro
    }
}

/// Delay that only records how long it was asked to wait.
#[derive(Debug, Default)]
pub struct MockDelay {
    /// Total requested delay, milliseconds.
    pub elapsed_ms: u32,
}

impl DelayMs<u16> for MockDelay {
    fn delay_ms(&mut self, ms: u16) {
        self.elapsed_ms += u32::from(ms);
    }
}

/// Microsecond clock advanced by hand.
#[derive(Debug, Default)]
pub struct MockClock {
    now_us: Cell<u32>,
    failing: Cell<bool>,
}

impl MockClock {
    /// Moves the clock forward, wrapping.
    pub fn advance(&self, us: u32) {
        self.now_us.set(self.now_us.get().wrapping_add(us));
    }

    /// Makes every later read fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl Clock for MockClock {
    type T = u32;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        if self.failing.get() {
            return Err(clock::Error::Unspecified);
        }
        Ok(Instant::new(self.now_us.get()))
    }
}

/// Actuator sink that keeps the latest command per rotor.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Latest command per channel.
    pub last: [f32; 4],
    /// Number of writes.
    pub writes: u32,
}

impl ActuatorSink<f32> for RecordingSink {
    fn write(&mut self, rotor: Rotor, command: f32) {
        self.last[rotor.index()] = command;
        self.writes += 1;
    }
}
