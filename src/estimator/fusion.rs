// src/estimator/fusion.rs

//! # Complementary Filter
//!
//! Compute functions for accelerometer/gyroscope fusion. A gyroscope
//! integrates smoothly but drifts; the gravity vector seen by the
//! accelerometer gives an absolute but noisy tilt. A fixed weight blends
//! the two each step:
//!
//! ```text
//! angle = w * (angle + rate * dt) + (1 - w) * accel_angle
//! ```
//!
//! Yaw cannot be observed from gravity and is left to pure gyro
//! integration.

use super::ImuSample;
use crate::Axes;
use num_traits::Float;

/// Standard gravity in m/s².
pub const STANDARD_GRAVITY: f32 = 9.80665;

/// Tilt implied by the gravity vector alone, as `(pitch, roll)` in radians.
pub fn accel_tilt(accel: Axes<f32>) -> (f32, f32) {
    let pitch = Float::atan2(-accel.y, accel.z);
    let roll = Float::atan2(-accel.x, Float::sqrt(accel.y * accel.y + accel.z * accel.z));
    (pitch, roll)
}

/// One complementary-filter step for a single axis.
///
/// - `previous`: fused angle from the last step, radians.
/// - `rate`: gyro rate about the same axis, rad/s.
/// - `dt`: seconds since the last step.
/// - `accel_angle`: accelerometer-only angle, radians.
/// - `gyro_weight`: trust placed in the gyro path, in `[0, 1]`.
pub fn complementary_step(
    previous: f32,
    rate: f32,
    dt: f32,
    accel_angle: f32,
    gyro_weight: f32,
) -> f32 {
    gyro_weight * (previous + rate * dt) + (1.0 - gyro_weight) * accel_angle
}

/// Removes calibration offsets from a raw sample.
///
/// The Z accelerometer axis is also inverted and shifted by one gravity,
/// because the offset captured on a level, resting airframe already holds
/// the 1 g reaction.
pub fn apply_offsets(raw: &ImuSample, offsets: &ImuSample) -> ImuSample {
    ImuSample {
        accel: Axes::new(
            raw.accel.x - offsets.accel.x,
            raw.accel.y - offsets.accel.y,
            -((raw.accel.z - offsets.accel.z) - STANDARD_GRAVITY),
        ),
        gyro: Axes::new(
            raw.gyro.x - offsets.gyro.x,
            raw.gyro.y - offsets.gyro.y,
            raw.gyro.z - offsets.gyro.z,
        ),
    }
}
