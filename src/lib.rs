// src/lib.rs

//! # Quadcopter Attitude Stabilization
//!
//! This crate provides a `no_std`, no-alloc attitude estimation and
//! stabilization pipeline for an X-frame quadcopter:
//!
//! - [`filter`]: sliding-window median over an order-statistic window.
//! - [`estimator`]: calibration and complementary accelerometer/gyro fusion.
//! - [`pid`]: clamped single-axis PID regulation with input gating.
//! - [`mixer`]: X-frame motor mixing with saturation.
//! - [`command`]: setpoint hand-off and emergency stop latch.
//! - [`control_loop`]: the per-tick orchestration of all of the above.
//!
//! Sensors, actuators, delays and clocks are injected through
//! [`SensorSource`], [`ActuatorSink`], `embedded_hal` delays and
//! `embedded_time` clocks.

#![no_std]
#![deny(missing_docs)]

pub mod command;
pub mod control_loop;
pub mod diagnostics;
pub mod error;
pub mod estimator;
pub mod filter;
pub mod mixer;
pub mod number;
pub mod pid;

#[doc(inline)]
pub use command::{CommandChannel, CommandConfig, ControlInputs, RawCommand, StopReason};
#[doc(inline)]
pub use control_loop::{ControlLoop, ControlLoopConfig, StabilizationMode, TickTrace};
pub use error::Error;
#[doc(inline)]
pub use estimator::{
    Attitude, AttitudeEstimator, EstimatorConfig, EstimatorState, ImuSample, SensorSource,
};
pub use filter::OrderStatisticFilter;
#[doc(inline)]
pub use mixer::{ActuatorSink, MixerConfig, MixerInput, MotorCommand, MotorMixer, Rotor};
pub use number::{Axes, Number};
pub use pid::{Regulator, RegulatorConfig};

#[cfg(test)]
mod test_utils;
