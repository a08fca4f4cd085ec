// src/pid/regulator.rs

//! # Single-Axis Regulator
//!
//! A clamped PID regulator for one attitude axis, built on
//! `piddiy::PidController` with a custom compute callback.
//!
//! `compute` takes the time step in milliseconds. The integral is
//! accumulated in error·seconds and clamped so that `ki * integral` never
//! leaves the output range; with `ki = 0` it is held at zero. The final
//! output is clamped to `[output_min, output_max]`.

use crate::Number;
use piddiy::PidController;

/// Control data for the regulator compute callback.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegulatorData<T> {
    /// The measured value.
    pub input: T,
    /// The time delta since the last computation, in seconds.
    pub dt: T,
    /// Lower bound of the accumulated integral.
    pub integral_min: T,
    /// Upper bound of the accumulated integral.
    pub integral_max: T,
}

/// Regulator compute callback.
pub fn compute_regulator<T: Number>(
    pid: &mut PidController<T, RegulatorData<T>>,
    data: RegulatorData<T>,
) -> (T, T, T) {
    let error = pid.set_point - data.input;
    let integral = (pid.integral + error * data.dt).clamp(data.integral_min, data.integral_max);
    let derivative = if data.dt > T::zero() {
        (error - pid.error) / data.dt
    } else {
        T::zero()
    };

    (error, integral, derivative)
}

/// Gains and limits for a [`Regulator`].
#[derive(Clone, Copy)]
pub struct RegulatorConfig<T: Number> {
    /// Proportional gain.
    pub kp: T,
    /// Integral gain, per second.
    pub ki: T,
    /// Derivative gain, seconds.
    pub kd: T,
    /// Lowest output.
    pub output_min: T,
    /// Highest output.
    pub output_max: T,
}

impl<T: Number> RegulatorConfig<T> {
    /// Creates a configuration with the attitude-axis defaults: `kp` 2.5,
    /// `ki` 0, `kd` 2 and ±150 output limits.
    pub fn new() -> Self {
        Self {
            kp: constant(2.5),
            ki: T::zero(),
            kd: constant(2.0),
            output_min: constant(-150.0),
            output_max: constant(150.0),
        }
    }

    /// Replaces both output limits with ±`limit`.
    pub fn symmetric_limits(mut self, limit: T) -> Self {
        let limit = if limit < T::zero() { -limit } else { limit };
        self.output_min = -limit;
        self.output_max = limit;
        self
    }
}

impl<T: Number> Default for RegulatorConfig<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn constant<T: Number>(value: f32) -> T {
    T::from_f32(value).unwrap_or_else(T::zero)
}

/// Clamped PID regulator.
pub struct Regulator<T: Number> {
    pid: PidController<T, RegulatorData<T>>,
    input: T,
    output: T,
    output_min: T,
    output_max: T,
}

impl<T: Number> Regulator<T> {
    /// Creates a regulator from `config`.
    pub fn with_config(config: RegulatorConfig<T>) -> Self {
        let mut pid = PidController::new();
        pid.compute_fn(compute_regulator)
            .set_point(T::zero())
            .kp(config.kp)
            .ki(config.ki)
            .kd(config.kd);

        let (output_min, output_max) = if config.output_max < config.output_min {
            (config.output_max, config.output_min)
        } else {
            (config.output_min, config.output_max)
        };

        Regulator {
            pid,
            input: T::zero(),
            output: T::zero(),
            output_min,
            output_max,
        }
    }

    /// Creates a regulator with default settings.
    pub fn new() -> Self {
        Self::with_config(RegulatorConfig::new())
    }

    /// Sets the target value.
    pub fn set_setpoint(&mut self, set_point: T) {
        self.pid.set_point(set_point);
    }

    /// Sets the measured value used by the next `compute`.
    pub fn set_input(&mut self, input: T) {
        self.input = input;
    }

    /// Runs one step `dt_ms` milliseconds after the previous one and returns
    /// the clamped output.
    pub fn compute(&mut self, dt_ms: T) -> T {
        let (integral_min, integral_max) = self.integral_limits();
        let data = RegulatorData {
            input: self.input,
            dt: millis_to_seconds(dt_ms),
            integral_min,
            integral_max,
        };

        self.output = self.pid.compute(data).clamp(self.output_min, self.output_max);
        self.output
    }

    /// Clears the accumulated integral and the stored error.
    pub fn reset(&mut self) {
        self.pid.integral = T::zero();
        self.pid.error = T::zero();
        self.output = T::zero();
    }

    /// Target value.
    pub fn setpoint(&self) -> T {
        self.pid.set_point
    }

    /// Measured value of the last step.
    pub fn input(&self) -> T {
        self.input
    }

    /// Output of the last step.
    pub fn output(&self) -> T {
        self.output
    }

    /// Accumulated integral, error·seconds.
    pub fn integral(&self) -> T {
        self.pid.integral
    }

    /// Output limits as `(min, max)`.
    pub fn limits(&self) -> (T, T) {
        (self.output_min, self.output_max)
    }

    // Bounds that keep `ki * integral` inside the output range.
    fn integral_limits(&self) -> (T, T) {
        let ki = self.pid.ki;
        if ki > T::zero() {
            (self.output_min / ki, self.output_max / ki)
        } else if ki < T::zero() {
            (self.output_max / ki, self.output_min / ki)
        } else {
            (T::zero(), T::zero())
        }
    }
}

impl<T: Number> Default for Regulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn millis_to_seconds<T: Number>(dt_ms: T) -> T {
    match T::from_u16(1000) {
        Some(ms_per_s) => dt_ms / ms_per_s,
        None => T::zero(),
    }
}

/// Regulator input after the ground and noise deadbands.
///
/// With throttle at or below `throttle_deadband` the airframe is treated as
/// resting and the input is zero. Otherwise angles whose magnitude does not
/// exceed `min_angle` are reported as zero.
pub fn gate_input<T: Number>(throttle: T, throttle_deadband: T, angle: T, min_angle: T) -> T {
    if throttle <= throttle_deadband {
        return T::zero();
    }
    let magnitude = if angle < T::zero() { -angle } else { angle };
    if magnitude > min_angle {
        angle
    } else {
        T::zero()
    }
}
