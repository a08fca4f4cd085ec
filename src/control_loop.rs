// src/control_loop.rs

//! # Stabilization Control Loop
//!
//! Owns the estimator, the pitch and roll regulators, the mixer and the
//! actuators, and runs one stabilization cycle per [`ControlLoop::tick`]:
//!
//! 1. take the setpoints from the [`CommandChannel`],
//! 2. latch and fuse a sensor sample,
//! 3. clamp the attitude to ±`max_angle_deg`,
//! 4. gate the angles, run the regulators, mix and write the rotors.
//!
//! A stop latched on the channel makes that tick reset both regulators and
//! write idle to every rotor, whatever else arrived in the meantime. The
//! stop is served before the clock is read.

use crate::command::{CommandChannel, CommandConfig, ControlInputs};
use crate::diagnostics::LogRateLimiter;
use crate::error::Error;
use crate::estimator::{AttitudeEstimator, EstimatorState, SensorSource};
use crate::mixer::{ActuatorSink, MixerConfig, MixerInput, MotorCommand, MotorMixer};
use crate::pid::{gate_input, Regulator, RegulatorConfig};
use embedded_hal::blocking::delay::DelayMs;
use embedded_time::{duration::Microseconds, Clock};
use log::{debug, error, info, warn};
use num_traits::Float;

/// How regulator outputs reach the mixer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StabilizationMode {
    /// Regulators track the pitch and roll setpoints; their outputs, scaled
    /// by `correction_ratio`, are the only pitch/roll terms in the mix.
    Regulated,
    /// Setpoints go straight to the mixer and each gated angle is fed back
    /// as `-correction_ratio * angle`. Regulators are idle.
    Proportional,
}

/// Tunables for the control loop.
#[derive(Clone, Copy)]
pub struct ControlLoopConfig {
    /// Attitude magnitude limit fed to the regulators, degrees.
    pub max_angle_deg: f32,
    /// Angles at or below this magnitude are treated as level, degrees.
    pub min_angle_deg: f32,
    /// Throttle at or below this keeps the regulator inputs at zero.
    pub throttle_deadband: f32,
    /// Pitch/roll feedback scheme.
    pub stabilization: StabilizationMode,
    /// Scale applied to the stabilization corrections.
    pub correction_ratio: f32,
    /// Minimum spacing of the per-axis debug dump, milliseconds.
    pub diagnostics_period_ms: u32,
    /// Pitch regulator gains and limits.
    pub pitch: RegulatorConfig<f32>,
    /// Roll regulator gains and limits.
    pub roll: RegulatorConfig<f32>,
    /// Mixer saturation.
    pub mixer: MixerConfig<f32>,
}

impl ControlLoopConfig {
    /// Creates a configuration with the flight-tested defaults.
    pub fn new() -> Self {
        Self {
            max_angle_deg: 25.0,
            min_angle_deg: 1.0,
            throttle_deadband: 0.0,
            stabilization: StabilizationMode::Regulated,
            correction_ratio: 0.8,
            diagnostics_period_ms: 500,
            pitch: RegulatorConfig::new(),
            roll: RegulatorConfig::new(),
            mixer: MixerConfig::new(),
        }
    }

    /// Sets the mixer saturation and both regulator limits to
    /// `max_motor_value`. Pair it with [`CommandConfig::for_mixer`] so
    /// full throttle maps onto the same value.
    pub fn with_max_motor_value(mut self, max_motor_value: f32) -> Self {
        self.mixer.max_motor_value = max_motor_value;
        self.pitch = self.pitch.symmetric_limits(max_motor_value);
        self.roll = self.roll.symmetric_limits(max_motor_value);
        self
    }
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-instance stabilization loop.
pub struct ControlLoop<'a, S, A, C> {
    estimator: AttitudeEstimator<S>,
    actuators: A,
    commands: &'a CommandChannel,
    clock: C,
    config: ControlLoopConfig,
    pitch_regulator: Regulator<f32>,
    roll_regulator: Regulator<f32>,
    mixer: MotorMixer<f32>,
    halted: bool,
    last_regulator_us: Option<u32>,
    diagnostics: LogRateLimiter,
    trace: TickTrace,
}

/// What the last regular tick fed to the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickTrace {
    /// Setpoints taken from the channel.
    pub inputs: ControlInputs,
    /// Pitch after clamping and gating, degrees.
    pub gated_pitch: f32,
    /// Roll after clamping and gating, degrees.
    pub gated_roll: f32,
    /// Mixer input, including the stabilization corrections.
    pub mix: MixerInput<f32>,
}

impl<'a, S, A, C> ControlLoop<'a, S, A, C>
where
    S: SensorSource,
    A: ActuatorSink<f32>,
    C: Clock<T = u32>,
{
    /// Assembles a loop. Nothing is written to the actuators until
    /// [`start`](Self::start) has succeeded.
    ///
    /// A negative `max_angle_deg` is taken by magnitude; NaN falls back to
    /// the default limit.
    pub fn new(
        estimator: AttitudeEstimator<S>,
        actuators: A,
        commands: &'a CommandChannel,
        clock: C,
        mut config: ControlLoopConfig,
    ) -> Self {
        config.max_angle_deg = if config.max_angle_deg.is_nan() {
            warn!("max_angle_deg is NaN, using the default");
            ControlLoopConfig::new().max_angle_deg
        } else {
            Float::abs(config.max_angle_deg)
        };
        if !throttle_scale_matches(commands.config(), &config.mixer) {
            warn!(
                "full throttle maps to {} but the mixer saturates at {}",
                commands.config().max_motor_value,
                config.mixer.max_motor_value
            );
        }

        Self {
            estimator,
            actuators,
            commands,
            clock,
            pitch_regulator: Regulator::with_config(config.pitch),
            roll_regulator: Regulator::with_config(config.roll),
            mixer: MotorMixer::new(config.mixer),
            diagnostics: LogRateLimiter::new(config.diagnostics_period_ms),
            config,
            halted: false,
            last_regulator_us: None,
            trace: TickTrace::default(),
        }
    }

    /// Brings the sensor up and calibrates.
    ///
    /// A sensor failure halts the loop for good: every later tick returns
    /// [`Error::NotReady`] and the actuators are never written.
    pub fn start<D: DelayMs<u16>>(&mut self, delay: &mut D) -> Result<(), Error> {
        if let Err(e) = self.estimator.init(delay) {
            error!("halting control loop: {}", e);
            self.halted = true;
            return Err(e);
        }
        info!("control loop ready");
        Ok(())
    }

    /// Runs one stabilization cycle and returns the commands written.
    ///
    /// A pending emergency stop is served before anything that can fail,
    /// so idle reaches the rotors even when the clock cannot be read.
    pub fn tick(&mut self) -> Result<MotorCommand<f32>, Error> {
        if self.halted || self.estimator.state() != EstimatorState::Ready {
            return Err(Error::NotReady);
        }

        let snapshot = self.commands.snapshot();
        if let Some(reason) = snapshot.stopped {
            warn!("motors to idle: {:?}", reason);
            self.pitch_regulator.reset();
            self.roll_regulator.reset();
            self.last_regulator_us = None;
            let idle = MotorCommand::idle();
            idle.write_to(&mut self.actuators);
            return Ok(idle);
        }

        let now_us = self.micros_since_epoch()?;

        self.estimator.update_data();
        self.estimator.process(now_us);
        let attitude = self.estimator.attitude();
        let max_angle = self.config.max_angle_deg;
        let pitch = attitude.pitch_deg.clamp(-max_angle, max_angle);
        let roll = attitude.roll_deg.clamp(-max_angle, max_angle);

        let input = self.stabilize(snapshot.inputs, pitch, roll, now_us);
        let command = self.mixer.mix(input);
        command.write_to(&mut self.actuators);

        if self.diagnostics.should_log(now_us) {
            let trace = &self.trace;
            debug!(
                "pitch sp {} in {} corr {} | roll sp {} in {} corr {} | motors {:?}",
                trace.inputs.pitch,
                trace.gated_pitch,
                trace.mix.stab_pitch,
                trace.inputs.roll,
                trace.gated_roll,
                trace.mix.stab_roll,
                command.as_array()
            );
        }

        Ok(command)
    }

    fn stabilize(
        &mut self,
        inputs: ControlInputs,
        pitch: f32,
        roll: f32,
        now_us: u32,
    ) -> MixerInput<f32> {
        let ratio = self.config.correction_ratio;
        let deadband = self.config.throttle_deadband;
        let min_angle = self.config.min_angle_deg;
        let gated_pitch = gate_input(inputs.throttle, deadband, pitch, min_angle);
        let gated_roll = gate_input(inputs.throttle, deadband, roll, min_angle);

        let mix = match self.config.stabilization {
            StabilizationMode::Regulated => {
                let dt_ms = match self.last_regulator_us {
                    Some(last) => now_us.wrapping_sub(last) as f32 / 1000.0,
                    None => 0.0,
                };
                self.last_regulator_us = Some(now_us);

                self.pitch_regulator.set_setpoint(inputs.pitch);
                self.pitch_regulator.set_input(gated_pitch);
                self.roll_regulator.set_setpoint(inputs.roll);
                self.roll_regulator.set_input(gated_roll);

                MixerInput {
                    throttle: inputs.throttle,
                    pitch: 0.0,
                    roll: 0.0,
                    yaw: inputs.yaw,
                    stab_pitch: self.pitch_regulator.compute(dt_ms) * ratio,
                    stab_roll: self.roll_regulator.compute(dt_ms) * ratio,
                }
            }
            StabilizationMode::Proportional => MixerInput {
                throttle: inputs.throttle,
                pitch: inputs.pitch,
                roll: inputs.roll,
                yaw: inputs.yaw,
                stab_pitch: -ratio * gated_pitch,
                stab_roll: -ratio * gated_roll,
            },
        };

        self.trace = TickTrace {
            inputs,
            gated_pitch,
            gated_roll,
            mix,
        };
        mix
    }

    fn micros_since_epoch(&self) -> Result<u32, Error> {
        let instant = self.clock.try_now()?;
        let micros = Microseconds::<u32>::try_from(instant.duration_since_epoch())?;
        Ok(micros.0)
    }

    /// Whether a fatal sensor failure stopped the loop.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Attitude estimator.
    pub fn estimator(&self) -> &AttitudeEstimator<S> {
        &self.estimator
    }

    /// Estimator, mutably.
    pub fn estimator_mut(&mut self) -> &mut AttitudeEstimator<S> {
        &mut self.estimator
    }

    /// Actuator sink.
    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    /// Monotonic clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Pitch regulator.
    pub fn pitch_regulator(&self) -> &Regulator<f32> {
        &self.pitch_regulator
    }

    /// Roll regulator.
    pub fn roll_regulator(&self) -> &Regulator<f32> {
        &self.roll_regulator
    }

    /// Active configuration.
    pub fn config(&self) -> &ControlLoopConfig {
        &self.config
    }

    /// Setpoints, gated angles and corrections of the last regular tick.
    pub fn last_trace(&self) -> TickTrace {
        self.trace
    }
}

/// Whether full throttle on `commands` lands exactly on the mixer
/// saturation.
pub fn throttle_scale_matches(commands: &CommandConfig, mixer: &MixerConfig<f32>) -> bool {
    commands.max_motor_value as f32 == mixer.max_motor_value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandConfig, RawCommand, StopReason};
    use crate::error::SensorInitStage;
    use crate::estimator::EstimatorConfig;
    use crate::test_utils::*;
    use crate::Axes;

    const TICK_US: u32 = 10_000;

    fn estimator(sensor: MockSensor) -> AttitudeEstimator<MockSensor> {
        AttitudeEstimator::new(
            sensor,
            EstimatorConfig {
                gyro_weight: 0.98,
                calibration_samples: 20,
                median_window: 3,
                ..EstimatorConfig::new()
            },
        )
    }

    fn started<'a>(
        channel: &'a CommandChannel,
        config: ControlLoopConfig,
    ) -> ControlLoop<'a, MockSensor, RecordingSink, MockClock> {
        let mut control = ControlLoop::new(
            estimator(MockSensor::level()),
            RecordingSink::default(),
            channel,
            MockClock::default(),
            config,
        );
        control.start(&mut MockDelay::default()).unwrap();
        control
    }

    fn step(
        control: &mut ControlLoop<'_, MockSensor, RecordingSink, MockClock>,
    ) -> MotorCommand<f32> {
        control.clock().advance(TICK_US);
        control.tick().unwrap()
    }

    fn raw(throttle: i32, pitch: i32, roll: i32, yaw: i32) -> RawCommand {
        RawCommand {
            throttle,
            pitch,
            roll,
            yaw,
        }
    }

    #[test]
    fn test_tick_before_start_is_not_ready() {
        let channel = CommandChannel::default();
        let mut control = ControlLoop::new(
            estimator(MockSensor::level()),
            RecordingSink::default(),
            &channel,
            MockClock::default(),
            ControlLoopConfig::new(),
        );
        assert!(matches!(control.tick(), Err(Error::NotReady)));
        assert_eq!(control.actuators().writes, 0);
    }

    #[test]
    fn test_sensor_failure_halts_without_output() {
        let channel = CommandChannel::default();
        let mut sensor = MockSensor::level();
        sensor.accel_range_ok = false;
        let mut control = ControlLoop::new(
            estimator(sensor),
            RecordingSink::default(),
            &channel,
            MockClock::default(),
            ControlLoopConfig::new(),
        );

        let result = control.start(&mut MockDelay::default());
        assert!(matches!(
            result,
            Err(Error::SensorInit(SensorInitStage::AccelRange))
        ));
        assert!(control.is_halted());

        channel.submit(raw(180, 0, 0, 0)).unwrap();
        for _ in 0..10 {
            control.clock().advance(TICK_US);
            assert!(matches!(control.tick(), Err(Error::NotReady)));
        }
        assert_eq!(control.actuators().writes, 0, "No motor output ever issued.");
    }

    #[test]
    fn test_level_hover_is_symmetric() {
        let channel = CommandChannel::default();
        let mut control = started(&channel, ControlLoopConfig::new());
        channel.submit(raw(90, 0, 0, 0)).unwrap();

        let mut command = MotorCommand::idle();
        for _ in 0..50 {
            command = step(&mut control);
        }
        assert_eq!(command.as_array(), [75.0; 4], "Level hover drives all rotors equally.");
        assert_eq!(control.actuators().last, [75.0; 4]);
    }

    #[test]
    fn test_emergency_stop_wins_over_racing_setpoints() {
        let channel = CommandChannel::default();
        channel.connect();
        let mut control = started(&channel, ControlLoopConfig::new());

        channel.submit(raw(120, 10, -10, 10)).unwrap();
        for _ in 0..5 {
            step(&mut control);
        }
        assert!(
            control.actuators().last.iter().any(|&c| c > 0.0),
            "Motors should be running before the stop."
        );

        channel.link_lost();
        let _ = channel.submit(raw(180, 20, 20, 20));

        let command = step(&mut control);
        assert_eq!(command, MotorCommand::idle());
        assert_eq!(control.actuators().last, [0.0; 4], "All rotors idle on the next tick.");
        assert!(value_close(0.0, control.pitch_regulator().integral()));

        let command = step(&mut control);
        assert_eq!(command, MotorCommand::idle(), "Idle holds until new setpoints.");
    }

    #[test]
    fn test_stop_reason_is_reported_once() {
        let channel = CommandChannel::default();
        let mut control = started(&channel, ControlLoopConfig::new());
        channel.submit(raw(90, 0, 0, 0)).unwrap();
        step(&mut control);

        channel.emergency_stop(StopReason::Command);
        assert_eq!(step(&mut control), MotorCommand::idle());

        channel.submit(raw(90, 0, 0, 0)).unwrap();
        assert_eq!(step(&mut control).as_array(), [75.0; 4], "Setpoints resume.");
    }

    #[test]
    fn test_throttle_deadband_zeroes_regulator_input() {
        let channel = CommandChannel::default();
        let config = ControlLoopConfig {
            throttle_deadband: 10.0,
            ..ControlLoopConfig::new()
        };
        let mut control = started(&channel, config);
        control.estimator_mut().sensor_mut().accel = Axes::new(3.0, -3.0, GRAVITY);

        // 10 maps to 8, inside the deadband.
        channel.submit(raw(10, 0, 0, 0)).unwrap();
        let mut command = MotorCommand::idle();
        for _ in 0..20 {
            command = step(&mut control);
        }
        assert!(control.estimator().attitude().pitch_deg.abs() > 1.0);
        assert!(value_close(0.0, control.pitch_regulator().input()));
        assert_eq!(command.as_array(), [8.0; 4], "Tilt is ignored on the ground.");
    }

    #[test]
    fn test_tilt_is_corrected_in_both_modes() {
        for mode in [StabilizationMode::Regulated, StabilizationMode::Proportional] {
            let channel = CommandChannel::default();
            let config = ControlLoopConfig {
                stabilization: mode,
                ..ControlLoopConfig::new()
            };
            let mut control = started(&channel, config);
            control.estimator_mut().sensor_mut().accel = Axes::new(0.0, -3.0, GRAVITY);
            channel.submit(raw(90, 0, 0, 0)).unwrap();

            let mut command = MotorCommand::idle();
            for _ in 0..50 {
                command = step(&mut control);
            }
            let pitch = control.estimator().attitude().pitch_deg;
            assert!(pitch > 1.0, "Airframe should read nose-up pitch.");
            assert!(
                command.front_right > command.rear_right,
                "Front rotors should push back against positive pitch."
            );
            assert!(value_close(command.front_right, command.front_left));
            assert!(value_close(command.rear_right, command.rear_left));
        }
    }

    #[test]
    fn test_attitude_is_clamped_before_regulation() {
        let channel = CommandChannel::default();
        let mut control = started(&channel, ControlLoopConfig::new());
        control.estimator_mut().sensor_mut().accel = Axes::new(0.0, -30.0, GRAVITY);
        channel.submit(raw(90, 0, 0, 0)).unwrap();

        for _ in 0..200 {
            step(&mut control);
        }
        assert!(control.estimator().attitude().pitch_deg > 25.0);
        assert!(
            value_close(25.0, control.pitch_regulator().input()),
            "Regulator input should be limited to max_angle_deg."
        );
    }

    #[test]
    fn test_stop_idles_motors_when_clock_fails() {
        let channel = CommandChannel::default();
        channel.connect();
        let mut control = started(&channel, ControlLoopConfig::new());
        channel.submit(raw(120, 0, 0, 0)).unwrap();
        for _ in 0..3 {
            step(&mut control);
        }
        assert_eq!(control.actuators().last, [100.0; 4]);

        channel.link_lost();
        control.clock().set_failing(true);
        let command = control.tick().unwrap();
        assert_eq!(command, MotorCommand::idle());
        assert_eq!(control.actuators().last, [0.0; 4], "Idle reaches the rotors.");

        assert!(
            matches!(control.tick(), Err(Error::Clock(_))),
            "Regular ticks still report the clock fault."
        );
        assert_eq!(control.actuators().last, [0.0; 4]);
    }

    #[test]
    fn test_full_throttle_reaches_wider_mixer() {
        let config = ControlLoopConfig::new().with_max_motor_value(180.0);
        let channel = CommandChannel::new(CommandConfig::for_mixer(&config.mixer));
        assert!(throttle_scale_matches(channel.config(), &config.mixer));
        let mut control = started(&channel, config);
        channel.submit(raw(180, 0, 0, 0)).unwrap();

        let mut command = MotorCommand::idle();
        for _ in 0..10 {
            command = step(&mut control);
        }
        assert_eq!(command.as_array(), [180.0; 4], "Full throttle is not cut short.");
    }

    #[test]
    fn test_default_scales_match() {
        let config = ControlLoopConfig::new();
        assert!(throttle_scale_matches(&CommandConfig::new(), &config.mixer));

        let wider = config.with_max_motor_value(180.0);
        assert!(!throttle_scale_matches(&CommandConfig::new(), &wider.mixer));
    }

    #[test]
    fn test_negative_max_angle_is_taken_by_magnitude() {
        let channel = CommandChannel::default();
        let config = ControlLoopConfig {
            max_angle_deg: -25.0,
            ..ControlLoopConfig::new()
        };
        let mut control = started(&channel, config);
        assert!(value_close(25.0, control.config().max_angle_deg));
        control.estimator_mut().sensor_mut().accel = Axes::new(0.0, -30.0, GRAVITY);
        channel.submit(raw(90, 0, 0, 0)).unwrap();

        for _ in 0..200 {
            step(&mut control);
        }
        assert!(value_close(25.0, control.pitch_regulator().input()));
    }

    #[test]
    fn test_nan_max_angle_falls_back_to_default() {
        let channel = CommandChannel::default();
        let config = ControlLoopConfig {
            max_angle_deg: f32::NAN,
            ..ControlLoopConfig::new()
        };
        let mut control = started(&channel, config);
        assert!(value_close(25.0, control.config().max_angle_deg));
        channel.submit(raw(90, 0, 0, 0)).unwrap();

        let mut command = MotorCommand::idle();
        for _ in 0..10 {
            command = step(&mut control);
        }
        assert_eq!(command.as_array(), [75.0; 4]);
    }

    #[test]
    fn test_trace_reports_proportional_corrections() {
        let channel = CommandChannel::default();
        let config = ControlLoopConfig {
            stabilization: StabilizationMode::Proportional,
            ..ControlLoopConfig::new()
        };
        let mut control = started(&channel, config);
        control.estimator_mut().sensor_mut().accel = Axes::new(0.0, -3.0, GRAVITY);
        channel.submit(raw(90, 0, 0, 0)).unwrap();

        for _ in 0..50 {
            step(&mut control);
        }
        let trace = control.last_trace();
        assert!(trace.gated_pitch > 1.0);
        assert!(value_close(-0.8 * trace.gated_pitch, trace.mix.stab_pitch));
        assert!(value_close(75.0, trace.inputs.throttle));
        assert!(
            value_close(0.0, control.pitch_regulator().output()),
            "Regulators stay idle in proportional mode."
        );
    }
}
