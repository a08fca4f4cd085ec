// src/estimator.rs

//! # Attitude Estimator
//!
//! Turns raw inertial samples into pitch, roll and yaw angles.
//!
//! Lifecycle is `Uninitialized -> Calibrating -> Ready`:
//!
//! 1. [`AttitudeEstimator::init`] brings the sensor up and selects its
//!    ranges. Any failure here is fatal and reported as
//!    [`Error::SensorInit`].
//! 2. [`AttitudeEstimator::calibrate`] averages a block of raw samples taken
//!    on a resting airframe into per-axis offsets. It blocks for the whole
//!    run.
//! 3. Each control tick calls [`AttitudeEstimator::update_data`] to latch,
//!    correct and median-filter a sample, then
//!    [`AttitudeEstimator::process`] to fuse it.

pub mod fusion;
pub mod sensor;
pub use fusion::*;
pub use sensor::*;

use crate::error::{Error, SensorInitStage};
use crate::filter::OrderStatisticFilter;
use crate::Axes;
use embedded_hal::blocking::delay::DelayMs;
use log::{error, info};

const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Estimator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    /// Sensor not started.
    Uninitialized,
    /// Offsets are being measured.
    Calibrating,
    /// Offsets are known; fused angles can be trusted.
    Ready,
}

/// Fused attitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    /// Rotation about the X axis.
    pub pitch_deg: f32,
    /// Rotation about the Y axis.
    pub roll_deg: f32,
    /// Integrated gyro Z. Drifts, nothing corrects it.
    pub yaw_deg: f32,
}

/// Tunables for the estimator.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    /// Weight of the gyro path in the complementary filter.
    pub gyro_weight: f32,
    /// Median window for each accelerometer axis.
    pub median_window: usize,
    /// Number of raw reads averaged during calibration.
    pub calibration_samples: u32,
    /// Pause after each calibration read, milliseconds.
    pub calibration_sample_delay_ms: u16,
    /// Bus settle time before the sensor is started, milliseconds.
    pub startup_delay_ms: u16,
    /// Pause before calibration starts, milliseconds.
    pub pre_calibration_delay_ms: u16,
    /// Pause after calibration ends, milliseconds.
    pub post_calibration_delay_ms: u16,
    /// Accelerometer range requested at init.
    pub accel_range: AccelRange,
    /// Gyroscope range requested at init.
    pub gyro_range: GyroRange,
    /// Upper bound on the fusion time step, seconds.
    pub max_dt_s: f32,
    /// Clear the yaw accumulator whenever calibration runs.
    pub reset_yaw_on_calibrate: bool,
}

impl EstimatorConfig {
    /// Creates a configuration with the flight-tested defaults.
    pub fn new() -> Self {
        Self {
            gyro_weight: 0.998,
            median_window: 11,
            calibration_samples: 5000,
            calibration_sample_delay_ms: 1,
            startup_delay_ms: 3000,
            pre_calibration_delay_ms: 3000,
            post_calibration_delay_ms: 1000,
            accel_range: AccelRange::G16,
            gyro_range: GyroRange::Dps2000,
            max_dt_s: 0.1,
            reset_yaw_on_calibrate: true,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Calibrated, filtered attitude estimator.
pub struct AttitudeEstimator<S> {
    sensor: S,
    config: EstimatorConfig,
    state: EstimatorState,
    accel_filters: Axes<OrderStatisticFilter<f32>>,
    raw: ImuSample,
    filtered: ImuSample,
    offsets: ImuSample,
    fused_pitch_rad: f32,
    fused_roll_rad: f32,
    gyro_yaw_rad: f32,
    attitude: Attitude,
    data_available: bool,
    last_fusion_us: Option<u32>,
}

impl<S: SensorSource> AttitudeEstimator<S> {
    /// Creates an uninitialized estimator around `sensor`.
    pub fn new(sensor: S, config: EstimatorConfig) -> Self {
        Self {
            sensor,
            accel_filters: Self::seeded_filters(config.median_window),
            config,
            state: EstimatorState::Uninitialized,
            raw: ImuSample::default(),
            filtered: ImuSample::default(),
            offsets: ImuSample::default(),
            fused_pitch_rad: 0.0,
            fused_roll_rad: 0.0,
            gyro_yaw_rad: 0.0,
            attitude: Attitude::default(),
            data_available: false,
            last_fusion_us: None,
        }
    }

    fn seeded_filters(window: usize) -> Axes<OrderStatisticFilter<f32>> {
        Axes::new(
            OrderStatisticFilter::new(window, 0.0),
            OrderStatisticFilter::new(window, 0.0),
            OrderStatisticFilter::new(window, 0.0),
        )
    }

    /// Starts and configures the sensor, then calibrates.
    ///
    /// On a sensor failure the estimator stays `Uninitialized` and never
    /// reaches `Ready`.
    pub fn init<D: DelayMs<u16>>(&mut self, delay: &mut D) -> Result<(), Error> {
        delay.delay_ms(self.config.startup_delay_ms);

        if !self.sensor.begin() {
            error!("inertial sensor did not respond");
            return Err(Error::SensorInit(SensorInitStage::Begin));
        }

        if let Err(stage) = self
            .sensor
            .configure_ranges(self.config.accel_range, self.config.gyro_range)
        {
            error!("inertial sensor setup failed: {}", stage);
            return Err(Error::SensorInit(stage));
        }
        info!(
            "inertial sensor up, accel {:?}, gyro {:?}",
            self.config.accel_range, self.config.gyro_range
        );

        self.accel_filters = Self::seeded_filters(self.config.median_window);
        self.state = EstimatorState::Calibrating;

        self.calibrate(delay)
    }

    /// Measures the resting offsets of every axis.
    ///
    /// Blocks for roughly `calibration_samples` × `calibration_sample_delay_ms`
    /// plus the surrounding settle delays. A missed read re-counts the
    /// previous raw sample.
    pub fn calibrate<D: DelayMs<u16>>(&mut self, delay: &mut D) -> Result<(), Error> {
        if self.state == EstimatorState::Uninitialized {
            return Err(Error::NotReady);
        }
        self.state = EstimatorState::Calibrating;

        delay.delay_ms(self.config.pre_calibration_delay_ms);
        info!("calibrating accel / gyro...");

        let times = self.config.calibration_samples.max(1);
        let mut accel_sum = Axes::<f32>::default();
        let mut gyro_sum = Axes::<f32>::default();

        for _ in 0..times {
            if self.sensor.read() {
                self.raw = self.sensor.sample();
            }

            accel_sum.x += self.raw.accel.x;
            accel_sum.y += self.raw.accel.y;
            accel_sum.z += self.raw.accel.z;

            gyro_sum.x += self.raw.gyro.x;
            gyro_sum.y += self.raw.gyro.y;
            gyro_sum.z += self.raw.gyro.z;

            delay.delay_ms(self.config.calibration_sample_delay_ms);
        }

        let n = times as f32;
        self.offsets = ImuSample {
            accel: Axes::new(accel_sum.x / n, accel_sum.y / n, accel_sum.z / n),
            gyro: Axes::new(gyro_sum.x / n, gyro_sum.y / n, gyro_sum.z / n),
        };

        if self.config.reset_yaw_on_calibrate {
            self.gyro_yaw_rad = 0.0;
            self.attitude.yaw_deg = 0.0;
        }
        self.data_available = false;
        self.last_fusion_us = None;

        delay.delay_ms(self.config.post_calibration_delay_ms);

        info!(
            "calibration done, accel offset ({}, {}, {}), gyro offset ({}, {}, {})",
            self.offsets.accel.x,
            self.offsets.accel.y,
            self.offsets.accel.z,
            self.offsets.gyro.x,
            self.offsets.gyro.y,
            self.offsets.gyro.z
        );
        self.state = EstimatorState::Ready;
        Ok(())
    }

    /// Latches one sample, removes offsets and median-filters the
    /// accelerometer.
    ///
    /// Returns `false`, changing nothing, if the sensor had no new data.
    pub fn update_data(&mut self) -> bool {
        if !self.sensor.read() {
            return false;
        }

        self.raw = self.sensor.sample();
        let corrected = apply_offsets(&self.raw, &self.offsets);

        self.accel_filters.x.insert(corrected.accel.x);
        self.accel_filters.y.insert(corrected.accel.y);
        self.accel_filters.z.insert(corrected.accel.z);

        self.filtered = ImuSample {
            accel: Axes::new(
                self.accel_filters.x.read(),
                self.accel_filters.y.read(),
                self.accel_filters.z.read(),
            ),
            gyro: corrected.gyro,
        };

        self.data_available = true;
        true
    }

    /// Fuses the latest filtered sample at time `now_us` (monotonic
    /// microseconds, wrapping).
    ///
    /// Returns `false` and leaves the timer alone if no sample arrived since
    /// the last fusion. The first fusion after calibration uses a zero time
    /// step; later steps are capped at `max_dt_s`.
    pub fn process(&mut self, now_us: u32) -> bool {
        if !self.data_available {
            return false;
        }

        let (accel_pitch, accel_roll) = accel_tilt(self.filtered.accel);

        let dt = match self.last_fusion_us {
            Some(last) => (now_us.wrapping_sub(last) as f32 / 1_000_000.0).min(self.config.max_dt_s),
            None => 0.0,
        };

        let gyro = self.filtered.gyro;
        let weight = self.config.gyro_weight;
        self.fused_pitch_rad =
            complementary_step(self.fused_pitch_rad, gyro.x, dt, accel_pitch, weight);
        self.fused_roll_rad =
            complementary_step(self.fused_roll_rad, gyro.y, dt, accel_roll, weight);
        self.gyro_yaw_rad += gyro.z * dt;

        self.attitude = Attitude {
            pitch_deg: self.fused_pitch_rad * RAD_TO_DEG,
            roll_deg: self.fused_roll_rad * RAD_TO_DEG,
            yaw_deg: self.gyro_yaw_rad * RAD_TO_DEG,
        };

        self.last_fusion_us = Some(now_us);
        self.data_available = false;
        true
    }

    /// Most recent fused attitude.
    pub fn attitude(&self) -> Attitude {
        self.attitude
    }

    /// Lifecycle state.
    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Last raw sample as read from the sensor.
    pub fn raw(&self) -> ImuSample {
        self.raw
    }

    /// Last offset-corrected sample with the filtered accelerometer.
    pub fn filtered(&self) -> ImuSample {
        self.filtered
    }

    /// Calibration offsets.
    pub fn offsets(&self) -> ImuSample {
        self.offsets
    }

    /// Whether a sample is waiting to be fused.
    pub fn data_available(&self) -> bool {
        self.data_available
    }

    /// Active configuration.
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Underlying sensor.
    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// Underlying sensor, mutably.
    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}
