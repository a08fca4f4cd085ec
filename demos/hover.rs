// demos/hover.rs

use core::cell::Cell;
use embedded_hal::blocking::delay::DelayMs;
use embedded_time::{clock, fraction::Fraction, Clock, Instant};
use quad_attitude_stabilization::estimator::{AccelRange, GyroRange};
use quad_attitude_stabilization::{
    ActuatorSink, AttitudeEstimator, Axes, CommandChannel, ControlLoop, ControlLoopConfig,
    EstimatorConfig, RawCommand, Rotor, SensorSource,
};

const GRAVITY: f32 = 9.80665;
const TICK_US: u32 = 10_000;

/// Single-axis airframe: pitch only, driven by the front/rear thrust split.
#[derive(Default)]
struct Airframe {
    pitch_rad: f32,
    pitch_rate: f32,
    thrust: [f32; 4],
}

impl Airframe {
    fn step(&mut self, dt: f32) {
        let rear = self.thrust[Rotor::RearRight.index()] + self.thrust[Rotor::RearLeft.index()];
        let front =
            self.thrust[Rotor::FrontRight.index()] + self.thrust[Rotor::FrontLeft.index()];
        let torque = 0.002 * (rear - front) - 0.5 * self.pitch_rate;
        self.pitch_rate += torque * dt;
        self.pitch_rad += self.pitch_rate * dt;
    }
}

struct SimSensor<'a>(&'a Cell<(f32, f32)>);

impl SensorSource for SimSensor<'_> {
    fn begin(&mut self) -> bool {
        true
    }

    fn configure_accel_range(&mut self, _: AccelRange) -> bool {
        true
    }

    fn configure_gyro_range(&mut self, _: GyroRange) -> bool {
        true
    }

    fn read(&mut self) -> bool {
        true
    }

    fn accel(&self) -> Axes<f32> {
        let (pitch, _) = self.0.get();
        Axes::new(0.0, -GRAVITY * pitch.sin(), GRAVITY * pitch.cos())
    }

    fn gyro(&self) -> Axes<f32> {
        let (_, rate) = self.0.get();
        Axes::new(rate, 0.0, 0.0)
    }
}

struct SimMotors<'a>(&'a Cell<[f32; 4]>);

impl ActuatorSink<f32> for SimMotors<'_> {
    fn write(&mut self, rotor: Rotor, command: f32) {
        let mut thrust = self.0.get();
        thrust[rotor.index()] = command;
        self.0.set(thrust);
    }
}

#[derive(Default)]
struct SimClock(Cell<u32>);

impl Clock for SimClock {
    type T = u32;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        Ok(Instant::new(self.0.get()))
    }
}

struct NoDelay;

impl DelayMs<u16> for NoDelay {
    fn delay_ms(&mut self, _ms: u16) {}
}

fn main() {
    let imu = Cell::new((0.0_f32, 0.0_f32));
    let motors = Cell::new([0.0_f32; 4]);
    let commands = CommandChannel::default();

    let estimator_config = EstimatorConfig {
        gyro_weight: 0.98,
        calibration_samples: 500,
        ..EstimatorConfig::new()
    };
    let estimator = AttitudeEstimator::new(SimSensor(&imu), estimator_config);
    let mut control = ControlLoop::new(
        estimator,
        SimMotors(&motors),
        &commands,
        SimClock::default(),
        ControlLoopConfig::new(),
    );

    if let Err(e) = control.start(&mut NoDelay) {
        eprintln!("start failed: {}", e);
        return;
    }

    // Gust: the airframe starts 15 degrees nose up.
    let mut airframe = Airframe {
        pitch_rad: 15.0_f32.to_radians(),
        ..Airframe::default()
    };
    commands.connect();
    let hover = RawCommand {
        throttle: 90,
        ..RawCommand::default()
    };
    if let Err(e) = commands.submit(hover) {
        eprintln!("command rejected: {}", e);
        return;
    }

    println!("   t    pitch   FR      RR      RL      FL");
    for tick in 0..=300 {
        imu.set((airframe.pitch_rad, airframe.pitch_rate));
        control.clock().0.set(tick * TICK_US);

        let command = match control.tick() {
            Ok(command) => command,
            Err(e) => {
                eprintln!("tick failed: {}", e);
                return;
            }
        };
        airframe.thrust = motors.get();
        airframe.step(TICK_US as f32 / 1_000_000.0);

        if tick == 200 {
            commands.link_lost();
        }
        if tick % 20 == 0 || tick == 201 {
            let [fr, rr, rl, fl] = command.as_array();
            println!(
                "{:5.2} {:7.2} {:7.2} {:7.2} {:7.2} {:7.2}",
                tick as f32 * TICK_US as f32 / 1_000_000.0,
                control.estimator().attitude().pitch_deg,
                fr,
                rr,
                rl,
                fl
            );
        }
    }
}
