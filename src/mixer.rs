// src/mixer.rs

//! # X-Frame Motor Mixer
//!
//! Converts throttle, attitude commands and stabilization corrections into
//! four rotor commands for an X-frame quadcopter. Rotor order is
//! front-right, rear-right, rear-left, front-left.
//!
//! ```text
//! front_right = throttle - roll - pitch - yaw - stab_roll - stab_pitch
//! rear_right  = throttle - roll + pitch + yaw - stab_roll + stab_pitch
//! rear_left   = throttle + roll + pitch - yaw + stab_roll + stab_pitch
//! front_left  = throttle + roll - pitch + yaw + stab_roll - stab_pitch
//! ```
//!
//! Every command is clamped to `[0, max_motor_value]`.

use crate::Number;

/// Rotor position on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotor {
    /// Front right, channel 0.
    FrontRight,
    /// Rear right, channel 1.
    RearRight,
    /// Rear left, channel 2.
    RearLeft,
    /// Front left, channel 3.
    FrontLeft,
}

impl Rotor {
    /// All rotors in channel order.
    pub const ALL: [Rotor; 4] = [
        Rotor::FrontRight,
        Rotor::RearRight,
        Rotor::RearLeft,
        Rotor::FrontLeft,
    ];

    /// Actuator channel index.
    pub fn index(self) -> usize {
        match self {
            Rotor::FrontRight => 0,
            Rotor::RearRight => 1,
            Rotor::RearLeft => 2,
            Rotor::FrontLeft => 3,
        }
    }
}

/// Actuator output, one independent channel per rotor.
pub trait ActuatorSink<T> {
    /// Sets the command of one rotor. Fire-and-forget.
    fn write(&mut self, rotor: Rotor, command: T);
}

impl<T, A: ActuatorSink<T> + ?Sized> ActuatorSink<T> for &mut A {
    fn write(&mut self, rotor: Rotor, command: T) {
        (**self).write(rotor, command)
    }
}

/// Mixer inputs for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MixerInput<T> {
    /// Collective throttle.
    pub throttle: T,
    /// Pitch command.
    pub pitch: T,
    /// Roll command.
    pub roll: T,
    /// Yaw command.
    pub yaw: T,
    /// Pitch stabilization correction.
    pub stab_pitch: T,
    /// Roll stabilization correction.
    pub stab_roll: T,
}

/// Commands for the four rotors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorCommand<T> {
    /// Front right rotor.
    pub front_right: T,
    /// Rear right rotor.
    pub rear_right: T,
    /// Rear left rotor.
    pub rear_left: T,
    /// Front left rotor.
    pub front_left: T,
}

impl<T: Number> MotorCommand<T> {
    /// All rotors stopped.
    pub fn idle() -> Self {
        Self {
            front_right: T::zero(),
            rear_right: T::zero(),
            rear_left: T::zero(),
            front_left: T::zero(),
        }
    }

    /// Command of a single rotor.
    pub fn get(&self, rotor: Rotor) -> T {
        match rotor {
            Rotor::FrontRight => self.front_right,
            Rotor::RearRight => self.rear_right,
            Rotor::RearLeft => self.rear_left,
            Rotor::FrontLeft => self.front_left,
        }
    }

    /// Commands in channel order.
    pub fn as_array(&self) -> [T; 4] {
        [
            self.front_right,
            self.rear_right,
            self.rear_left,
            self.front_left,
        ]
    }

    /// Writes every rotor to `sink` in channel order.
    pub fn write_to<A: ActuatorSink<T>>(&self, sink: &mut A) {
        for rotor in Rotor::ALL {
            sink.write(rotor, self.get(rotor));
        }
    }
}

/// Mixer saturation.
#[derive(Debug, Clone, Copy)]
pub struct MixerConfig<T> {
    /// Highest command a rotor may receive.
    pub max_motor_value: T,
}

impl<T: Number> MixerConfig<T> {
    /// Creates a configuration saturating at 150.
    pub fn new() -> Self {
        Self {
            max_motor_value: T::from_u8(150).unwrap_or_else(T::one),
        }
    }
}

impl<T: Number> Default for MixerConfig<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// X-frame mixer.
#[derive(Debug, Clone, Copy)]
pub struct MotorMixer<T> {
    config: MixerConfig<T>,
}

impl<T: Number> MotorMixer<T> {
    /// Creates a mixer from `config`.
    pub fn new(config: MixerConfig<T>) -> Self {
        Self { config }
    }

    /// Highest rotor command.
    pub fn max_motor_value(&self) -> T {
        self.config.max_motor_value
    }

    /// Mixes one set of inputs.
    pub fn mix(&self, input: MixerInput<T>) -> MotorCommand<T> {
        mix_x_frame(input, self.config.max_motor_value)
    }
}

impl<T: Number> Default for MotorMixer<T> {
    fn default() -> Self {
        Self::new(MixerConfig::new())
    }
}

/// Applies the X-frame mixing law and clamps each rotor to
/// `[0, max_motor_value]`.
pub fn mix_x_frame<T: Number>(input: MixerInput<T>, max_motor_value: T) -> MotorCommand<T> {
    let MixerInput {
        throttle,
        pitch,
        roll,
        yaw,
        stab_pitch,
        stab_roll,
    } = input;
    let saturate = |command: T| command.clamp(T::zero(), max_motor_value);

    MotorCommand {
        front_right: saturate(throttle - roll - pitch - yaw - stab_roll - stab_pitch),
        rear_right: saturate(throttle - roll + pitch + yaw - stab_roll + stab_pitch),
        rear_left: saturate(throttle + roll + pitch - yaw + stab_roll + stab_pitch),
        front_left: saturate(throttle + roll - pitch + yaw + stab_roll - stab_pitch),
    }
}
