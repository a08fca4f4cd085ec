// src/command.rs

//! # Command Channel
//!
//! Hand-off point between the link context (radio or socket callback) and
//! the control tick. The link side decodes messages into [`RawCommand`]s and
//! submits them; the tick takes a [`ControlSnapshot`] once per cycle.
//!
//! An emergency stop latches. Until the tick has consumed that latch, newly
//! submitted setpoints are dropped, and the snapshot that consumes it zeroes
//! every setpoint, so the very next mix always runs on zero inputs.

use crate::error::{CommandDecodeError, CommandField, Error};
use crate::mixer::MixerConfig;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use log::{debug, info, warn};
use spin::Mutex;

/// Setpoints as received on the link, in wire units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawCommand {
    /// Throttle, `[0, throttle_input_max]`.
    pub throttle: i32,
    /// Pitch, `[-setpoint_limit, setpoint_limit]`.
    pub pitch: i32,
    /// Roll, `[-setpoint_limit, setpoint_limit]`.
    pub roll: i32,
    /// Yaw, `[-setpoint_limit, setpoint_limit]`.
    pub yaw: i32,
}

/// Setpoints in mixer units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlInputs {
    /// Throttle mapped onto `[0, max_motor_value]`.
    pub throttle: f32,
    /// Pitch command.
    pub pitch: f32,
    /// Roll command.
    pub roll: f32,
    /// Yaw command.
    pub yaw: f32,
}

/// Why the motors were stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The control link went away.
    LinkLoss,
    /// The link delivered something that could not be handled.
    ProtocolError,
    /// The operator asked for it.
    Command,
}

/// What the control tick sees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlSnapshot {
    /// Current setpoints. All zero when `stopped` is set.
    pub inputs: ControlInputs,
    /// Set once per emergency stop.
    pub stopped: Option<StopReason>,
}

/// Ranges accepted from the link.
#[derive(Debug, Clone, Copy)]
pub struct CommandConfig {
    /// Top of the external throttle range.
    pub throttle_input_max: i32,
    /// Top of the internal throttle range.
    pub max_motor_value: i32,
    /// Magnitude limit for pitch, roll and yaw.
    pub setpoint_limit: i32,
}

impl CommandConfig {
    /// Throttle `[0, 180]` onto `[0, 150]`, attitude setpoints within ±180.
    pub const fn new() -> Self {
        Self {
            throttle_input_max: 180,
            max_motor_value: 150,
            setpoint_limit: 180,
        }
    }

    /// Default ranges with the throttle mapped onto `[0, max_motor_value]`
    /// of `mixer`, truncated to whole units.
    pub fn for_mixer(mixer: &MixerConfig<f32>) -> Self {
        Self {
            max_motor_value: mixer.max_motor_value as i32,
            ..Self::new()
        }
    }

    fn decode(&self, raw: RawCommand) -> Result<ControlInputs, CommandDecodeError> {
        if raw.throttle < 0 || raw.throttle > self.throttle_input_max {
            return Err(CommandDecodeError {
                field: CommandField::Throttle,
                value: raw.throttle,
            });
        }
        let fields = [
            (CommandField::Pitch, raw.pitch),
            (CommandField::Roll, raw.roll),
            (CommandField::Yaw, raw.yaw),
        ];
        for (field, value) in fields {
            if value < -self.setpoint_limit || value > self.setpoint_limit {
                return Err(CommandDecodeError { field, value });
            }
        }

        let throttle = map_range(
            raw.throttle,
            0,
            self.throttle_input_max,
            0,
            self.max_motor_value,
        );
        Ok(ControlInputs {
            throttle: throttle as f32,
            pitch: raw.pitch as f32,
            roll: raw.roll as f32,
            yaw: raw.yaw as f32,
        })
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear integer remap, truncating toward zero.
///
/// A degenerate input range maps everything to `out_min`.
pub fn map_range(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    let in_span = i64::from(in_max) - i64::from(in_min);
    if in_span == 0 {
        return out_min;
    }
    let scaled = (i64::from(value) - i64::from(in_min))
        * (i64::from(out_max) - i64::from(out_min))
        / in_span
        + i64::from(out_min);
    scaled.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

const NO_STOP: u8 = 0;

impl StopReason {
    fn encode(self) -> u8 {
        match self {
            StopReason::LinkLoss => 1,
            StopReason::ProtocolError => 2,
            StopReason::Command => 3,
        }
    }

    fn decode(code: u8) -> Option<StopReason> {
        match code {
            1 => Some(StopReason::LinkLoss),
            2 => Some(StopReason::ProtocolError),
            3 => Some(StopReason::Command),
            _ => None,
        }
    }
}

/// Setpoint store shared between the link context and the control tick.
///
/// The stop latch and the link flag are atomics, so [`emergency_stop`]
/// never waits. [`submit`] only tries the setpoint lock: if it runs in an
/// interrupt that preempted [`snapshot`], it drops the message instead of
/// spinning on a lock its own core holds.
///
/// [`emergency_stop`]: CommandChannel::emergency_stop
/// [`submit`]: CommandChannel::submit
/// [`snapshot`]: CommandChannel::snapshot
pub struct CommandChannel {
    config: CommandConfig,
    inputs: Mutex<ControlInputs>,
    pending_stop: AtomicU8,
    linked: AtomicBool,
}

impl CommandChannel {
    /// Creates a channel with zero setpoints and no link.
    pub const fn new(config: CommandConfig) -> Self {
        Self {
            config,
            inputs: Mutex::new(ControlInputs {
                throttle: 0.0,
                pitch: 0.0,
                roll: 0.0,
                yaw: 0.0,
            }),
            pending_stop: AtomicU8::new(NO_STOP),
            linked: AtomicBool::new(false),
        }
    }

    /// Validates and stores new setpoints.
    ///
    /// Returns `Ok(false)` if the setpoints were dropped, either because a
    /// stop is waiting for the tick or because the tick holds the setpoint
    /// lock. A decode error leaves the previous setpoints in place.
    pub fn submit(&self, raw: RawCommand) -> Result<bool, Error> {
        let inputs = match self.config.decode(raw) {
            Ok(inputs) => inputs,
            Err(decode_error) => {
                warn!("discarding command: {}", decode_error);
                return Err(decode_error.into());
            }
        };

        if self.stop_pending() {
            return Ok(false);
        }
        match self.inputs.try_lock() {
            Some(mut current) => {
                *current = inputs;
                Ok(true)
            }
            None => {
                debug!("setpoint lock busy, command dropped");
                Ok(false)
            }
        }
    }

    /// Latches a stop. The next [`snapshot`](Self::snapshot) zeroes every
    /// setpoint and reports `reason`. Never blocks.
    pub fn emergency_stop(&self, reason: StopReason) {
        self.pending_stop.store(reason.encode(), Ordering::Release);
        if reason == StopReason::LinkLoss {
            self.linked.store(false, Ordering::Release);
        }
        warn!("emergency stop: {:?}", reason);
    }

    /// Stops after the link went away.
    pub fn link_lost(&self) {
        self.emergency_stop(StopReason::LinkLoss);
    }

    /// Stops after a protocol fault.
    pub fn protocol_error(&self) {
        self.emergency_stop(StopReason::ProtocolError);
    }

    /// Marks the link as up.
    pub fn connect(&self) {
        self.linked.store(true, Ordering::Release);
        info!("control link up");
    }

    /// Whether a link is up.
    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    /// Whether a stop is waiting for the tick.
    pub fn stop_pending(&self) -> bool {
        self.pending_stop.load(Ordering::Acquire) != NO_STOP
    }

    /// Takes the setpoints for one tick, consuming any pending stop.
    ///
    /// Call from the control tick only.
    pub fn snapshot(&self) -> ControlSnapshot {
        let mut inputs = self.inputs.lock();
        let stopped = StopReason::decode(self.pending_stop.swap(NO_STOP, Ordering::AcqRel));
        if stopped.is_some() {
            *inputs = ControlInputs::default();
        }
        ControlSnapshot {
            inputs: *inputs,
            stopped,
        }
    }

    /// Current setpoints, all zero while a stop is pending.
    pub fn current(&self) -> ControlInputs {
        if self.stop_pending() {
            return ControlInputs::default();
        }
        *self.inputs.lock()
    }

    /// Accepted ranges.
    pub fn config(&self) -> &CommandConfig {
        &self.config
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new(CommandConfig::new())
    }
}
