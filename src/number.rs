// src/number.rs

//! Numeric bound shared by the regulator and the motor mixer.

use num_traits::FromPrimitive;
use piddiy::Number as PiddiyNumber;

/// Custom trait to encapsulate base number requirements.
pub trait Number: PiddiyNumber + FromPrimitive {
    /// Clamps generic PartialOrd values within a given range.
    fn clamp(self, min: Self, max: Self) -> Self {
        if self < min {
            min
        } else if max < self {
            max
        } else {
            self
        }
    }
}

impl<T: PiddiyNumber + FromPrimitive> Number for T {}

/// Three values, one per body axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Axes<T> {
    /// X axis.
    pub x: T,
    /// Y axis.
    pub y: T,
    /// Z axis.
    pub z: T,
}

impl<T> Axes<T> {
    /// Creates a new triple.
    pub const fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }
}

impl<T: Copy> Axes<T> {
    /// Returns the triple as an `(x, y, z)` tuple.
    pub fn as_tuple(&self) -> (T, T, T) {
        (self.x, self.y, self.z)
    }
}
