// src/filter.rs

//! # Sample Filter Module
//!
//! This module provides the sliding-window filters used to condition
//! accelerometer samples before they are fused into an attitude.

pub mod median;
pub use median::*;
