//! sensor.rs
//! Reflectance input capability.
//!
//! The core never touches a concrete colour sensor; it polls whatever
//! `ReflectanceSource` it was constructed with, once per control cycle.

use crate::error::SensorError;

/// Scalar light-reflection intensity reported by the line sensor.
pub type Reflectance = i32;

/// Lowest reading a reflectance device may report.
pub const REFLECTANCE_MIN: Reflectance = 0;

/// Highest reading a reflectance device may report.
pub const REFLECTANCE_MAX: Reflectance = 100;

/// A polled reflectance sensor.
pub trait ReflectanceSource {
    /// Takes one sample. Implementations should not cache between calls.
    fn reflection(&mut self) -> Result<Reflectance, SensorError>;
}

impl<S: ReflectanceSource + ?Sized> ReflectanceSource for &mut S {
    fn reflection(&mut self) -> Result<Reflectance, SensorError> {
        (**self).reflection()
    }
}

impl<S: ReflectanceSource + ?Sized> ReflectanceSource for Box<S> {
    fn reflection(&mut self) -> Result<Reflectance, SensorError> {
        (**self).reflection()
    }
}

/// Reads one sample and rejects anything outside the device range,
/// so stale or garbage data never reaches the classifier.
pub fn sample<S: ReflectanceSource + ?Sized>(source: &mut S) -> Result<Reflectance, SensorError> {
    let reading = source.reflection()?;
    if !(REFLECTANCE_MIN..=REFLECTANCE_MAX).contains(&reading) {
        return Err(SensorError::OutOfRange {
            reading,
            min: REFLECTANCE_MIN,
            max: REFLECTANCE_MAX,
        });
    }
    Ok(reading)
}
